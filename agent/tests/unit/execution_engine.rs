//! Execution engine bookkeeping over a scripted runner.

use std::collections::BTreeMap;
use std::time::Duration;

use warden_agent::AgentError;
use warden_agent::application::ports::RunOutcome;
use warden_common::TIMEOUT_RETURN_CODE;

use crate::mocks::{ScriptedRunner, UnspawnableRunner, completed, execution_engine};

#[tokio::test]
async fn successful_run_is_recorded() {
    let engine = execution_engine(ScriptedRunner::ok(), 100);
    let report = engine
        .execute("echo ok", None, &BTreeMap::new(), true)
        .await
        .unwrap();
    assert!(report.success);
    assert!(!report.timed_out);
    assert!(report.reason.is_none());
    assert_eq!(report.record.stdout, "ok\n");

    let history = engine.get_history(10);
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].command, "echo ok");
    assert_eq!(engine.stats().succeeded, 1);
}

#[tokio::test]
async fn non_zero_exit_is_a_failed_report() {
    let engine = execution_engine(ScriptedRunner::new(completed(2, "", "boom")), 100);
    let report = engine
        .execute("false", None, &BTreeMap::new(), true)
        .await
        .unwrap();
    assert!(!report.success);
    assert_eq!(report.reason.as_deref(), Some("exit code 2"));
    assert_eq!(report.record.stderr, "boom");
    assert_eq!(engine.stats().failed, 1);
}

#[tokio::test]
async fn timeout_records_minus_one() {
    let engine = execution_engine(ScriptedRunner::new(RunOutcome::TimedOut), 100);
    let report = engine
        .execute("sleep 60", Some(Duration::from_secs(1)), &BTreeMap::new(), true)
        .await
        .unwrap();
    assert!(!report.success);
    assert!(report.timed_out);
    assert_eq!(report.reason.as_deref(), Some("timeout"));
    assert_eq!(report.record.return_code, TIMEOUT_RETURN_CODE);
    assert_eq!(report.record.stderr, "timeout");

    let stats = engine.stats();
    assert_eq!(stats.timeouts, 1);
    assert_eq!(stats.failed, 0, "timeouts are counted separately");
    assert_eq!(engine.get_history(1)[0].return_code, -1);
}

#[tokio::test]
async fn stderr_dropped_when_not_captured() {
    let engine = execution_engine(ScriptedRunner::new(completed(0, "out", "err")), 100);
    let report = engine
        .execute("x", None, &BTreeMap::new(), false)
        .await
        .unwrap();
    assert!(report.record.stderr.is_empty());
    assert!(engine.get_history(1)[0].stderr.is_empty());
}

#[tokio::test]
async fn rejects_invalid_input() {
    let engine = execution_engine(ScriptedRunner::ok(), 100);
    assert!(matches!(
        engine.execute("  ", None, &BTreeMap::new(), true).await,
        Err(AgentError::InvalidArgument(_))
    ));
    assert!(matches!(
        engine
            .execute("ls", Some(Duration::ZERO), &BTreeMap::new(), true)
            .await,
        Err(AgentError::InvalidArgument(_))
    ));
    let bad_env = BTreeMap::from([("A=B".to_string(), "x".to_string())]);
    assert!(matches!(
        engine.execute("ls", None, &bad_env, true).await,
        Err(AgentError::InvalidArgument(_))
    ));
    assert!(engine.get_history(10).is_empty());
}

#[tokio::test]
async fn spawn_failure_is_internal_and_unrecorded() {
    let engine = execution_engine(UnspawnableRunner, 100);
    let err = engine
        .execute("ls", None, &BTreeMap::new(), true)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), warden_common::ErrorKind::Internal);
    assert!(engine.get_history(10).is_empty());
}

#[tokio::test]
async fn env_and_defaults_flow_into_runner() {
    let engine = execution_engine(ScriptedRunner::ok(), 100);
    engine.set_env_var("PERSISTENT", "1").unwrap();
    let overrides = BTreeMap::from([
        ("PERSISTENT".to_string(), "2".to_string()),
        ("CALL".to_string(), "x".to_string()),
    ]);
    engine.execute("env", None, &overrides, true).await.unwrap();

    let calls = engine_calls(&engine);
    assert_eq!(calls.len(), 1);
    let spec = &calls[0];
    assert_eq!(spec.timeout, Duration::from_secs(30));
    assert_eq!(spec.env.get("PERSISTENT").map(String::as_str), Some("2"));
    assert_eq!(spec.env.get("CALL").map(String::as_str), Some("x"));
    assert_eq!(engine.get_environment().get("PERSISTENT").map(String::as_str), Some("1"));
}

fn engine_calls(
    engine: &warden_agent::application::services::ExecutionEngine<ScriptedRunner>,
) -> Vec<warden_agent::application::ports::CommandSpec> {
    engine.runner().calls.lock().clone()
}

#[tokio::test]
async fn history_is_capped_fifo() {
    let engine = execution_engine(ScriptedRunner::ok(), 3);
    for i in 0..5 {
        engine
            .execute(&format!("echo {i}"), None, &BTreeMap::new(), true)
            .await
            .unwrap();
    }
    let history = engine.get_history(100);
    let commands: Vec<_> = history.iter().map(|r| r.command.as_str()).collect();
    assert_eq!(commands, vec!["echo 2", "echo 3", "echo 4"]);
    assert_eq!(engine.get_history(1)[0].command, "echo 4");
    assert_eq!(engine.summary().history_count, 3);
    assert_eq!(engine.stats().executions, 5);
}

#[test]
fn set_env_var_validation() {
    let engine = execution_engine(ScriptedRunner::ok(), 10);
    assert!(matches!(
        engine.set_env_var("", "x"),
        Err(AgentError::InvalidArgument(_))
    ));
    assert!(engine.set_env_var("KEY=", "x").is_err());
    engine.set_env_var("KEY", "v").unwrap();
    engine.set_env_var("KEY", "w").unwrap();
    assert_eq!(engine.get_environment().len(), 1);
}

#[test]
fn working_directory_changes() {
    let engine = execution_engine(ScriptedRunner::ok(), 10);
    let dir = tempfile::tempdir().unwrap();
    let sub = dir.path().join("sub");
    std::fs::create_dir(&sub).unwrap();
    std::fs::write(dir.path().join("file.txt"), "x").unwrap();

    let set = engine
        .set_working_directory(dir.path().to_str().unwrap())
        .unwrap();
    assert_eq!(set, dir.path());

    let relative = engine.set_working_directory("sub").unwrap();
    assert_eq!(relative, sub);
    assert_eq!(engine.working_directory(), sub);

    assert!(matches!(
        engine.set_working_directory(""),
        Err(AgentError::InvalidArgument(_))
    ));
    assert!(matches!(
        engine.set_working_directory("/definitely/not/here"),
        Err(AgentError::NotFound(_))
    ));
    let file = dir.path().join("file.txt");
    assert!(matches!(
        engine.set_working_directory(file.to_str().unwrap()),
        Err(AgentError::InvalidArgument(_))
    ));
    assert_eq!(engine.working_directory(), sub, "failed changes keep the old cwd");
}
