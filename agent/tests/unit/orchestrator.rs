//! End-to-end gating through the orchestrator with mocked ports.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::TimeDelta;
use warden_agent::application::services::Maintenance;
use warden_agent::{AgentError, build_agent};
use warden_common::{AgentConfig, DecisionStage, Details, ProcessStatus};

use crate::mocks::{
    EchoCapability, FakeProcessControl, MockAgent, ScriptedRunner, agent, authenticated_agent,
    completed, manual_clock,
};

fn no_env() -> BTreeMap<String, String> {
    BTreeMap::new()
}

#[tokio::test]
async fn run_command_requires_session() {
    let agent = agent(ScriptedRunner::ok());
    assert!(matches!(
        agent.run_command("ls", None, &no_env(), true).await,
        Err(AgentError::NotConnected(_))
    ));
    assert!(agent.executor().runner().calls.lock().is_empty());
}

#[tokio::test]
async fn run_command_requires_authentication() {
    let agent = agent(ScriptedRunner::ok());
    agent.connection().establish("h", 1, "secret").unwrap();
    let err = agent
        .run_command("ls", None, &no_env(), true)
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::PreconditionFailed(_)));

    agent.connection().authenticate("nope").unwrap();
    assert!(matches!(
        agent.run_command("ls", None, &no_env(), true).await,
        Err(AgentError::PreconditionFailed(_))
    ));
}

#[tokio::test]
async fn denied_command_never_reaches_runner() {
    let agent = authenticated_agent(ScriptedRunner::ok());
    let err = agent
        .run_command("rm -rf /", None, &no_env(), true)
        .await
        .unwrap_err();
    let AgentError::Denied { reason, risk_level } = err else {
        panic!("expected Denied, got {err:?}");
    };
    assert!(reason.starts_with("dangerous pattern"), "{reason}");
    assert_eq!(risk_level, 10);
    assert!(agent.executor().runner().calls.lock().is_empty());
    assert_eq!(agent.audit().recent(10)[0].action, "block_command");
}

#[tokio::test]
async fn unknown_command_is_denied_and_audited() {
    let agent = authenticated_agent(ScriptedRunner::ok());
    assert!(matches!(
        agent.run_command("mystery_tool", None, &no_env(), true).await,
        Err(AgentError::Denied { .. })
    ));
    let actions: Vec<_> = agent
        .audit()
        .recent(10)
        .into_iter()
        .map(|e| e.action)
        .collect();
    assert_eq!(actions, vec!["deny"]);
}

#[tokio::test]
async fn allowed_command_runs_audits_and_reports() {
    let agent = authenticated_agent(ScriptedRunner::new(completed(0, "clean\n", "")));
    let outcome = agent
        .run_command("git status", None, &no_env(), true)
        .await
        .unwrap();
    assert!(outcome.decision.allowed);
    assert_eq!(outcome.decision.stage, DecisionStage::AllowList);
    assert_eq!(outcome.risk.base_risk, 4);
    assert!(outcome.report.success);
    assert_eq!(outcome.report.record.stdout, "clean\n");

    let audit = agent.audit().recent(10);
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].action, "execute");
    assert_eq!(audit[0].details.get("return_code").map(String::as_str), Some("0"));

    let queued = agent.connection().drain_messages(10);
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].message_type, "command_result");
    assert_eq!(
        queued[0].payload.get("command").map(String::as_str),
        Some("git status")
    );
}

#[tokio::test]
async fn failed_run_is_still_an_outcome() {
    let agent = authenticated_agent(ScriptedRunner::new(completed(1, "", "fatal")));
    let outcome = agent
        .run_command("git push", None, &no_env(), true)
        .await
        .unwrap();
    assert!(!outcome.report.success);
    let audit = agent.audit().recent(1);
    assert_eq!(audit[0].details.get("reason").map(String::as_str), Some("exit code 1"));
}

#[test]
fn start_process_is_gated() {
    let agent = agent(ScriptedRunner::ok());
    assert!(matches!(
        agent.start_process("python3 app.py", "", &no_env()),
        Err(AgentError::NotConnected(_))
    ));

    let agent = authenticated_agent(ScriptedRunner::ok());
    assert!(matches!(
        agent.start_process("sudo python3 app.py", "", &no_env()),
        Err(AgentError::Denied { .. })
    ));
    assert!(agent.supervisor().list_processes().is_empty());

    let p = agent.start_process("python3 app.py", "app", &no_env()).unwrap();
    assert_eq!(p.status, ProcessStatus::Running);
    assert_eq!(p.name, "app");
    let last = agent.audit().recent(1);
    assert_eq!(last[0].action, "start_process");
    assert_eq!(last[0].details.get("pid"), Some(&p.pid.to_string()));
}

fn agent_with_clock(clock: Arc<warden_agent::infra::ManualClock>) -> MockAgent {
    build_agent(
        &AgentConfig::default(),
        ScriptedRunner::ok(),
        FakeProcessControl::default(),
        clock,
    )
}

#[test]
fn maintain_session_reconnects_only_stale_sessions() {
    let clock = manual_clock();
    let agent = agent_with_clock(clock.clone());

    assert!(matches!(agent.maintain_session().unwrap(), Maintenance::Idle));

    agent.connection().establish("h", 1, "").unwrap();
    let original = agent.connection().status().channel_id;
    assert!(matches!(
        agent.maintain_session().unwrap(),
        Maintenance::Healthy(_)
    ));

    clock.advance(TimeDelta::seconds(60));
    let Maintenance::Reconnected(r) = agent.maintain_session().unwrap() else {
        panic!("stale session should reconnect");
    };
    assert_eq!(r.attempt, 1);
    assert_ne!(Some(r.channel_id), original);
    assert!(matches!(
        agent.maintain_session().unwrap(),
        Maintenance::Healthy(_)
    ));

    agent.connection().disconnect();
    clock.advance(TimeDelta::seconds(600));
    assert!(matches!(agent.maintain_session().unwrap(), Maintenance::Idle));
}

#[test]
fn maintain_session_surfaces_exhaustion() {
    let clock = manual_clock();
    let agent = agent_with_clock(clock.clone());
    agent.connection().establish("h", 1, "").unwrap();
    for _ in 0..5 {
        clock.advance(TimeDelta::seconds(61));
        assert!(matches!(
            agent.maintain_session().unwrap(),
            Maintenance::Reconnected(_)
        ));
    }
    clock.advance(TimeDelta::seconds(61));
    assert!(matches!(
        agent.maintain_session(),
        Err(AgentError::RetryExhausted { attempts: 5 })
    ));
}

#[test]
fn capabilities_register_and_invoke() {
    let agent = authenticated_agent(ScriptedRunner::ok());
    assert!(!agent.register_capability("echo", Arc::new(EchoCapability)).unwrap());
    assert!(agent.register_capability("echo", Arc::new(EchoCapability)).unwrap());
    assert!(matches!(
        agent.register_capability(" ", Arc::new(EchoCapability)),
        Err(AgentError::InvalidArgument(_))
    ));
    assert_eq!(agent.capabilities(), vec!["echo"]);

    let args = Details::from([("path".to_string(), "/tmp".to_string())]);
    let out = agent.invoke_capability("echo", "list", &args).unwrap();
    assert_eq!(out.get("action").map(String::as_str), Some("list"));
    assert_eq!(out.get("path").map(String::as_str), Some("/tmp"));
    assert_eq!(agent.audit().recent(1)[0].action, "capability");

    assert!(matches!(
        agent.invoke_capability("missing", "x", &Details::new()),
        Err(AgentError::NotFound(_))
    ));
    assert!(matches!(
        agent.invoke_capability("echo", "", &Details::new()),
        Err(AgentError::InvalidArgument(_))
    ));
}

#[test]
fn capabilities_require_session() {
    let agent = agent(ScriptedRunner::ok());
    agent
        .register_capability("echo", Arc::new(EchoCapability))
        .unwrap();
    assert!(matches!(
        agent.invoke_capability("echo", "x", &Details::new()),
        Err(AgentError::NotConnected(_))
    ));
}
