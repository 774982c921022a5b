//! Managed processes backed by real children.

#![cfg(unix)]

use std::collections::BTreeMap;
use std::time::Duration;

use warden_agent::AgentError;
use warden_common::ProcessStatus;

use crate::connected_agent;

fn alive(pid: u32) -> bool {
    std::path::Path::new(&format!("/proc/{pid}")).exists()
        && !std::fs::read_to_string(format!("/proc/{pid}/status"))
            .unwrap_or_default()
            .contains("State:\tZ")
}

#[tokio::test]
async fn start_then_kill() {
    let dir = tempfile::tempdir().unwrap();
    let agent = connected_agent(dir.path());
    agent.policy().add("sleep", 2, "test").unwrap();

    let p = agent.start_process("sleep 5", "", &BTreeMap::new()).unwrap();
    assert_eq!(p.name, "sleep");
    assert_eq!(p.status, ProcessStatus::Running);
    assert!(p.pid > 0);
    assert_eq!(agent.supervisor().list_processes().len(), 1);

    let killed = agent.supervisor().kill_process(p.pid).unwrap();
    assert_eq!(killed.status, ProcessStatus::Killed);
    assert!(agent.supervisor().list_processes().is_empty());

    if cfg!(target_os = "linux") {
        let mut gone = false;
        for _ in 0..50 {
            if !alive(p.pid) {
                gone = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(gone, "pid {} still alive after kill", p.pid);
    }
}

#[tokio::test]
async fn stop_sends_terminate() {
    let dir = tempfile::tempdir().unwrap();
    let agent = connected_agent(dir.path());
    agent.policy().add("sleep", 2, "test").unwrap();

    let p = agent.start_process("sleep 5", "sleeper", &BTreeMap::new()).unwrap();
    let stopped = agent.supervisor().stop_process(p.pid).unwrap();
    assert_eq!(stopped.status, ProcessStatus::Stopping);
    assert_eq!(stopped.name, "sleeper");
    // The child may already be reaped after the terminate.
    match agent.supervisor().kill_process(p.pid) {
        Ok(_) | Err(AgentError::NotFound(_)) => {}
        Err(e) => panic!("unexpected kill failure: {e}"),
    }
}

#[tokio::test]
async fn exited_process_leaves_the_table() {
    let dir = tempfile::tempdir().unwrap();
    let agent = connected_agent(dir.path());
    agent.policy().add("true", 2, "test").unwrap();

    let p = agent.start_process("true", "", &BTreeMap::new()).unwrap();
    let mut forgotten = false;
    for _ in 0..100 {
        if agent.supervisor().list_processes().is_empty() {
            forgotten = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(forgotten, "pid {} still listed after exiting", p.pid);
    assert!(matches!(
        agent.supervisor().stop_process(p.pid),
        Err(AgentError::NotFound(_))
    ));
    assert!(matches!(
        agent.supervisor().kill_process(p.pid),
        Err(AgentError::NotFound(_))
    ));
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn own_usage_is_sampled() {
    let dir = tempfile::tempdir().unwrap();
    let agent = connected_agent(dir.path());
    let own = agent.supervisor().own_pid();
    let usage = agent.supervisor().get_resource_usage(own).unwrap();
    assert!(usage.sampled);
    assert!(usage.memory_bytes > 0);
    assert!(usage.threads >= 1);
}
