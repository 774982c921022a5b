//! Managed-process bookkeeping over a fake process controller.

use std::collections::BTreeMap;

use warden_agent::AgentError;
use warden_agent::application::ports::ProcessSignal;
use warden_common::ProcessStatus;

use crate::mocks::supervisor;

#[test]
fn start_registers_running_process() {
    let sup = supervisor();
    let p = sup
        .start_process("sleep 5", "", &BTreeMap::new())
        .unwrap();
    assert_eq!(p.name, "sleep", "name defaults to first token");
    assert_eq!(p.status, ProcessStatus::Running);
    assert_eq!(sup.get_process(p.pid).unwrap(), p);

    let named = sup
        .start_process("python3 -m http.server", "web", &BTreeMap::new())
        .unwrap();
    assert_eq!(named.name, "web");
    assert_ne!(named.pid, p.pid);
    assert_eq!(sup.list_processes().len(), 2);
}

#[test]
fn start_rejects_bad_input() {
    let sup = supervisor();
    assert!(matches!(
        sup.start_process("   ", "x", &BTreeMap::new()),
        Err(AgentError::InvalidArgument(_))
    ));
    let env = BTreeMap::from([(String::new(), "v".to_string())]);
    assert!(matches!(
        sup.start_process("sleep 1", "", &env),
        Err(AgentError::InvalidArgument(_))
    ));
    assert!(sup.list_processes().is_empty());
}

#[test]
fn stop_marks_stopping_and_sends_terminate() {
    let sup = supervisor();
    let p = sup.start_process("sleep 5", "", &BTreeMap::new()).unwrap();
    let stopped = sup.stop_process(p.pid).unwrap();
    assert_eq!(stopped.status, ProcessStatus::Stopping);
    assert_eq!(sup.get_process(p.pid).unwrap().status, ProcessStatus::Stopping);
}

#[test]
fn kill_forgets_process_and_monitor_entry() {
    let sup = supervisor();
    let p = sup.start_process("sleep 5", "", &BTreeMap::new()).unwrap();
    assert!(sup.monitor(p.pid).unwrap());

    let killed = sup.kill_process(p.pid).unwrap();
    assert_eq!(killed.status, ProcessStatus::Killed);
    assert!(sup.list_processes().is_empty());
    assert!(sup.monitored().is_empty());
    assert!(matches!(
        sup.kill_process(p.pid),
        Err(AgentError::NotFound(_))
    ));
}

#[test]
fn signals_reach_the_controller() {
    let sup = supervisor();
    let a = sup.start_process("sleep 5", "", &BTreeMap::new()).unwrap();
    let b = sup.start_process("sleep 6", "", &BTreeMap::new()).unwrap();
    sup.stop_process(a.pid).unwrap();
    sup.kill_process(b.pid).unwrap();
    assert_eq!(
        *sup.control().signals.lock(),
        vec![(a.pid, ProcessSignal::Terminate), (b.pid, ProcessSignal::Kill)]
    );
}

#[test]
fn unknown_pids_are_not_found() {
    let sup = supervisor();
    assert!(matches!(sup.stop_process(4242), Err(AgentError::NotFound(_))));
    assert!(matches!(sup.kill_process(4242), Err(AgentError::NotFound(_))));
    assert!(matches!(sup.get_process(4242), Err(AgentError::NotFound(_))));
    assert!(matches!(
        sup.get_resource_usage(4242),
        Err(AgentError::NotFound(_))
    ));
}

#[test]
fn monitor_is_idempotent() {
    let sup = supervisor();
    assert!(matches!(sup.monitor(0), Err(AgentError::InvalidArgument(_))));
    assert!(sup.monitor(77).unwrap());
    assert!(!sup.monitor(77).unwrap());
    assert_eq!(sup.monitored(), vec![77]);
    sup.unmonitor(77).unwrap();
    assert!(matches!(sup.unmonitor(77), Err(AgentError::NotFound(_))));
}

#[test]
fn usage_for_managed_and_own_pid() {
    let sup = supervisor();
    let p = sup.start_process("sleep 5", "", &BTreeMap::new()).unwrap();
    let usage = sup.get_resource_usage(p.pid).unwrap();
    assert_eq!(usage.pid, p.pid);
    assert!(usage.sampled);

    let own = sup.get_resource_usage(sup.own_pid()).unwrap();
    assert_eq!(own.pid, std::process::id());
}

#[test]
fn exited_children_are_forgotten_and_never_signalled() {
    let sup = supervisor();
    let gone = sup.start_process("true", "", &BTreeMap::new()).unwrap();
    let kept = sup.start_process("sleep 5", "", &BTreeMap::new()).unwrap();
    sup.monitor(gone.pid).unwrap();

    sup.control().exit(gone.pid);

    assert_eq!(sup.list_processes(), vec![kept.clone()]);
    assert!(sup.monitored().is_empty());
    assert!(matches!(sup.stop_process(gone.pid), Err(AgentError::NotFound(_))));
    assert!(matches!(sup.kill_process(gone.pid), Err(AgentError::NotFound(_))));
    assert!(sup.control().signals.lock().is_empty());
    assert_eq!(sup.get_process(kept.pid).unwrap().status, ProcessStatus::Running);
}
