//! Composition root: builds every component once from an `AgentConfig`
//! and hands them to the orchestrator.

use std::path::PathBuf;
use std::sync::Arc;

use warden_common::AgentConfig;

use crate::application::ports::{Clock, CommandRunner, ProcessControl};
use crate::application::services::{
    AuditLog, ConnectionManager, ExecutionEngine, Orchestrator, PolicyEngine, ProcessSupervisor,
};
use crate::infra::{OsProcessControl, SystemClock, TokioCommandRunner};

/// The production agent: shell runner, OS process control, wall clock.
pub type LocalAgent = Orchestrator<TokioCommandRunner, OsProcessControl>;

/// Build the production agent.
#[must_use]
pub fn build_local_agent(config: &AgentConfig) -> LocalAgent {
    build_agent(
        config,
        TokioCommandRunner,
        OsProcessControl::default(),
        Arc::new(SystemClock),
    )
}

/// Build an agent over arbitrary port implementations.
pub fn build_agent<R: CommandRunner, P: ProcessControl>(
    config: &AgentConfig,
    runner: R,
    control: P,
    clock: Arc<dyn Clock>,
) -> Orchestrator<R, P> {
    let audit = Arc::new(AuditLog::new(config.audit_capacity, clock.clone()));
    let policy = Arc::new(PolicyEngine::new(
        audit.clone(),
        clock.clone(),
        config.policy_log_capacity,
    ));
    let cwd = config.working_dir.as_ref().map_or_else(
        || std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        PathBuf::from,
    );
    let executor = Arc::new(ExecutionEngine::new(
        runner,
        cwd,
        config.history_capacity,
        config.default_timeout(),
        clock.clone(),
    ));
    let supervisor = Arc::new(ProcessSupervisor::new(control, clock.clone()));
    let connection = Arc::new(ConnectionManager::new(
        config.heartbeat_interval(),
        config.max_reconnect_attempts,
        config.message_queue_capacity,
        clock,
    ));

    Orchestrator::new(connection, policy, executor, supervisor, audit)
}
