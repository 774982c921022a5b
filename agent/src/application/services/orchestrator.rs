//! Agent orchestrator: wires the session, policy, execution and process
//! components so that every inbound request is session-checked and
//! authorized before anything runs.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use warden_common::{
    CommandOutcome, Decision, Details, HeartbeatHealth, ManagedProcess, Reconnected,
};

use crate::application::ports::{CapabilityProvider, CommandRunner, ProcessControl};
use crate::application::services::audit::AuditLog;
use crate::application::services::connection::ConnectionManager;
use crate::application::services::executor::ExecutionEngine;
use crate::application::services::policy::PolicyEngine;
use crate::application::services::supervisor::ProcessSupervisor;
use crate::domain::{AgentError, AgentResult};

/// What `maintain_session` did.
#[derive(Debug, Clone)]
pub enum Maintenance {
    /// Heartbeat is fresh.
    Healthy(HeartbeatHealth),
    /// No live session; nothing to maintain.
    Idle,
    /// The session was stale and has been re-established.
    Reconnected(Reconnected),
}

pub struct Orchestrator<R: CommandRunner, P: ProcessControl> {
    connection: Arc<ConnectionManager>,
    policy: Arc<PolicyEngine>,
    executor: Arc<ExecutionEngine<R>>,
    supervisor: Arc<ProcessSupervisor<P>>,
    audit: Arc<AuditLog>,
    capabilities: RwLock<BTreeMap<String, Arc<dyn CapabilityProvider>>>,
}

impl<R: CommandRunner, P: ProcessControl> Orchestrator<R, P> {
    #[must_use]
    pub fn new(
        connection: Arc<ConnectionManager>,
        policy: Arc<PolicyEngine>,
        executor: Arc<ExecutionEngine<R>>,
        supervisor: Arc<ProcessSupervisor<P>>,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            connection,
            policy,
            executor,
            supervisor,
            audit,
            capabilities: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn policy(&self) -> &PolicyEngine {
        &self.policy
    }

    pub fn executor(&self) -> &ExecutionEngine<R> {
        &self.executor
    }

    pub fn supervisor(&self) -> &ProcessSupervisor<P> {
        &self.supervisor
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Commands and every state mutation need a live, authenticated session.
    ///
    /// # Errors
    ///
    /// `NotConnected` without a session, `PreconditionFailed` before
    /// authentication.
    pub fn require_session(&self) -> AgentResult<()> {
        if !self.connection.is_connected() {
            return Err(AgentError::NotConnected("no active session".to_string()));
        }
        if !self.connection.is_authenticated() {
            return Err(AgentError::PreconditionFailed(
                "session is not authenticated".to_string(),
            ));
        }
        Ok(())
    }

    /// Authorize `command`, turning a refusal into `AgentError::Denied`.
    pub fn authorize(&self, command: &str) -> AgentResult<Decision> {
        let decision = self.policy.authorize(command);
        if decision.allowed {
            Ok(decision)
        } else {
            Err(AgentError::Denied {
                reason: decision.reason,
                risk_level: decision.risk_level,
            })
        }
    }

    /// Session check → authorize → execute → audit → report on the session.
    pub async fn run_command(
        &self,
        command: &str,
        timeout: Option<Duration>,
        env: &BTreeMap<String, String>,
        capture_stderr: bool,
    ) -> AgentResult<CommandOutcome> {
        self.require_session()?;
        let decision = self.authorize(command)?;
        let risk = self.policy.score_risk(command)?;
        let report = self
            .executor
            .execute(command, timeout, env, capture_stderr)
            .await?;

        let mut details = Details::from([
            ("command".to_string(), command.to_string()),
            ("return_code".to_string(), report.record.return_code.to_string()),
            ("success".to_string(), report.success.to_string()),
            ("risk".to_string(), risk.risk.to_string()),
        ]);
        if let Some(reason) = &report.reason {
            details.insert("reason".to_string(), reason.clone());
        }
        if let Err(e) = self.audit.record("execute", details.clone()) {
            tracing::warn!(error = %e, "failed to audit execution");
        }
        if let Err(e) = self.connection.send_message("command_result", details) {
            tracing::warn!(error = %e, "could not queue command result");
        }

        Ok(CommandOutcome {
            decision,
            risk,
            report,
        })
    }

    /// Start a managed process behind the same session and policy gate.
    pub fn start_process(
        &self,
        command: &str,
        name: &str,
        env: &BTreeMap<String, String>,
    ) -> AgentResult<ManagedProcess> {
        self.require_session()?;
        self.authorize(command)?;
        let process = self.supervisor.start_process(command, name, env)?;
        let details = Details::from([
            ("command".to_string(), process.command.clone()),
            ("name".to_string(), process.name.clone()),
            ("pid".to_string(), process.pid.to_string()),
        ]);
        if let Err(e) = self.audit.record("start_process", details) {
            tracing::warn!(error = %e, "failed to audit process start");
        }
        Ok(process)
    }

    /// Reconnect a connected session whose heartbeat went stale. An
    /// explicitly disconnected session is left alone.
    pub fn maintain_session(&self) -> AgentResult<Maintenance> {
        let health = self.connection.check_heartbeat();
        if health.healthy {
            return Ok(Maintenance::Healthy(health));
        }
        if !health.connected || !self.connection.has_host() {
            return Ok(Maintenance::Idle);
        }
        tracing::warn!(
            seconds_since_heartbeat = ?health.seconds_since_heartbeat,
            threshold_secs = health.threshold_secs,
            "heartbeat stale; reconnecting",
        );
        self.connection.reconnect().map(Maintenance::Reconnected)
    }

    // ── Capabilities ─────────────────────────────────────────────────────────

    /// Register (or replace) a named collaborator. Returns true on replace.
    pub fn register_capability(
        &self,
        name: &str,
        provider: Arc<dyn CapabilityProvider>,
    ) -> AgentResult<bool> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AgentError::InvalidArgument(
                "capability name is required".to_string(),
            ));
        }
        let replaced = self
            .capabilities
            .write()
            .insert(name.to_string(), provider)
            .is_some();
        tracing::info!(capability = name, replaced, "capability registered");
        Ok(replaced)
    }

    pub fn invoke_capability(&self, name: &str, action: &str, args: &Details) -> AgentResult<Details> {
        self.require_session()?;
        if action.trim().is_empty() {
            return Err(AgentError::InvalidArgument("action is required".to_string()));
        }
        let provider = self
            .capabilities
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| AgentError::NotFound(format!("no capability named '{name}'")))?;

        let details = Details::from([
            ("capability".to_string(), name.to_string()),
            ("action".to_string(), action.to_string()),
        ]);
        if let Err(e) = self.audit.record("capability", details) {
            tracing::warn!(error = %e, "failed to audit capability call");
        }
        provider.invoke(action, args)
    }

    #[must_use]
    pub fn capabilities(&self) -> Vec<String> {
        self.capabilities.read().keys().cloned().collect()
    }
}
