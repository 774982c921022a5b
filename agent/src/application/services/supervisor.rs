//! Process supervisor: long-lived children started, signalled and observed
//! independently of one-shot execution.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use warden_common::{ManagedProcess, ProcessStatus, ResourceUsage};

use crate::application::ports::{Clock, ProcessControl, ProcessSignal};
use crate::application::services::executor::validate_env;
use crate::domain::policy::first_token;
use crate::domain::{AgentError, AgentResult};

#[derive(Default)]
struct SupervisorState {
    managed: BTreeMap<u32, ManagedProcess>,
    /// Pids under observation; need not be managed.
    monitored: BTreeSet<u32>,
}

pub struct ProcessSupervisor<P: ProcessControl> {
    control: P,
    state: Mutex<SupervisorState>,
    clock: Arc<dyn Clock>,
    own_pid: u32,
}

impl<P: ProcessControl> ProcessSupervisor<P> {
    #[must_use]
    pub fn new(control: P, clock: Arc<dyn Clock>) -> Self {
        Self {
            control,
            state: Mutex::new(SupervisorState::default()),
            clock,
            own_pid: std::process::id(),
        }
    }

    /// Spawn and register a managed process. `name` defaults to the
    /// command's first token.
    pub fn start_process(
        &self,
        command: &str,
        name: &str,
        env: &BTreeMap<String, String>,
    ) -> AgentResult<ManagedProcess> {
        let command = command.trim();
        if command.is_empty() {
            return Err(AgentError::InvalidArgument("command is required".to_string()));
        }
        for (key, value) in env {
            validate_env(key, value)?;
        }
        let name = match name.trim() {
            "" => first_token(command).unwrap_or(command).to_string(),
            given => given.to_string(),
        };

        let pid = self.control.spawn(command, env)?;
        let process = ManagedProcess {
            pid,
            name,
            command: command.to_string(),
            status: ProcessStatus::Running,
            started_at: self.clock.now(),
        };
        self.lock_reaped().managed.insert(pid, process.clone());

        tracing::info!(pid, name = %process.name, command, "managed process started");
        Ok(process)
    }

    /// Send a graceful termination signal without waiting for exit.
    pub fn stop_process(&self, pid: u32) -> AgentResult<ManagedProcess> {
        let mut state = self.lock_reaped();
        let process = state
            .managed
            .get_mut(&pid)
            .ok_or_else(|| not_managed(pid))?;
        self.control.signal(pid, ProcessSignal::Terminate)?;
        process.status = ProcessStatus::Stopping;
        let stopped = process.clone();
        drop(state);

        tracing::info!(pid, "managed process stopping");
        Ok(stopped)
    }

    /// Force-kill and forget: the pid leaves both the managed and the
    /// monitored sets.
    pub fn kill_process(&self, pid: u32) -> AgentResult<ManagedProcess> {
        let mut state = self.lock_reaped();
        if !state.managed.contains_key(&pid) {
            return Err(not_managed(pid));
        }
        self.control.signal(pid, ProcessSignal::Kill)?;
        let mut killed = state.managed.remove(&pid).ok_or_else(|| not_managed(pid))?;
        state.monitored.remove(&pid);
        drop(state);

        killed.status = ProcessStatus::Killed;
        tracing::info!(pid, name = %killed.name, "managed process killed");
        Ok(killed)
    }

    /// Returns false when the pid was already monitored.
    pub fn monitor(&self, pid: u32) -> AgentResult<bool> {
        if pid == 0 {
            return Err(AgentError::InvalidArgument("pid must be positive".to_string()));
        }
        let added = self.lock_reaped().monitored.insert(pid);
        if added {
            tracing::debug!(pid, "monitoring process");
        }
        Ok(added)
    }

    pub fn unmonitor(&self, pid: u32) -> AgentResult<()> {
        if self.lock_reaped().monitored.remove(&pid) {
            Ok(())
        } else {
            Err(AgentError::not_found(format!("pid {pid} is not monitored")))
        }
    }

    #[must_use]
    pub fn monitored(&self) -> Vec<u32> {
        self.lock_reaped().monitored.iter().copied().collect()
    }

    /// Only managed pids and the agent's own pid may be sampled.
    pub fn get_resource_usage(&self, pid: u32) -> AgentResult<ResourceUsage> {
        if pid != self.own_pid && !self.lock_reaped().managed.contains_key(&pid) {
            return Err(not_managed(pid));
        }
        Ok(self.control.usage(pid))
    }

    #[must_use]
    pub fn list_processes(&self) -> Vec<ManagedProcess> {
        self.lock_reaped().managed.values().cloned().collect()
    }

    pub fn get_process(&self, pid: u32) -> AgentResult<ManagedProcess> {
        self.lock_reaped()
            .managed
            .get(&pid)
            .cloned()
            .ok_or_else(|| not_managed(pid))
    }

    /// Lock the tables after forgetting every child that has exited, so an
    /// exited pid is never signalled.
    fn lock_reaped(&self) -> MutexGuard<'_, SupervisorState> {
        let mut state = self.state.lock();
        for pid in self.control.take_exited() {
            state.monitored.remove(&pid);
            if let Some(process) = state.managed.remove(&pid) {
                tracing::info!(pid, name = %process.name, "managed process exited");
            }
        }
        state
    }

    pub fn control(&self) -> &P {
        &self.control
    }

    #[must_use]
    pub fn own_pid(&self) -> u32 {
        self.own_pid
    }
}

fn not_managed(pid: u32) -> AgentError {
    AgentError::not_found(format!("pid {pid} is not a managed process"))
}
