//! Port trait definitions for the Application layer.
//!
//! Ports are the interfaces (contracts) that infrastructure must fulfill.
//! This file imports only from `crate::domain` and `warden_common`, never
//! from `crate::infra`.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use warden_common::{Details, ResourceUsage};

use crate::domain::AgentResult;

// ── Value Types ───────────────────────────────────────────────────────────────

/// Everything a runner needs to execute one shell command line.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// Raw command line, handed to the platform shell.
    pub command: String,
    pub cwd: PathBuf,
    /// Merged persistent env and per-call overrides, applied on top of the
    /// agent's own environment.
    pub env: BTreeMap<String, String>,
    /// When false, stderr is discarded instead of captured.
    pub capture_stderr: bool,
    pub timeout: Duration,
}

/// How a runner's child finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed {
        return_code: i32,
        stdout: String,
        stderr: String,
    },
    /// The wall-clock bound fired and the child was killed.
    TimedOut,
}

/// Signals the supervisor delivers to managed processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessSignal {
    /// Graceful (SIGTERM).
    Terminate,
    /// Forced (SIGKILL).
    Kill,
}

// ── Command Runner Port ───────────────────────────────────────────────────────

/// Abstracts one-shot command execution so it can be mocked.
pub trait CommandRunner: Send + Sync {
    /// Run a command to completion or until `spec.timeout` elapses.
    ///
    /// Only a failure to spawn is an error; non-zero exits and timeouts are
    /// outcomes.
    fn run(&self, spec: CommandSpec) -> impl Future<Output = AgentResult<RunOutcome>> + Send;
}

// ── Process Control Port ──────────────────────────────────────────────────────

/// OS-level process operations used by the supervisor.
pub trait ProcessControl: Send + Sync {
    /// Spawn `command` detached from the caller and return its pid.
    fn spawn(&self, command: &str, env: &BTreeMap<String, String>) -> AgentResult<u32>;

    /// Deliver a signal to the process (group). A process that already
    /// exited is not an error.
    fn signal(&self, pid: u32, signal: ProcessSignal) -> AgentResult<()>;

    /// Best-effort resource snapshot.
    fn usage(&self, pid: u32) -> ResourceUsage;

    /// Pids of spawned children that exited since the previous call.
    fn take_exited(&self) -> Vec<u32>;
}

// ── Clock Port ────────────────────────────────────────────────────────────────

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

// ── Capability Port ───────────────────────────────────────────────────────────

/// An opaque collaborator (filesystem browser, clipboard, screen capture)
/// the orchestrator can dispatch to by name.
pub trait CapabilityProvider: Send + Sync {
    fn invoke(&self, action: &str, args: &Details) -> AgentResult<Details>;
}
