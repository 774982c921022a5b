//! Infrastructure implementation of the `ProcessControl` port: detached
//! spawning, process-group signals and `/proc` sampling.

use std::collections::BTreeMap;
use std::process::Stdio;
use std::sync::Arc;

use parking_lot::Mutex;
use warden_common::ResourceUsage;

use crate::application::ports::{ProcessControl, ProcessSignal};
use crate::domain::{AgentError, AgentResult};
use crate::infra::command_runner::{shell_command, spawn_error};

/// Production `ProcessControl`.
///
/// Spawning needs a tokio runtime: each child is reaped by a background
/// task so exited processes never linger as zombies. Reaped pids are
/// queued until the supervisor collects them with `take_exited`.
#[derive(Debug, Clone, Default)]
pub struct OsProcessControl {
    exited: Arc<Mutex<Vec<u32>>>,
}

impl ProcessControl for OsProcessControl {
    fn spawn(&self, command: &str, env: &BTreeMap<String, String>) -> AgentResult<u32> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| {
            AgentError::Internal("process spawning requires a tokio runtime".to_string())
        })?;

        let mut child = shell_command(command)
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(spawn_error)?;
        let pid = child
            .id()
            .ok_or_else(|| AgentError::Internal("spawned process has no pid".to_string()))?;

        // A recycled pid must not inherit an exit from its previous owner.
        self.exited.lock().retain(|&p| p != pid);

        let exited = Arc::clone(&self.exited);
        handle.spawn(async move {
            match child.wait().await {
                Ok(status) => tracing::debug!(pid, %status, "managed process exited"),
                Err(e) => tracing::warn!(pid, error = %e, "failed to reap managed process"),
            }
            exited.lock().push(pid);
        });
        Ok(pid)
    }

    /// Refuses pids already reaped: their process group may belong to
    /// someone else by now.
    fn signal(&self, pid: u32, signal: ProcessSignal) -> AgentResult<()> {
        if self.exited.lock().contains(&pid) {
            return Err(AgentError::NotFound(format!("pid {pid} has already exited")));
        }
        send_signal(pid, signal)
    }

    fn usage(&self, pid: u32) -> ResourceUsage {
        sample_usage(pid)
    }

    fn take_exited(&self) -> Vec<u32> {
        std::mem::take(&mut *self.exited.lock())
    }
}

/// Signal the process group led by `pid`. A group that no longer exists
/// counts as delivered.
#[cfg(unix)]
fn send_signal(pid: u32, signal: ProcessSignal) -> AgentResult<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let raw = i32::try_from(pid)
        .map_err(|_| AgentError::InvalidArgument(format!("pid {pid} out of range")))?;
    let sig = match signal {
        ProcessSignal::Terminate => Signal::SIGTERM,
        ProcessSignal::Kill => Signal::SIGKILL,
    };
    match killpg(Pid::from_raw(raw), sig) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(errno) => Err(AgentError::Internal(format!(
            "failed to send {sig:?} to pid {pid}: {errno}"
        ))),
    }
}

#[cfg(windows)]
fn send_signal(pid: u32, signal: ProcessSignal) -> AgentResult<()> {
    let pid_arg = pid.to_string();
    let mut args = vec!["/PID", pid_arg.as_str(), "/T"];
    if signal == ProcessSignal::Kill {
        args.push("/F");
    }
    std::process::Command::new("taskkill")
        .args(&args)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|_| ())
        .map_err(|e| AgentError::Internal(format!("taskkill failed for pid {pid}: {e}")))
}

#[cfg(target_os = "linux")]
fn sample_usage(pid: u32) -> ResourceUsage {
    match std::fs::read_to_string(format!("/proc/{pid}/status")) {
        Ok(text) => {
            let (memory_bytes, threads) = parse_proc_status(&text);
            ResourceUsage {
                pid,
                memory_bytes,
                threads,
                cpu_percent: 0.0,
                sampled: true,
            }
        }
        Err(e) => {
            tracing::debug!(pid, error = %e, "could not sample /proc");
            unsampled(pid)
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn sample_usage(pid: u32) -> ResourceUsage {
    unsampled(pid)
}

fn unsampled(pid: u32) -> ResourceUsage {
    ResourceUsage {
        pid,
        memory_bytes: 0,
        threads: 0,
        cpu_percent: 0.0,
        sampled: false,
    }
}

/// Extract `VmRSS` (as bytes) and `Threads` from `/proc/<pid>/status`.
/// Missing fields read as zero.
pub fn parse_proc_status(text: &str) -> (u64, u32) {
    let mut memory_bytes = 0;
    let mut threads = 0;
    for line in text.lines() {
        if let Some(rest) = line.strip_prefix("VmRSS:") {
            let kb: u64 = rest
                .split_whitespace()
                .next()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0);
            memory_bytes = kb.saturating_mul(1024);
        } else if let Some(rest) = line.strip_prefix("Threads:") {
            threads = rest.trim().parse().unwrap_or(0);
        }
    }
    (memory_bytes, threads)
}
