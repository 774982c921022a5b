//! Infrastructure implementation of the `CommandRunner` port.
//!
//! `TokioCommandRunner` runs command lines through the platform shell with a
//! guaranteed timeout and kill on all platforms.

use std::process::{ExitStatus, Stdio};

use tokio::io::AsyncReadExt;

use crate::application::ports::{CommandRunner, CommandSpec, RunOutcome};
use crate::domain::{AgentError, AgentResult};

#[cfg(unix)]
const SHELL: (&str, &str) = ("sh", "-c");
#[cfg(windows)]
const SHELL: (&str, &str) = ("cmd", "/C");

/// A `tokio::process::Command` that hands `command` to the platform shell.
/// On Unix the child leads its own process group so the whole tree can be
/// signalled at once.
pub(crate) fn shell_command(command: &str) -> tokio::process::Command {
    let (program, flag) = SHELL;
    let mut cmd = tokio::process::Command::new(program);
    cmd.arg(flag).arg(command);
    #[cfg(unix)]
    cmd.process_group(0);
    cmd
}

pub(crate) fn spawn_error(source: std::io::Error) -> AgentError {
    AgentError::Spawn {
        program: SHELL.0.to_string(),
        source,
    }
}

/// Production `CommandRunner`.
///
/// `tokio::time::timeout` around `.output().await` would only drop the
/// future; the OS process keeps running. This runner uses `tokio::select!`
/// with an explicit group kill so the command and anything it forked are
/// terminated.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioCommandRunner;

impl CommandRunner for TokioCommandRunner {
    async fn run(&self, spec: CommandSpec) -> AgentResult<RunOutcome> {
        let mut child = shell_command(&spec.command)
            .current_dir(&spec.cwd)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(if spec.capture_stderr {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_error)?;

        let pid = child.id();
        let mut stdout_handle = child.stdout.take();
        let mut stderr_handle = child.stderr.take();

        tokio::select! {
            result = async {
                let (status, stdout, stderr) = tokio::join!(
                    child.wait(),
                    async {
                        let mut buf = Vec::new();
                        if let Some(ref mut h) = stdout_handle {
                            let _ = h.read_to_end(&mut buf).await;
                        }
                        buf
                    },
                    async {
                        let mut buf = Vec::new();
                        if let Some(ref mut h) = stderr_handle {
                            let _ = h.read_to_end(&mut buf).await;
                        }
                        buf
                    },
                );
                let status = status
                    .map_err(|e| AgentError::Internal(format!("waiting for command: {e}")))?;
                Ok::<_, AgentError>(RunOutcome::Completed {
                    return_code: exit_code(status),
                    stdout: String::from_utf8_lossy(&stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&stderr).into_owned(),
                })
            } => result,
            () = tokio::time::sleep(spec.timeout) => {
                if let Some(pid) = pid {
                    kill_group(pid);
                }
                let _ = child.kill().await;
                Ok(RunOutcome::TimedOut)
            }
        }
    }
}

/// Exit code, or `128 + signal` for a signal-terminated child on Unix.
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}

#[cfg(unix)]
fn kill_group(pid: u32) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    if let Ok(raw) = i32::try_from(pid) {
        if let Err(errno) = killpg(Pid::from_raw(raw), Signal::SIGKILL) {
            tracing::debug!(pid, %errno, "process group already gone");
        }
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: u32) {}
