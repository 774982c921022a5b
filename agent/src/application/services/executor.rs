//! Execution engine: runs authorized one-shot commands under a wall-clock
//! bound and keeps a bounded history.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use warden_common::{
    ExecutionRecord, ExecutionReport, ExecutionStats, ExecutionSummary, TIMEOUT_RETURN_CODE,
};

use crate::application::ports::{Clock, CommandRunner, CommandSpec, RunOutcome};
use crate::domain::{AgentError, AgentResult, BoundedLog};

struct ExecState {
    cwd: PathBuf,
    env: BTreeMap<String, String>,
    history: BoundedLog<ExecutionRecord>,
    stats: ExecutionStats,
}

pub struct ExecutionEngine<R: CommandRunner> {
    runner: R,
    state: Mutex<ExecState>,
    default_timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl<R: CommandRunner> ExecutionEngine<R> {
    #[must_use]
    pub fn new(
        runner: R,
        cwd: PathBuf,
        history_capacity: usize,
        default_timeout: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            runner,
            state: Mutex::new(ExecState {
                cwd,
                env: BTreeMap::new(),
                history: BoundedLog::new(history_capacity),
                stats: ExecutionStats::default(),
            }),
            default_timeout,
            clock,
        }
    }

    /// Run `command` through the platform shell.
    ///
    /// A non-zero exit or a timeout is a report with `success=false`; only
    /// invalid input or a failed spawn is an error. Timed-out runs are
    /// recorded with return code -1 and stderr `"timeout"`.
    pub async fn execute(
        &self,
        command: &str,
        timeout: Option<Duration>,
        env_overrides: &BTreeMap<String, String>,
        capture_stderr: bool,
    ) -> AgentResult<ExecutionReport> {
        if command.trim().is_empty() {
            return Err(AgentError::InvalidArgument("command is required".to_string()));
        }
        let timeout = timeout.unwrap_or(self.default_timeout);
        if timeout.is_zero() {
            return Err(AgentError::InvalidArgument(
                "timeout must be greater than zero".to_string(),
            ));
        }
        for (key, value) in env_overrides {
            validate_env(key, value)?;
        }

        // Snapshot under the lock; never hold it across the await.
        let (cwd, mut env) = {
            let state = self.state.lock();
            (state.cwd.clone(), state.env.clone())
        };
        env.extend(env_overrides.iter().map(|(k, v)| (k.clone(), v.clone())));

        let timestamp = self.clock.now();
        let started = Instant::now();
        let outcome = self
            .runner
            .run(CommandSpec {
                command: command.to_string(),
                cwd: cwd.clone(),
                env,
                capture_stderr,
                timeout,
            })
            .await?;
        let elapsed_seconds = started.elapsed().as_secs_f64();

        let (record, timed_out) = match outcome {
            RunOutcome::Completed {
                return_code,
                stdout,
                stderr,
            } => (
                ExecutionRecord {
                    command: command.to_string(),
                    return_code,
                    stdout,
                    stderr: if capture_stderr { stderr } else { String::new() },
                    elapsed_seconds,
                    timestamp,
                    cwd: cwd.display().to_string(),
                },
                false,
            ),
            RunOutcome::TimedOut => (
                ExecutionRecord {
                    command: command.to_string(),
                    return_code: TIMEOUT_RETURN_CODE,
                    stdout: String::new(),
                    stderr: "timeout".to_string(),
                    elapsed_seconds,
                    timestamp,
                    cwd: cwd.display().to_string(),
                },
                true,
            ),
        };

        let success = !timed_out && record.success();
        {
            let mut state = self.state.lock();
            state.history.push(record.clone());
            state.stats.executions += 1;
            if timed_out {
                state.stats.timeouts += 1;
            } else if success {
                state.stats.succeeded += 1;
            } else {
                state.stats.failed += 1;
            }
        }

        let reason = if timed_out {
            tracing::warn!(command, timeout_secs = timeout.as_secs_f64(), "execution timed out");
            Some("timeout".to_string())
        } else if success {
            tracing::info!(command, elapsed_seconds, "execution finished");
            None
        } else {
            tracing::info!(command, return_code = record.return_code, "execution failed");
            Some(format!("exit code {}", record.return_code))
        };

        Ok(ExecutionReport {
            success,
            timed_out,
            reason,
            record,
        })
    }

    /// Change the directory used by every subsequent execution. Relative
    /// paths resolve against the current one.
    pub fn set_working_directory(&self, path: &str) -> AgentResult<PathBuf> {
        if path.trim().is_empty() {
            return Err(AgentError::InvalidArgument("path is required".to_string()));
        }
        let mut state = self.state.lock();
        let candidate = if Path::new(path).is_absolute() {
            PathBuf::from(path)
        } else {
            state.cwd.join(path)
        };
        if !candidate.exists() {
            return Err(AgentError::not_found(format!("{} does not exist", candidate.display())));
        }
        if !candidate.is_dir() {
            return Err(AgentError::invalid(format!(
                "{} is not a directory",
                candidate.display()
            )));
        }
        state.cwd.clone_from(&candidate);
        drop(state);

        tracing::info!(cwd = %candidate.display(), "working directory changed");
        Ok(candidate)
    }

    /// Upsert a variable in the persistent environment.
    pub fn set_env_var(&self, key: &str, value: &str) -> AgentResult<()> {
        validate_env(key, value)?;
        self.state.lock().env.insert(key.to_string(), value.to_string());
        tracing::debug!(key, "environment variable set");
        Ok(())
    }

    #[must_use]
    pub fn get_environment(&self) -> BTreeMap<String, String> {
        self.state.lock().env.clone()
    }

    /// The most recent `limit` records, oldest first. Does not mutate.
    #[must_use]
    pub fn get_history(&self, limit: usize) -> Vec<ExecutionRecord> {
        self.state.lock().history.recent(limit)
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    #[must_use]
    pub fn working_directory(&self) -> PathBuf {
        self.state.lock().cwd.clone()
    }

    #[must_use]
    pub fn stats(&self) -> ExecutionStats {
        self.state.lock().stats.clone()
    }

    #[must_use]
    pub fn summary(&self) -> ExecutionSummary {
        let state = self.state.lock();
        ExecutionSummary {
            history_count: state.history.len(),
            cwd: state.cwd.display().to_string(),
            stats: state.stats.clone(),
        }
    }
}

/// Keys must be non-empty and free of `=` and NUL; values free of NUL.
pub(crate) fn validate_env(key: &str, value: &str) -> AgentResult<()> {
    if key.is_empty() {
        return Err(AgentError::invalid("environment key is required"));
    }
    if key.contains('=') || key.contains('\0') {
        return Err(AgentError::invalid(format!(
            "environment key {key:?} contains '=' or NUL"
        )));
    }
    if value.contains('\0') {
        return Err(AgentError::invalid(format!(
            "environment value for {key} contains NUL"
        )));
    }
    Ok(())
}
