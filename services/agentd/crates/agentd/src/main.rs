//! Warden agent daemon entry point.
//!
//! Initialises tracing, loads configuration from `WARDEN_*` environment
//! variables, builds the local agent and serves its JSON surface over HTTP
//! until Ctrl-C. A watchdog task keeps the controller session alive.

mod routes;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tokio::time::MissedTickBehavior;
use tracing_subscriber::EnvFilter;
use warden_agent::application::services::Maintenance;
use warden_agent::{AgentError, AgentResult, build_local_agent};
use warden_common::{AgentConfig, ServerConfig};

use crate::routes::SharedAgent;

/// Environment prefix shared by every configuration struct.
///
/// Each field maps to `WARDEN_<FIELD>`:
///   - `WARDEN_LISTEN_ADDR`              (default `127.0.0.1:8790`)
///   - `WARDEN_ALLOW_REMOTE`             (default `false`)
///   - `WARDEN_HEARTBEAT_INTERVAL_SECS`  (default `30`)
///   - `WARDEN_MAX_RECONNECT_ATTEMPTS`   (default `5`)
///   - `WARDEN_DEFAULT_TIMEOUT_SECS`     (default `30`)
///   - `WARDEN_WORKING_DIR`              (default: process cwd)
const ENV_PREFIX: &str = "WARDEN_";

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialise tracing with RUST_LOG env filter.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!("warden-agentd starting");

    // 2. Load configuration from WARDEN_* env vars.
    let agent_config: AgentConfig = envy::prefixed(ENV_PREFIX)
        .from_env()
        .context("failed to load agent config from WARDEN_* env vars")?;
    let server_config: ServerConfig = envy::prefixed(ENV_PREFIX)
        .from_env()
        .context("failed to load server config from WARDEN_* env vars")?;
    agent_config.validate().map_err(|e| anyhow!(e))?;
    server_config.validate().map_err(|e| anyhow!(e))?;

    tracing::info!(
        listen_addr = %server_config.listen_addr,
        heartbeat_interval_secs = agent_config.heartbeat_interval_secs,
        max_reconnect_attempts = agent_config.max_reconnect_attempts,
        default_timeout_secs = agent_config.default_timeout_secs,
        working_dir = ?agent_config.working_dir,
        "configuration loaded",
    );

    // 3. Build the agent and start the session watchdog.
    let agent: SharedAgent = Arc::new(build_local_agent(&agent_config));
    let watchdog = spawn_watchdog(agent.clone(), agent_config.heartbeat_interval());

    // 4. Bind and serve.
    let listener = tokio::net::TcpListener::bind(server_config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", server_config.listen_addr))?;

    tracing::info!("agent daemon ready at http://{}", server_config.listen_addr);

    axum::serve(listener, routes::router(agent))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    watchdog.abort();
    tracing::info!("warden-agentd shut down");
    Ok(())
}

/// Periodically check heartbeat freshness and reconnect stale sessions.
/// Exhaustion is logged and left for an operator.
fn spawn_watchdog(agent: SharedAgent, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut watch = SessionWatch::default();
        loop {
            ticker.tick().await;
            watch.observe(&agent.maintain_session());
        }
    })
}

/// Logs watchdog outcomes. A session stuck at its reconnect cap is
/// reported once, not on every tick.
#[derive(Debug, Default)]
struct SessionWatch {
    exhausted: bool,
}

impl SessionWatch {
    /// Returns `true` when the outcome was logged at error level.
    fn observe(&mut self, outcome: &AgentResult<Maintenance>) -> bool {
        match outcome {
            Ok(Maintenance::Reconnected(r)) => {
                self.exhausted = false;
                tracing::info!(
                    channel_id = %r.channel_id,
                    attempt = r.attempt,
                    max_attempts = r.max_attempts,
                    "session re-established",
                );
                false
            }
            Ok(Maintenance::Healthy(_) | Maintenance::Idle) => {
                self.exhausted = false;
                false
            }
            Err(e @ AgentError::RetryExhausted { .. }) if self.exhausted => {
                tracing::debug!(error = %e, "session still exhausted");
                false
            }
            Err(e) => {
                self.exhausted = matches!(e, AgentError::RetryExhausted { .. });
                tracing::error!(error = %e, "session maintenance failed");
                true
            }
        }
    }
}

/// Wait for SIGINT (Ctrl-C) for graceful shutdown.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("received shutdown signal");
}
