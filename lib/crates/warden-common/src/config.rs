use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

/// Tunables for the execution core.
///
/// Every field has a default so the struct can be loaded from a partial
/// environment (`WARDEN_HEARTBEAT_INTERVAL_SECS`, ...).
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct AgentConfig {
    /// Expected heartbeat cadence; a session is stale after twice this.
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,

    /// Consecutive reconnects allowed before `RetryExhausted`.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// Execution history cap (oldest dropped first).
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Audit log cap (oldest dropped first).
    #[serde(default = "default_audit_capacity")]
    pub audit_capacity: usize,

    /// Pending session message cap (oldest dropped first).
    #[serde(default = "default_message_queue_capacity")]
    pub message_queue_capacity: usize,

    /// Policy change log cap.
    #[serde(default = "default_policy_log_capacity")]
    pub policy_log_capacity: usize,

    /// Wall-clock bound for `execute` when the caller gives none.
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,

    /// Initial working directory for executions (process cwd when unset).
    #[serde(default)]
    pub working_dir: Option<String>,
}

impl AgentConfig {
    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    #[must_use]
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }

    /// Intervals and timeouts must be non-zero.
    pub fn validate(&self) -> Result<(), String> {
        if self.heartbeat_interval_secs == 0 {
            return Err("heartbeat_interval_secs must be greater than zero".to_string());
        }
        if self.default_timeout_secs == 0 {
            return Err("default_timeout_secs must be greater than zero".to_string());
        }
        Ok(())
    }
}

/// Agent daemon listener configuration.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ServerConfig {
    /// Listen address (default: 127.0.0.1:8790).
    /// The surface carries no transport security, so binding a
    /// non-loopback interface requires `allow_remote`.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    #[serde(default)]
    pub allow_remote: bool,
}

impl ServerConfig {
    /// Refuse non-loopback binds unless explicitly allowed.
    pub fn validate(&self) -> Result<(), String> {
        if !self.listen_addr.ip().is_loopback() && !self.allow_remote {
            return Err(format!(
                "refusing to listen on non-loopback address {} without allow_remote",
                self.listen_addr
            ));
        }
        Ok(())
    }
}

pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

fn default_heartbeat_interval_secs() -> u64 {
    DEFAULT_HEARTBEAT_INTERVAL_SECS
}

fn default_max_reconnect_attempts() -> u32 {
    DEFAULT_MAX_RECONNECT_ATTEMPTS
}

fn default_history_capacity() -> usize {
    DEFAULT_HISTORY_CAPACITY
}

fn default_audit_capacity() -> usize {
    1000
}

fn default_message_queue_capacity() -> usize {
    1000
}

fn default_policy_log_capacity() -> usize {
    500
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8790))
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            history_capacity: default_history_capacity(),
            audit_capacity: default_audit_capacity(),
            message_queue_capacity: default_message_queue_capacity(),
            policy_log_capacity: default_policy_log_capacity(),
            default_timeout_secs: default_timeout_secs(),
            working_dir: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            allow_remote: false,
        }
    }
}
