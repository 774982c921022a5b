use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Free-form string metadata attached to audit entries, messages and
/// capability calls.
pub type Details = BTreeMap<String, String>;

/// Lowest risk level a whitelist entry may carry.
pub const MIN_RISK: u8 = 1;

/// Highest risk level; also the base risk of unknown commands.
pub const MAX_RISK: u8 = 10;

/// Clamp an operator-supplied risk level into `[MIN_RISK, MAX_RISK]`.
#[must_use]
pub fn clamp_risk(level: i64) -> u8 {
    // Bounded by the clamp, so the cast is lossless.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let clamped = level.clamp(i64::from(MIN_RISK), i64::from(MAX_RISK)) as u8;
    clamped
}

// ── Session ──────────────────────────────────────────────────────────────────

/// Lifecycle state of the controller session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Disconnected,
    Connected,
    Authenticated,
}

/// A message queued on the session for the controller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingMessage {
    #[serde(rename = "type")]
    pub message_type: String,
    pub payload: Details,
    pub timestamp: DateTime<Utc>,
}

/// Result of a successful `establish`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Established {
    pub host: String,
    pub port: u16,
    pub channel_id: String,
}

/// Result of `authenticate`. A wrong token is a normal outcome, not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthOutcome {
    pub authenticated: bool,
    /// True when the session was established without a token.
    pub open_mode: bool,
}

/// Result of `sendHeartbeat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatAck {
    pub channel_id: String,
    /// Time spent stamping the heartbeat, in milliseconds.
    pub latency_ms: f64,
}

/// Result of `checkHeartbeat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatHealth {
    pub healthy: bool,
    pub connected: bool,
    /// Seconds since the last heartbeat, if one was ever stamped.
    pub seconds_since_heartbeat: Option<f64>,
    pub threshold_secs: u64,
}

/// Result of a successful `reconnect`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reconnected {
    pub channel_id: String,
    pub attempt: u32,
    pub max_attempts: u32,
}

/// Result of `sendMessage`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageQueued {
    pub queued: usize,
    /// True when the queue was full and the oldest message was evicted.
    pub dropped_oldest: bool,
}

/// Snapshot returned by `getStatus`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatus {
    pub state: SessionState,
    pub connected: bool,
    pub authenticated: bool,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub channel_id: Option<String>,
    pub reconnect_attempts: u32,
    pub pending_messages: usize,
    pub last_heartbeat: Option<DateTime<Utc>>,
}

/// Observability counters for the connection manager.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionStats {
    pub connections: u64,
    pub auth_failures: u64,
    pub heartbeats: u64,
    pub messages_queued: u64,
    pub messages_dropped: u64,
    pub reconnects: u64,
}

/// `getSummary` for the connection manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub status: SessionStatus,
    pub stats: ConnectionStats,
}

// ── Policy ───────────────────────────────────────────────────────────────────

/// One allow-list rule over a command's first token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PolicyEntry {
    pub pattern: String,
    pub risk_level: u8,
    pub description: String,
    pub added_at: DateTime<Utc>,
}

/// Operator rule evaluated before the allow-list; wins on match.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OverrideRule {
    pub pattern: String,
    pub allowed: bool,
    pub reason: String,
    pub added_at: DateTime<Utc>,
}

/// Which stage of the authorization pipeline produced a decision.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStage {
    Disabled,
    Empty,
    DangerousPattern,
    BlockedCommand,
    Override,
    AllowList,
    NoMatch,
}

/// Outcome of `authorize`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub reason: String,
    pub risk_level: u8,
    pub stage: DecisionStage,
    /// The pattern that decided the outcome, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_pattern: Option<String>,
}

/// Advisory risk bucket.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Bucket a 1..=10 score: low ≤3, medium ≤6, high ≤8, critical above.
    #[must_use]
    pub fn from_score(score: u8) -> Self {
        match score {
            0..=3 => Self::Low,
            4..=6 => Self::Medium,
            7..=8 => Self::High,
            _ => Self::Critical,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of `scoreRisk`. Informational only.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RiskScore {
    pub risk: u8,
    pub level: RiskLevel,
    pub base_risk: u8,
    pub bonus: u8,
}

/// Outcome of `blockDangerous`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DangerCheck {
    pub dangerous: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

/// Outcome of `checkPath`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PathCheck {
    pub allowed: bool,
    pub reason: String,
}

/// A single resource limit breach.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceViolation {
    pub resource: String,
    pub limit: u64,
    pub actual: u64,
}

/// Outcome of `checkResources`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceCheck {
    pub allowed: bool,
    pub violations: Vec<ResourceViolation>,
}

/// One entry in the policy change log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PolicyChange {
    pub action: String,
    pub pattern: String,
    pub detail: String,
    pub timestamp: DateTime<Utc>,
}

/// Full dump of the policy tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicySnapshot {
    pub enabled: bool,
    pub entries: Vec<PolicyEntry>,
    pub overrides: Vec<OverrideRule>,
    pub blocked_commands: Vec<String>,
    pub allowed_paths: Vec<String>,
    pub resource_limits: BTreeMap<String, u64>,
}

/// Decision counters for the policy engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PolicyStats {
    pub checks: u64,
    pub allowed: u64,
    pub denied: u64,
    pub dangerous_blocked: u64,
}

/// `getSummary` for the policy engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicySummary {
    pub enabled: bool,
    pub entry_count: usize,
    pub override_count: usize,
    pub blocked_count: usize,
    pub audit_count: usize,
    pub stats: PolicyStats,
}

// ── Audit ────────────────────────────────────────────────────────────────────

/// Append-only record of a security-relevant event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuditEntry {
    pub action: String,
    pub details: Details,
    pub timestamp: DateTime<Utc>,
}

// ── Execution ────────────────────────────────────────────────────────────────

/// Return code recorded for executions killed by the timeout.
pub const TIMEOUT_RETURN_CODE: i32 = -1;

/// One finished (or timed out) command execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionRecord {
    pub command: String,
    pub return_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub elapsed_seconds: f64,
    pub timestamp: DateTime<Utc>,
    pub cwd: String,
}

impl ExecutionRecord {
    #[must_use]
    pub fn success(&self) -> bool {
        self.return_code == 0
    }
}

/// Outcome of `execute`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionReport {
    pub success: bool,
    pub timed_out: bool,
    /// `"timeout"` or `"exit code N"` when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub record: ExecutionRecord,
}

/// Counters for the execution engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutionStats {
    pub executions: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub timeouts: u64,
}

/// `getSummary` for the execution engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub history_count: usize,
    pub cwd: String,
    pub stats: ExecutionStats,
}

// ── Processes ────────────────────────────────────────────────────────────────

/// Lifecycle of a supervised process.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    Running,
    Stopping,
    Killed,
}

/// A child process started and tracked by the supervisor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ManagedProcess {
    pub pid: u32,
    pub name: String,
    pub command: String,
    pub status: ProcessStatus,
    pub started_at: DateTime<Utc>,
}

/// Best-effort resource snapshot. Not authoritative unless `sampled`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceUsage {
    pub pid: u32,
    pub memory_bytes: u64,
    pub threads: u32,
    pub cpu_percent: f64,
    /// False when the figures are zeroed placeholders.
    pub sampled: bool,
}

/// Result of `runCommand` on the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandOutcome {
    pub decision: Decision,
    pub risk: RiskScore,
    pub report: ExecutionReport,
}
