//! Request bodies for the agent daemon's JSON surface.
//!
//! Response payloads are the record types in [`crate::types`], wrapped in
//! [`crate::Envelope`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::Details;

// ── Session ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstablishRequest {
    pub host: String,
    /// Kept wide so out-of-range values reach validation instead of failing
    /// deserialization.
    pub port: i64,
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticateRequest {
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageRequest {
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(default)]
    pub payload: Details,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LimitQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

// ── Policy ───────────────────────────────────────────────────────────────────

/// Body for every endpoint that takes a single command string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRequest {
    pub command: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddEntryRequest {
    pub pattern: String,
    /// Clamped into 1..=10 on insert.
    pub risk_level: i64,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverrideRequest {
    pub pattern: String,
    pub allowed: bool,
    #[serde(default)]
    pub reason: String,
}

/// Body for removals and blocked-command edits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternRequest {
    pub pattern: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetEnabledRequest {
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecordRequest {
    pub action: String,
    #[serde(default)]
    pub details: Details,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathRequest {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceLimitRequest {
    pub resource: String,
    pub max: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceUsageRequest {
    #[serde(default)]
    pub usage: BTreeMap<String, u64>,
}

/// Generic acknowledgement for mutations without a richer result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ack {
    /// Whether the call changed anything.
    pub changed: bool,
}

// ── Execution ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub command: String,
    /// Falls back to the configured default when absent.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default = "default_true")]
    pub capture_stderr: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingDirRequest {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvVarRequest {
    pub key: String,
    #[serde(default)]
    pub value: String,
}

// ── Processes ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartProcessRequest {
    pub command: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

// ── Capabilities ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityRequest {
    pub name: String,
    pub action: String,
    #[serde(default)]
    pub args: Details,
}

fn default_true() -> bool {
    true
}
