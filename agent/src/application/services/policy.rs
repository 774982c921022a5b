//! Command policy engine: the single gate between a raw command string and
//! execution.
//!
//! Decision pipeline, first match wins:
//! 0. empty command → deny, even when disabled
//! 1. engine disabled → allow
//! 2. dangerous-pattern blocklist (full text, case-insensitive) → deny, audited
//! 3. operator blocked-command globs → deny
//! 4. overrides in insertion order → the override's verdict
//! 5. allow-list → allow with the entry's risk
//! 6. otherwise deny, audited

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use warden_common::{
    AuditEntry, Decision, DecisionStage, DangerCheck, Details, MAX_RISK, OverrideRule, PathCheck,
    PolicyChange, PolicyEntry, PolicySnapshot, PolicyStats, PolicySummary, ResourceCheck,
    RiskScore, clamp_risk,
};

use crate::application::ports::Clock;
use crate::application::services::audit::AuditLog;
use crate::domain::policy::{self, DEFAULT_WHITELIST};
use crate::domain::{AgentError, AgentResult, BoundedLog};

struct PolicyTables {
    enabled: bool,
    entries: Vec<PolicyEntry>,
    overrides: Vec<OverrideRule>,
    blocked: Vec<String>,
    allowed_paths: Vec<String>,
    resource_limits: BTreeMap<String, u64>,
    log: BoundedLog<PolicyChange>,
    stats: PolicyStats,
}

impl PolicyTables {
    /// Risk of the first allow-list entry matching the command, or `MAX_RISK`.
    fn base_risk(&self, command: &str) -> u8 {
        self.entries
            .iter()
            .find(|e| policy::matches_first_token(&e.pattern, command))
            .map_or(MAX_RISK, |e| e.risk_level)
    }
}

/// Side effect produced by a decision, applied after the table lock drops.
enum AuditNote {
    None,
    BlockCommand { pattern: String },
    Deny,
}

pub struct PolicyEngine {
    tables: Mutex<PolicyTables>,
    audit: Arc<AuditLog>,
    clock: Arc<dyn Clock>,
}

impl PolicyEngine {
    /// Engine preloaded with the default allow-list.
    #[must_use]
    pub fn new(audit: Arc<AuditLog>, clock: Arc<dyn Clock>, log_capacity: usize) -> Self {
        let now = clock.now();
        let entries = DEFAULT_WHITELIST
            .iter()
            .map(|&(pattern, risk, description)| PolicyEntry {
                pattern: pattern.to_string(),
                risk_level: risk,
                description: description.to_string(),
                added_at: now,
            })
            .collect();
        Self {
            tables: Mutex::new(PolicyTables {
                enabled: true,
                entries,
                overrides: Vec::new(),
                blocked: Vec::new(),
                allowed_paths: Vec::new(),
                resource_limits: BTreeMap::new(),
                log: BoundedLog::new(log_capacity),
                stats: PolicyStats::default(),
            }),
            audit,
            clock,
        }
    }

    // ── Decisions ────────────────────────────────────────────────────────────

    /// Decide whether `command` may run. Never fails: a refusal is a
    /// `Decision` with `allowed=false`.
    pub fn authorize(&self, command: &str) -> Decision {
        let (decision, note) = {
            let mut tables = self.tables.lock();
            let (decision, note) = Self::evaluate(&tables, command);
            tables.stats.checks += 1;
            if decision.allowed {
                tables.stats.allowed += 1;
            } else {
                tables.stats.denied += 1;
            }
            if decision.stage == DecisionStage::DangerousPattern {
                tables.stats.dangerous_blocked += 1;
            }
            (decision, note)
        };

        match note {
            AuditNote::None => {}
            AuditNote::BlockCommand { pattern } => {
                self.audit_best_effort(
                    "block_command",
                    Details::from([
                        ("command".to_string(), command.to_string()),
                        ("pattern".to_string(), pattern),
                    ]),
                );
            }
            AuditNote::Deny => {
                self.audit_best_effort(
                    "deny",
                    Details::from([
                        ("command".to_string(), command.to_string()),
                        ("reason".to_string(), decision.reason.clone()),
                    ]),
                );
            }
        }

        tracing::debug!(
            command,
            allowed = decision.allowed,
            stage = ?decision.stage,
            risk = decision.risk_level,
            "authorize",
        );
        decision
    }

    fn evaluate(tables: &PolicyTables, command: &str) -> (Decision, AuditNote) {
        let deny = |reason: String, stage, pattern: Option<String>| Decision {
            allowed: false,
            reason,
            risk_level: MAX_RISK,
            stage,
            matched_pattern: pattern,
        };

        if command.trim().is_empty() {
            return (
                deny("empty command".to_string(), DecisionStage::Empty, None),
                AuditNote::None,
            );
        }

        if !tables.enabled {
            let decision = Decision {
                allowed: true,
                reason: "disabled".to_string(),
                risk_level: tables.base_risk(command),
                stage: DecisionStage::Disabled,
                matched_pattern: None,
            };
            return (decision, AuditNote::None);
        }

        if let Some(hit) = policy::find_dangerous(command) {
            let decision = deny(
                format!("dangerous pattern: {} ({})", hit.category, hit.source),
                DecisionStage::DangerousPattern,
                Some(hit.source.to_string()),
            );
            return (
                decision,
                AuditNote::BlockCommand {
                    pattern: hit.source.to_string(),
                },
            );
        }

        if let Some(blocked) = tables
            .blocked
            .iter()
            .find(|p| policy::matches_first_token(p, command))
        {
            let decision = deny(
                format!("blocked command: {blocked}"),
                DecisionStage::BlockedCommand,
                Some(blocked.clone()),
            );
            return (decision, AuditNote::None);
        }

        if let Some(rule) = tables
            .overrides
            .iter()
            .find(|o| policy::matches_first_token(&o.pattern, command))
        {
            let reason = if rule.reason.is_empty() {
                format!("override: {}", rule.pattern)
            } else {
                rule.reason.clone()
            };
            let decision = Decision {
                allowed: rule.allowed,
                reason,
                risk_level: tables.base_risk(command),
                stage: DecisionStage::Override,
                matched_pattern: Some(rule.pattern.clone()),
            };
            return (decision, AuditNote::None);
        }

        if let Some(entry) = tables
            .entries
            .iter()
            .find(|e| policy::matches_first_token(&e.pattern, command))
        {
            let decision = Decision {
                allowed: true,
                reason: format!("allowed by {}", entry.pattern),
                risk_level: entry.risk_level,
                stage: DecisionStage::AllowList,
                matched_pattern: Some(entry.pattern.clone()),
            };
            return (decision, AuditNote::None);
        }

        (
            deny("not in allow-list".to_string(), DecisionStage::NoMatch, None),
            AuditNote::Deny,
        )
    }

    /// Advisory risk score; does not gate anything.
    pub fn score_risk(&self, command: &str) -> AgentResult<RiskScore> {
        if command.trim().is_empty() {
            return Err(AgentError::InvalidArgument("command is required".to_string()));
        }
        let base = self.tables.lock().base_risk(command);
        Ok(policy::score(base, command))
    }

    /// Check a command against the dangerous-pattern blocklist only.
    #[must_use]
    pub fn block_dangerous(&self, command: &str) -> DangerCheck {
        let hit = policy::find_dangerous(command);
        DangerCheck {
            dangerous: hit.is_some(),
            pattern: hit.map(|p| p.source.to_string()),
        }
    }

    // ── Allow-list ───────────────────────────────────────────────────────────

    /// Add an allow-list entry, or update the risk and description of an
    /// existing one in place. Risk is clamped into 1..=10.
    pub fn add(&self, pattern: &str, risk_level: i64, description: &str) -> AgentResult<PolicyEntry> {
        let pattern = required_pattern(pattern)?;
        let risk_level = clamp_risk(risk_level);
        let now = self.clock.now();
        let mut tables = self.tables.lock();

        let entry = if let Some(existing) = tables.entries.iter_mut().find(|e| e.pattern == pattern) {
            existing.risk_level = risk_level;
            existing.description = description.to_string();
            existing.clone()
        } else {
            let entry = PolicyEntry {
                pattern: pattern.to_string(),
                risk_level,
                description: description.to_string(),
                added_at: now,
            };
            tables.entries.push(entry.clone());
            entry
        };
        tables.log.push(change("add", pattern, format!("risk={risk_level}"), now));
        drop(tables);

        tracing::info!(pattern, risk_level, "allow-list entry added");
        Ok(entry)
    }

    pub fn remove(&self, pattern: &str) -> AgentResult<PolicyEntry> {
        let pattern = required_pattern(pattern)?;
        let now = self.clock.now();
        let mut tables = self.tables.lock();
        let idx = tables
            .entries
            .iter()
            .position(|e| e.pattern == pattern)
            .ok_or_else(|| AgentError::not_found(format!("no allow-list entry '{pattern}'")))?;
        let removed = tables.entries.remove(idx);
        tables.log.push(change("remove", pattern, String::new(), now));
        drop(tables);

        tracing::info!(pattern, "allow-list entry removed");
        Ok(removed)
    }

    // ── Overrides ────────────────────────────────────────────────────────────

    /// Add an override, replacing any existing rule for the same pattern
    /// without changing its position.
    pub fn add_override(&self, pattern: &str, allowed: bool, reason: &str) -> AgentResult<OverrideRule> {
        let pattern = required_pattern(pattern)?;
        let now = self.clock.now();
        let rule = OverrideRule {
            pattern: pattern.to_string(),
            allowed,
            reason: reason.to_string(),
            added_at: now,
        };
        let mut tables = self.tables.lock();
        if let Some(existing) = tables.overrides.iter_mut().find(|o| o.pattern == pattern) {
            *existing = rule.clone();
        } else {
            tables.overrides.push(rule.clone());
        }
        let verdict = if allowed { "allow" } else { "deny" };
        tables.log.push(change("add_override", pattern, verdict.to_string(), now));
        drop(tables);

        tracing::info!(pattern, allowed, "override added");
        Ok(rule)
    }

    pub fn remove_override(&self, pattern: &str) -> AgentResult<OverrideRule> {
        let pattern = required_pattern(pattern)?;
        let now = self.clock.now();
        let mut tables = self.tables.lock();
        let idx = tables
            .overrides
            .iter()
            .position(|o| o.pattern == pattern)
            .ok_or_else(|| AgentError::not_found(format!("no override '{pattern}'")))?;
        let removed = tables.overrides.remove(idx);
        tables.log.push(change("remove_override", pattern, String::new(), now));
        drop(tables);

        tracing::info!(pattern, "override removed");
        Ok(removed)
    }

    // ── Blocked commands ─────────────────────────────────────────────────────

    /// Returns false when the pattern was already blocked.
    pub fn add_blocked_command(&self, pattern: &str) -> AgentResult<bool> {
        let pattern = required_pattern(pattern)?;
        let now = self.clock.now();
        let mut tables = self.tables.lock();
        if tables.blocked.iter().any(|p| p == pattern) {
            return Ok(false);
        }
        tables.blocked.push(pattern.to_string());
        tables.log.push(change("block", pattern, String::new(), now));
        drop(tables);

        tracing::info!(pattern, "command pattern blocked");
        Ok(true)
    }

    pub fn remove_blocked_command(&self, pattern: &str) -> AgentResult<()> {
        let pattern = required_pattern(pattern)?;
        let now = self.clock.now();
        let mut tables = self.tables.lock();
        let before = tables.blocked.len();
        tables.blocked.retain(|p| p != pattern);
        if tables.blocked.len() == before {
            return Err(AgentError::not_found(format!("'{pattern}' is not blocked")));
        }
        tables.log.push(change("unblock", pattern, String::new(), now));
        drop(tables);

        tracing::info!(pattern, "command pattern unblocked");
        Ok(())
    }

    // ── Global switch ────────────────────────────────────────────────────────

    pub fn set_enabled(&self, enabled: bool) {
        let now = self.clock.now();
        let mut tables = self.tables.lock();
        tables.enabled = enabled;
        let action = if enabled { "enable" } else { "disable" };
        tables.log.push(change(action, "*", String::new(), now));
        drop(tables);
        tracing::warn!(enabled, "command policy switched");
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.tables.lock().enabled
    }

    // ── Paths ────────────────────────────────────────────────────────────────

    /// Returns the number of allowed roots after the insert.
    pub fn add_allowed_path(&self, path: &str) -> AgentResult<usize> {
        let path = required_path(path)?;
        let now = self.clock.now();
        let mut tables = self.tables.lock();
        if !tables.allowed_paths.iter().any(|p| p == path) {
            tables.allowed_paths.push(path.to_string());
            tables.log.push(change("allow_path", path, String::new(), now));
        }
        Ok(tables.allowed_paths.len())
    }

    pub fn remove_allowed_path(&self, path: &str) -> AgentResult<()> {
        let path = required_path(path)?;
        let now = self.clock.now();
        let mut tables = self.tables.lock();
        let before = tables.allowed_paths.len();
        tables.allowed_paths.retain(|p| p != path);
        if tables.allowed_paths.len() == before {
            return Err(AgentError::not_found(format!("'{path}' is not an allowed path")));
        }
        tables.log.push(change("remove_path", path, String::new(), now));
        Ok(())
    }

    /// No configured roots means unrestricted.
    #[must_use]
    pub fn check_path(&self, path: &str) -> PathCheck {
        if path.trim().is_empty() {
            return PathCheck {
                allowed: false,
                reason: "empty path".to_string(),
            };
        }
        let tables = self.tables.lock();
        if tables.allowed_paths.is_empty() {
            return PathCheck {
                allowed: true,
                reason: "no path restrictions".to_string(),
            };
        }
        match tables
            .allowed_paths
            .iter()
            .find(|root| policy::path_within(root, path))
        {
            Some(root) => PathCheck {
                allowed: true,
                reason: format!("within {root}"),
            },
            None => PathCheck {
                allowed: false,
                reason: "outside allowed paths".to_string(),
            },
        }
    }

    // ── Resources ────────────────────────────────────────────────────────────

    pub fn set_resource_limit(&self, resource: &str, max: u64) -> AgentResult<()> {
        let resource = resource.trim();
        if resource.is_empty() {
            return Err(AgentError::InvalidArgument("resource name is required".to_string()));
        }
        let now = self.clock.now();
        let mut tables = self.tables.lock();
        tables.resource_limits.insert(resource.to_string(), max);
        tables.log.push(change("limit", resource, format!("max={max}"), now));
        Ok(())
    }

    #[must_use]
    pub fn check_resources(&self, usage: &BTreeMap<String, u64>) -> ResourceCheck {
        let tables = self.tables.lock();
        policy::check_resources(&tables.resource_limits, usage)
    }

    // ── Introspection ────────────────────────────────────────────────────────

    #[must_use]
    pub fn get_all(&self) -> PolicySnapshot {
        let tables = self.tables.lock();
        PolicySnapshot {
            enabled: tables.enabled,
            entries: tables.entries.clone(),
            overrides: tables.overrides.clone(),
            blocked_commands: tables.blocked.clone(),
            allowed_paths: tables.allowed_paths.clone(),
            resource_limits: tables.resource_limits.clone(),
        }
    }

    /// Most recent `limit` table mutations, oldest first.
    #[must_use]
    pub fn get_log(&self, limit: usize) -> Vec<PolicyChange> {
        self.tables.lock().log.recent(limit)
    }

    #[must_use]
    pub fn stats(&self) -> PolicyStats {
        self.tables.lock().stats.clone()
    }

    #[must_use]
    pub fn summary(&self) -> PolicySummary {
        let audit_count = self.audit.len();
        let tables = self.tables.lock();
        PolicySummary {
            enabled: tables.enabled,
            entry_count: tables.entries.len(),
            override_count: tables.overrides.len(),
            blocked_count: tables.blocked.len(),
            audit_count,
            stats: tables.stats.clone(),
        }
    }

    /// Record an operator-supplied audit event.
    pub fn record_audit(&self, action: &str, details: Details) -> AgentResult<AuditEntry> {
        self.audit.record(action, details)
    }

    #[must_use]
    pub fn audit_log(&self, limit: usize) -> Vec<AuditEntry> {
        self.audit.recent(limit)
    }

    fn audit_best_effort(&self, action: &str, details: Details) {
        if let Err(e) = self.audit.record(action, details) {
            tracing::warn!(error = %e, action, "failed to write audit entry");
        }
    }
}

fn required_pattern(pattern: &str) -> AgentResult<&str> {
    let pattern = pattern.trim();
    if pattern.is_empty() {
        return Err(AgentError::InvalidArgument("pattern is required".to_string()));
    }
    Ok(pattern)
}

fn required_path(path: &str) -> AgentResult<&str> {
    let path = path.trim();
    if path.is_empty() {
        return Err(AgentError::InvalidArgument("path is required".to_string()));
    }
    Ok(path)
}

fn change(action: &str, pattern: &str, detail: String, timestamp: chrono::DateTime<chrono::Utc>) -> PolicyChange {
    PolicyChange {
        action: action.to_string(),
        pattern: pattern.to_string(),
        detail,
        timestamp,
    }
}
