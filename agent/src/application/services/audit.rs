//! Append-only, bounded record of security-relevant events.

use std::sync::Arc;

use parking_lot::Mutex;
use warden_common::{AuditEntry, Details};

use crate::application::ports::Clock;
use crate::domain::{AgentError, AgentResult, BoundedLog};

pub struct AuditLog {
    entries: Mutex<BoundedLog<AuditEntry>>,
    clock: Arc<dyn Clock>,
}

impl AuditLog {
    #[must_use]
    pub fn new(capacity: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(BoundedLog::new(capacity)),
            clock,
        }
    }

    /// Append an entry. Past entries are never mutated; the oldest is
    /// evicted once the cap is reached.
    pub fn record(&self, action: &str, details: Details) -> AgentResult<AuditEntry> {
        if action.trim().is_empty() {
            return Err(AgentError::InvalidArgument(
                "audit action is required".to_string(),
            ));
        }
        let entry = AuditEntry {
            action: action.to_string(),
            details,
            timestamp: self.clock.now(),
        };
        tracing::info!(
            target: "warden::audit",
            action = %entry.action,
            details = ?entry.details,
            "audit",
        );
        self.entries.lock().push(entry.clone());
        Ok(entry)
    }

    /// Most recent `limit` entries, oldest first.
    #[must_use]
    pub fn recent(&self, limit: usize) -> Vec<AuditEntry> {
        self.entries.lock().recent(limit)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
