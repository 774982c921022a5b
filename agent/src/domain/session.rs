//! Controller session state machine.
//!
//! `Disconnected → Connected → Authenticated`, back to `Disconnected` via
//! `disconnect`, and a bounded `Disconnected → Connected` path via
//! `reconnect`. Time is passed in so staleness boundaries are testable.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use warden_common::{
    AuthOutcome, Details, Established, HeartbeatHealth, MessageQueued, PendingMessage, Reconnected,
    SessionState, SessionStatus,
};

use crate::domain::bounded::BoundedLog;
use crate::domain::error::{AgentError, AgentResult};

pub type TokenHash = [u8; 32];

/// One-way hash used for token comparison; the clear token is never kept.
#[must_use]
pub fn hash_token(token: &str) -> TokenHash {
    Sha256::digest(token.as_bytes()).into()
}

/// Generate an opaque channel ID: `ch-` followed by 16 hex chars.
#[must_use]
pub fn generate_channel_id() -> String {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};

    let mut hasher = RandomState::new().build_hasher();
    hasher.write_u128(
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0),
    );
    hasher.write_u64(RandomState::new().build_hasher().finish());
    format!("ch-{:016x}", hasher.finish())
}

#[derive(Debug)]
pub struct Session {
    host: Option<String>,
    port: Option<u16>,
    channel_id: Option<String>,
    /// `None` means open mode: any non-empty token authenticates.
    token_hash: Option<TokenHash>,
    connected: bool,
    authenticated: bool,
    last_heartbeat: Option<DateTime<Utc>>,
    reconnect_attempts: u32,
    pending: BoundedLog<PendingMessage>,
}

impl Session {
    #[must_use]
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            host: None,
            port: None,
            channel_id: None,
            token_hash: None,
            connected: false,
            authenticated: false,
            last_heartbeat: None,
            reconnect_attempts: 0,
            pending: BoundedLog::new(queue_capacity),
        }
    }

    pub fn establish(
        &mut self,
        host: &str,
        port: i64,
        token: &str,
        now: DateTime<Utc>,
    ) -> AgentResult<Established> {
        let host = host.trim();
        if host.is_empty() {
            return Err(AgentError::invalid("host is required"));
        }
        let port = u16::try_from(port)
            .ok()
            .filter(|&p| p != 0)
            .ok_or_else(|| AgentError::invalid(format!("port {port} outside 1-65535")))?;

        let channel_id = generate_channel_id();
        self.host = Some(host.to_string());
        self.port = Some(port);
        self.channel_id = Some(channel_id.clone());
        self.token_hash = (!token.is_empty()).then(|| hash_token(token));
        self.connected = true;
        self.authenticated = false;
        self.reconnect_attempts = 0;
        self.last_heartbeat = Some(now);
        self.pending.clear();

        Ok(Established {
            host: host.to_string(),
            port,
            channel_id,
        })
    }

    /// A wrong token is reported as `authenticated=false` and drops any
    /// earlier successful authentication.
    pub fn authenticate(&mut self, token: &str) -> AgentResult<AuthOutcome> {
        if !self.connected {
            return Err(AgentError::NotConnected("no active session".to_string()));
        }
        if token.is_empty() {
            return Err(AgentError::invalid("token is required"));
        }
        let open_mode = self.token_hash.is_none();
        self.authenticated = match self.token_hash {
            None => true,
            Some(expected) => bool::from(hash_token(token)[..].ct_eq(&expected[..])),
        };
        Ok(AuthOutcome {
            authenticated: self.authenticated,
            open_mode,
        })
    }

    /// Stamp a heartbeat and return the current channel ID.
    pub fn heartbeat(&mut self, now: DateTime<Utc>) -> AgentResult<String> {
        match (&self.channel_id, self.connected) {
            (Some(channel_id), true) => {
                self.last_heartbeat = Some(now);
                Ok(channel_id.clone())
            }
            _ => Err(AgentError::NotConnected("no active session".to_string())),
        }
    }

    /// Healthy iff connected and the last heartbeat is younger than twice
    /// `interval`. Never changes state.
    #[must_use]
    pub fn health(&self, now: DateTime<Utc>, interval: Duration) -> HeartbeatHealth {
        let threshold = TimeDelta::from_std(interval.saturating_mul(2)).unwrap_or(TimeDelta::MAX);
        let elapsed = self.last_heartbeat.map(|last| now.signed_duration_since(last));
        let fresh = elapsed.is_some_and(|e| e < threshold);

        #[allow(clippy::cast_precision_loss)]
        let seconds_since_heartbeat = elapsed.map(|e| e.num_milliseconds() as f64 / 1000.0);

        HeartbeatHealth {
            healthy: self.connected && fresh,
            connected: self.connected,
            seconds_since_heartbeat,
            threshold_secs: interval.as_secs().saturating_mul(2),
        }
    }

    /// Idempotent. Returns whether a live session was torn down.
    pub fn disconnect(&mut self) -> bool {
        let was_connected = self.connected;
        self.connected = false;
        self.channel_id = None;
        self.pending.clear();
        was_connected
    }

    /// Restore the connection to the last known host.
    ///
    /// The stored token is not re-checked: an authenticated session comes
    /// back authenticated.
    pub fn reconnect(&mut self, now: DateTime<Utc>, max_attempts: u32) -> AgentResult<Reconnected> {
        if self.reconnect_attempts >= max_attempts {
            return Err(AgentError::RetryExhausted {
                attempts: self.reconnect_attempts,
            });
        }
        if self.host.is_none() {
            return Err(AgentError::PreconditionFailed(
                "no previous host to reconnect to".to_string(),
            ));
        }

        self.reconnect_attempts += 1;
        let channel_id = generate_channel_id();
        self.channel_id = Some(channel_id.clone());
        self.last_heartbeat = Some(now);
        self.connected = true;

        Ok(Reconnected {
            channel_id,
            attempt: self.reconnect_attempts,
            max_attempts,
        })
    }

    pub fn enqueue(
        &mut self,
        message_type: &str,
        payload: Details,
        now: DateTime<Utc>,
    ) -> AgentResult<MessageQueued> {
        if !self.connected {
            return Err(AgentError::NotConnected("no active session".to_string()));
        }
        if message_type.trim().is_empty() {
            return Err(AgentError::invalid("message type is required"));
        }
        let dropped_oldest = self.pending.push(PendingMessage {
            message_type: message_type.to_string(),
            payload,
            timestamp: now,
        });
        Ok(MessageQueued {
            queued: self.pending.len(),
            dropped_oldest,
        })
    }

    pub fn drain(&mut self, limit: usize) -> Vec<PendingMessage> {
        self.pending.drain_oldest(limit)
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        match (self.connected, self.authenticated) {
            (false, _) => SessionState::Disconnected,
            (true, false) => SessionState::Connected,
            (true, true) => SessionState::Authenticated,
        }
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.connected && self.authenticated
    }

    #[must_use]
    pub fn has_host(&self) -> bool {
        self.host.is_some()
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            state: self.state(),
            connected: self.connected,
            authenticated: self.is_authenticated(),
            host: self.host.clone(),
            port: self.port,
            channel_id: self.channel_id.clone(),
            reconnect_attempts: self.reconnect_attempts,
            pending_messages: self.pending.len(),
            last_heartbeat: self.last_heartbeat,
        }
    }
}
