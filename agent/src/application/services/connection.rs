//! Connection manager: owns the single controller session and its
//! observability counters.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use warden_common::{
    AuthOutcome, ConnectionStats, Details, Established, HeartbeatAck, HeartbeatHealth,
    MessageQueued, PendingMessage, Reconnected, SessionStatus, SessionSummary,
};

use crate::application::ports::Clock;
use crate::domain::{AgentError, AgentResult, Session};

#[derive(Default)]
struct Counters {
    connections: AtomicU64,
    auth_failures: AtomicU64,
    heartbeats: AtomicU64,
    messages_queued: AtomicU64,
    messages_dropped: AtomicU64,
    reconnects: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> ConnectionStats {
        ConnectionStats {
            connections: self.connections.load(Ordering::Relaxed),
            auth_failures: self.auth_failures.load(Ordering::Relaxed),
            heartbeats: self.heartbeats.load(Ordering::Relaxed),
            messages_queued: self.messages_queued.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}

pub struct ConnectionManager {
    session: Mutex<Session>,
    counters: Counters,
    heartbeat_interval: Duration,
    max_reconnect_attempts: u32,
    clock: Arc<dyn Clock>,
}

impl ConnectionManager {
    #[must_use]
    pub fn new(
        heartbeat_interval: Duration,
        max_reconnect_attempts: u32,
        queue_capacity: usize,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            session: Mutex::new(Session::new(queue_capacity)),
            counters: Counters::default(),
            heartbeat_interval,
            max_reconnect_attempts,
            clock,
        }
    }

    /// Open a fresh session. Replaces any existing one, clearing its queue,
    /// authentication and reconnect budget.
    pub fn establish(&self, host: &str, port: i64, token: &str) -> AgentResult<Established> {
        let now = self.clock.now();
        let established = self.session.lock().establish(host, port, token, now)?;
        Counters::bump(&self.counters.connections);
        tracing::info!(
            host = %established.host,
            port = established.port,
            channel_id = %established.channel_id,
            open_mode = token.is_empty(),
            "session established",
        );
        Ok(established)
    }

    pub fn authenticate(&self, token: &str) -> AgentResult<AuthOutcome> {
        let outcome = self.session.lock().authenticate(token)?;
        if outcome.authenticated {
            tracing::info!(open_mode = outcome.open_mode, "session authenticated");
        } else {
            Counters::bump(&self.counters.auth_failures);
            tracing::warn!("session authentication failed");
        }
        Ok(outcome)
    }

    pub fn send_heartbeat(&self) -> AgentResult<HeartbeatAck> {
        let started = Instant::now();
        let now = self.clock.now();
        let channel_id = self.session.lock().heartbeat(now)?;
        Counters::bump(&self.counters.heartbeats);
        Ok(HeartbeatAck {
            channel_id,
            latency_ms: started.elapsed().as_secs_f64() * 1000.0,
        })
    }

    /// Report staleness; never disconnects.
    #[must_use]
    pub fn check_heartbeat(&self) -> HeartbeatHealth {
        let now = self.clock.now();
        self.session.lock().health(now, self.heartbeat_interval)
    }

    /// Idempotent: succeeds whether or not a session was live.
    pub fn disconnect(&self) -> bool {
        let was_connected = self.session.lock().disconnect();
        if was_connected {
            tracing::info!("session disconnected");
        }
        was_connected
    }

    /// Bounded retry to the last known host. The token is not re-checked,
    /// so a previously authenticated session resumes authenticated.
    pub fn reconnect(&self) -> AgentResult<Reconnected> {
        let now = self.clock.now();
        let result = self
            .session
            .lock()
            .reconnect(now, self.max_reconnect_attempts);
        match &result {
            Ok(r) => {
                Counters::bump(&self.counters.reconnects);
                tracing::info!(
                    attempt = r.attempt,
                    max_attempts = r.max_attempts,
                    channel_id = %r.channel_id,
                    "session reconnected",
                );
            }
            Err(AgentError::RetryExhausted { attempts }) => {
                tracing::error!(attempts, "reconnect limit reached; operator action required");
            }
            Err(e) => tracing::warn!(error = %e, "reconnect refused"),
        }
        result
    }

    pub fn send_message(&self, message_type: &str, payload: Details) -> AgentResult<MessageQueued> {
        let now = self.clock.now();
        let queued = self.session.lock().enqueue(message_type, payload, now)?;
        Counters::bump(&self.counters.messages_queued);
        if queued.dropped_oldest {
            Counters::bump(&self.counters.messages_dropped);
            tracing::warn!(queued = queued.queued, "message queue full; dropped oldest");
        }
        Ok(queued)
    }

    /// Remove and return up to `limit` of the oldest pending messages.
    pub fn drain_messages(&self, limit: usize) -> Vec<PendingMessage> {
        self.session.lock().drain(limit)
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.session.lock().status()
    }

    #[must_use]
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            status: self.status(),
            stats: self.counters.snapshot(),
        }
    }

    #[must_use]
    pub fn stats(&self) -> ConnectionStats {
        self.counters.snapshot()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.session.lock().is_connected()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.session.lock().is_authenticated()
    }

    #[must_use]
    pub fn has_host(&self) -> bool {
        self.session.lock().has_host()
    }

    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
    }
}
