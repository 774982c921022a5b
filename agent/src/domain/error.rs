//! Typed domain error enum.
//!
//! Every expected failure of the execution core is one of these variants;
//! binaries convert them to `anyhow::Error` via `?` or to the wire
//! taxonomy via [`AgentError::kind`].

use thiserror::Error;
use warden_common::ErrorKind;

/// Errors returned by the agent components.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not connected: {0}")]
    NotConnected(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("reconnect limit reached after {attempts} attempts; operator action required")]
    RetryExhausted { attempts: u32 },

    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("denied: {reason}")]
    Denied { reason: String, risk_level: u8 },

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

impl AgentError {
    /// Wire classification of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::NotConnected(_) => ErrorKind::NotConnected,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::RetryExhausted { .. } => ErrorKind::RetryExhausted,
            Self::PreconditionFailed(_) => ErrorKind::PreconditionFailed,
            Self::Denied { .. } => ErrorKind::Denied,
            Self::Spawn { .. } | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub(crate) fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
}

pub type AgentResult<T> = Result<T, AgentError>;
