//! Wire-level error taxonomy and the response envelope shared by the
//! agent daemon and its clients.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of every expected failure an operation can report.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed or missing input.
    InvalidArgument,
    /// The operation needs a live session and there is none.
    NotConnected,
    /// The targeted process, pattern or record does not exist.
    NotFound,
    /// The reconnect cap was hit; an operator has to intervene.
    RetryExhausted,
    /// Required prior state is missing.
    PreconditionFailed,
    /// The policy engine refused the command.
    Denied,
    /// Unrecoverable fault, e.g. the OS refused to spawn a process.
    Internal,
}

impl ErrorKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidArgument => "invalid_argument",
            Self::NotConnected => "not_connected",
            Self::NotFound => "not_found",
            Self::RetryExhausted => "retry_exhausted",
            Self::PreconditionFailed => "precondition_failed",
            Self::Denied => "denied",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error body carried inside an [`Envelope`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct ApiError {
    pub kind: ErrorKind,
    pub message: String,
}

/// Uniform response wrapper: callers must check `ok` before reading `data`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub ok: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

impl<T> Envelope<T> {
    pub fn success(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(ApiError {
                kind,
                message: message.into(),
            }),
        }
    }

    /// Convert into a `Result`, treating a missing payload on success as
    /// an internal error.
    pub fn into_result(self) -> Result<T, ApiError> {
        match (self.ok, self.data, self.error) {
            (true, Some(data), _) => Ok(data),
            (false, _, Some(err)) => Err(err),
            (true, None, _) => Err(ApiError {
                kind: ErrorKind::Internal,
                message: "response marked ok but carried no data".to_string(),
            }),
            (false, _, None) => Err(ApiError {
                kind: ErrorKind::Internal,
                message: "response marked failed but carried no error".to_string(),
            }),
        }
    }
}
