//! Shared types for the warden local agent: records, decisions, the error
//! taxonomy and JSON envelope, route constants and configuration.

pub mod api;
pub mod config;
pub mod error;
pub mod routes;
pub mod types;

pub use config::{AgentConfig, ServerConfig};
pub use error::{ApiError, Envelope, ErrorKind};
pub use routes::{DEFAULT_AGENT_URL, endpoint, paths, process_path};
pub use types::*;
