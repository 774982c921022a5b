//! Domain layer: pure session, policy and bookkeeping logic.
//!
//! This module has zero imports from `crate::infra`, `crate::application`,
//! `tokio`, `std::fs`, `std::process`, or `std::net`. All functions are
//! synchronous; time is passed in by the caller.

pub mod bounded;
pub mod error;
pub mod policy;
pub mod session;

pub use bounded::BoundedLog;
pub use error::{AgentError, AgentResult};
pub use session::Session;
