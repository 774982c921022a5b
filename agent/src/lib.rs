//! Warden agent core: session bridge, command policy, execution engine and
//! process supervisor for a local agent driven by a remote controller.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod app;
pub mod application;
pub mod domain;
pub mod infra;

pub use app::{LocalAgent, build_agent, build_local_agent};
pub use domain::{AgentError, AgentResult};
