//! Integration tests for the warden agent core
//!
//! These tests drive the production agent: real shell execution, real
//! child processes and the wall clock. They are slower than the unit suite.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod process_lifecycle;
mod session_flow;

use warden_agent::{LocalAgent, build_local_agent};
use warden_common::AgentConfig;

/// A production agent rooted in `dir`.
pub fn local_agent(dir: &std::path::Path) -> LocalAgent {
    let config = AgentConfig {
        working_dir: Some(dir.display().to_string()),
        ..AgentConfig::default()
    };
    build_local_agent(&config)
}

/// A production agent with an authenticated session.
pub fn connected_agent(dir: &std::path::Path) -> LocalAgent {
    let agent = local_agent(dir);
    agent
        .connection()
        .establish("127.0.0.1", 9000, "secret")
        .expect("establish");
    assert!(agent.connection().authenticate("secret").expect("auth").authenticated);
    agent
}
