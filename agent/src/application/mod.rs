//! Application layer: port trait definitions and the component services.
//!
//! This module depends only on `crate::domain`, never on `crate::infra`.

pub mod ports;
pub mod services;

pub use ports::{
    CapabilityProvider, Clock, CommandRunner, CommandSpec, ProcessControl, ProcessSignal,
    RunOutcome,
};
