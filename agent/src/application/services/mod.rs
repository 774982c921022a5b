//! Application services: one per component, each owning its own lock.

pub mod audit;
pub mod connection;
pub mod executor;
pub mod orchestrator;
pub mod policy;
pub mod supervisor;

pub use audit::AuditLog;
pub use connection::ConnectionManager;
pub use executor::ExecutionEngine;
pub use orchestrator::{Maintenance, Orchestrator};
pub use policy::PolicyEngine;
pub use supervisor::ProcessSupervisor;
