//! Infrastructure layer: concrete implementations of application port traits.
//!
//! All OS-facing code lives here: shell execution, signal delivery,
//! `/proc` sampling and clocks. Imports from `crate::domain` and
//! `crate::application::ports` are allowed.

pub mod clock;
pub mod command_runner;
pub mod process;

pub use clock::{ManualClock, SystemClock};
pub use command_runner::TokioCommandRunner;
pub use process::OsProcessControl;
