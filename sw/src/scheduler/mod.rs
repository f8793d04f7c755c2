//! Scheduler - the control loop
//!
//! Each cycle reloads the watermarks, checks every repository (bounded
//! concurrency), commits what needs no notification, sends one combined
//! notification for the rest and commits those only when delivery succeeded.

mod core;
mod cycle;
mod state;

pub use self::core::{HookOutcome, Scheduler};
pub use cycle::{CheckCycleResult, Detection, RepositoryOutcome};
pub use state::{SchedulerState, ShutdownFlag};
