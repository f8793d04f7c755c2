//! Scheduler state and cooperative shutdown

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Where the control loop currently is
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SchedulerState {
    /// Waiting for the next cycle
    #[default]
    Idle,
    /// Repository checks are running
    Checking,
    /// The combined notification is being delivered
    Dispatching,
    /// Watermarks are being written
    Committing,
    /// Shutdown was requested, no new work starts
    ShuttingDown,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Checking => "checking",
            Self::Dispatching => "dispatching",
            Self::Committing => "committing",
            Self::ShuttingDown => "shutting-down",
        };
        write!(f, "{}", name)
    }
}

/// Shared stop request, set by the signal handler and polled by the loop
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shutdown_flag_is_shared() {
        let flag = ShutdownFlag::new();
        let clone = flag.clone();
        assert!(!flag.is_requested());

        clone.request();
        assert!(flag.is_requested());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(SchedulerState::default(), SchedulerState::Idle);
        assert_eq!(SchedulerState::ShuttingDown.to_string(), "shutting-down");
        assert_eq!(SchedulerState::Dispatching.to_string(), "dispatching");
    }
}
