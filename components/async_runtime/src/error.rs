//! Errors returned by the event loop driver.

use core_types::JsError;

/// Failure of a driver call such as `advance_by` or `run_all_pending`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchedulerError {
    /// A driver method was called from inside a running callback
    #[error("{operation} called while the event loop is running a task")]
    Reentrant {
        /// Name of the rejected driver method
        operation: &'static str,
    },
    /// `run_all_pending` fired more timers than the configured limit
    #[error("aborting after running {limit} timers, assuming an infinite loop")]
    TimerLimitExceeded {
        /// The configured limit
        limit: usize,
    },
    /// The script passed to `run_script` threw
    #[error("uncaught exception in script: {0}")]
    Uncaught(#[from] JsError),
}

/// Result type for driver operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;
