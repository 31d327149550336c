//! Reporting of asynchronous failures.
//!
//! Failures that happen outside any caller's synchronous extent (a throwing
//! microtask, a throwing timer callback, a rejection nobody handled) never
//! stop the event loop. They are handed to an [`ErrorSink`] instead.

use crate::timer::TimerHandle;
use core_types::{JsError, Value};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// An asynchronous failure observed by the event loop.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorReport {
    /// A microtask callback returned an error
    Microtask {
        /// Arrival order of the failing microtask
        sequence: u64,
        /// The thrown error
        error: JsError,
    },
    /// A timer callback returned an error
    Timer {
        /// The timer that fired
        handle: TimerHandle,
        /// The thrown error
        error: JsError,
    },
    /// A promise was rejected and no handler was attached by the end of the
    /// microtask checkpoint
    UnhandledRejection {
        /// Id of the rejected promise
        promise_id: u64,
        /// The rejection reason
        reason: Value,
    },
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorReport::Microtask { sequence, error } => {
                write!(f, "microtask {} threw: {}", sequence, error)
            }
            ErrorReport::Timer { handle, error } => {
                write!(f, "timer {} threw: {}", handle, error)
            }
            ErrorReport::UnhandledRejection { promise_id, reason } => {
                write!(f, "unhandled rejection of promise {}: {}", promise_id, reason)
            }
        }
    }
}

/// Receives asynchronous failures.
pub trait ErrorSink {
    /// Records one failure. Must not call back into the event loop.
    fn report(&self, report: ErrorReport);
}

/// Default sink: logs each report at warn level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ErrorSink for TracingSink {
    fn report(&self, report: ErrorReport) {
        tracing::warn!(%report, "asynchronous error");
    }
}

/// Sink that keeps every report in a shared buffer.
///
/// # Examples
///
/// ```
/// use async_runtime::{EventLoop, RecordingSink};
/// use core_types::JsError;
///
/// let sink = RecordingSink::new();
/// let event_loop = EventLoop::new().with_error_sink(sink.clone());
/// event_loop.queue_microtask(|| Err(JsError::type_error("boom")));
/// event_loop.run_microtasks();
/// assert_eq!(sink.len(), 1);
/// ```
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    reports: Rc<RefCell<Vec<ErrorReport>>>,
}

impl RecordingSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the reports received so far.
    pub fn reports(&self) -> Vec<ErrorReport> {
        self.reports.borrow().clone()
    }

    /// Removes and returns every report.
    pub fn take(&self) -> Vec<ErrorReport> {
        std::mem::take(&mut *self.reports.borrow_mut())
    }

    /// Number of reports received.
    pub fn len(&self) -> usize {
        self.reports.borrow().len()
    }

    /// Returns true if nothing was reported.
    pub fn is_empty(&self) -> bool {
        self.reports.borrow().is_empty()
    }
}

impl ErrorSink for RecordingSink {
    fn report(&self, report: ErrorReport) {
        self.reports.borrow_mut().push(report);
    }
}
