//! Logical clock.
//!
//! Time in the event loop is simulated: it only moves when a driver method
//! on [`EventLoop`](crate::EventLoop) advances it, never with wall time.

use std::cell::Cell;

/// A point in logical time, in milliseconds since the loop's epoch.
pub type LogicalTime = u64;

/// The single source of logical time for one event loop.
///
/// # Examples
///
/// ```
/// use async_runtime::Clock;
///
/// let clock = Clock::new(100);
/// assert_eq!(clock.now(), 100);
/// ```
#[derive(Debug, Default)]
pub struct Clock {
    now: Cell<LogicalTime>,
}

impl Clock {
    /// Creates a clock starting at `start`.
    pub fn new(start: LogicalTime) -> Self {
        Self {
            now: Cell::new(start),
        }
    }

    /// Returns the current logical time.
    pub fn now(&self) -> LogicalTime {
        self.now.get()
    }

    /// Moves the clock forward to `time`.
    ///
    /// Earlier times are ignored so that `now()` never decreases.
    pub(crate) fn advance_to(&self, time: LogicalTime) {
        if time > self.now.get() {
            self.now.set(time);
        }
    }
}
