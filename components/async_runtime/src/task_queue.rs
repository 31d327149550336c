//! Microtask queue.
//!
//! Microtasks are promise reaction jobs and `queueMicrotask` callbacks. The
//! queue is strictly FIFO; the event loop drains it completely after every
//! macrotask, including entries enqueued during the drain itself.

use core_types::JsError;
use std::collections::VecDeque;

/// A microtask to be executed by the event loop.
///
/// Examples include promise reactions and `queueMicrotask` callbacks.
pub struct MicroTask {
    callback: Box<dyn FnOnce() -> Result<(), JsError>>,
    sequence: u64,
}

impl MicroTask {
    /// Creates a new MicroTask from a closure.
    ///
    /// The sequence number is assigned when the task is enqueued.
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() -> Result<(), JsError> + 'static,
    {
        Self {
            callback: Box::new(f),
            sequence: 0,
        }
    }

    /// Arrival order within the queue it was enqueued on.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Executes the microtask, consuming it.
    pub fn run(self) -> Result<(), JsError> {
        (self.callback)()
    }
}

impl std::fmt::Debug for MicroTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MicroTask {{ sequence: {} }}", self.sequence)
    }
}

/// A FIFO queue for microtasks.
#[derive(Debug, Default)]
pub struct MicrotaskQueue {
    queue: VecDeque<MicroTask>,
    next_sequence: u64,
}

impl MicrotaskQueue {
    /// Creates a new empty MicrotaskQueue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a microtask to the end of the queue and returns its sequence.
    pub fn enqueue(&mut self, mut microtask: MicroTask) -> u64 {
        microtask.sequence = self.next_sequence;
        self.next_sequence += 1;
        let sequence = microtask.sequence;
        self.queue.push_back(microtask);
        sequence
    }

    /// Removes and returns the oldest microtask.
    pub fn dequeue(&mut self) -> Option<MicroTask> {
        self.queue.pop_front()
    }

    /// Returns true if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Returns the number of microtasks in the queue.
    pub fn len(&self) -> usize {
        self.queue.len()
    }
}
