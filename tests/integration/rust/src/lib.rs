//! Integration test suite for the deterministic event loop
//!
//! This crate provides integration tests that verify components work
//! together correctly across component boundaries.

use core_types::JsError;
use std::cell::RefCell;
use std::rc::Rc;

/// Re-export components for test convenience
pub mod components {
    pub use async_runtime;
    pub use core_types;
    pub use loop_cli;
}

/// Shared execution-order log.
#[derive(Debug, Clone, Default)]
pub struct OrderLog<T> {
    entries: Rc<RefCell<Vec<T>>>,
}

impl<T: Clone + 'static> OrderLog<T> {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self {
            entries: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Appends an entry.
    pub fn push(&self, entry: T) {
        self.entries.borrow_mut().push(entry);
    }

    /// A callback that appends `entry` when run.
    pub fn pusher(&self, entry: T) -> impl FnOnce() -> Result<(), JsError> + 'static {
        let log = self.clone();
        move || {
            log.push(entry);
            Ok(())
        }
    }

    /// Snapshot of the entries.
    pub fn entries(&self) -> Vec<T> {
        self.entries.borrow().clone()
    }
}
