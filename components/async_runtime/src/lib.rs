//! Deterministic async runtime for simulated JavaScript execution.
//!
//! This crate decides, for a program mixing synchronous code, timers,
//! microtasks and async functions, the exact order in which every unit of
//! work runs. Time is logical: nothing happens until the driver moves the
//! clock.
//!
//! # Overview
//!
//! - [`EventLoop`] - clock, microtask queue, timer registry and driver
//! - [`Promise`] - promise state machine, reactions and combinators
//! - [`run_async`] / [`spawn_async`] - async function activations
//! - [`SchedulerConfig`] - start time, timer limit, delay clamping
//! - [`ErrorSink`] - where asynchronous failures are reported
//!
//! # Examples
//!
//! ## Microtasks run before timers
//!
//! ```
//! use async_runtime::{EventLoop, Promise};
//! use core_types::Value;
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let event_loop = EventLoop::new();
//! let log = Rc::new(RefCell::new(Vec::new()));
//!
//! log.borrow_mut().push(1);
//! let l = log.clone();
//! Promise::resolve(&event_loop, Value::Undefined).then(move |v| {
//!     l.borrow_mut().push(2);
//!     Ok(v)
//! });
//! let l = log.clone();
//! event_loop.set_timeout(move || { l.borrow_mut().push(3); Ok(()) }, 0);
//! log.borrow_mut().push(4);
//!
//! event_loop.run_microtasks();
//! event_loop.advance_by(0).unwrap();
//! assert_eq!(*log.borrow(), vec![1, 4, 2, 3]);
//! ```
//!
//! ## Intervals
//!
//! ```
//! use async_runtime::EventLoop;
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! let event_loop = EventLoop::new();
//! let ticks = Rc::new(Cell::new(0));
//! let t = ticks.clone();
//! event_loop.set_interval(move || { t.set(t.get() + 1); Ok(()) }, 1000);
//!
//! event_loop.advance_by(3500).unwrap();
//! assert_eq!(ticks.get(), 3);
//! assert_eq!(event_loop.next_timer_time(), Some(4000));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod async_fn;
pub mod clock;
pub mod combinators;
pub mod config;
pub mod error;
pub mod event_loop;
pub mod promise;
pub mod report;
pub mod task_queue;
pub mod timer;

// Re-export main types at crate root
pub use async_fn::{run_async, spawn_async, AsyncBody, AsyncCall, AsyncScope, AwaitValue, FrameState, Resume, Step};
pub use clock::{Clock, LogicalTime};
pub use config::{ConfigError, SchedulerConfig, DEFAULT_TIMER_LIMIT};
pub use error::{SchedulerError, SchedulerResult};
pub use event_loop::{EventLoop, LoopStats};
pub use promise::{has_callable_then, Handler, Promise, PromiseReaction, PromiseState, Resolver, ThenTarget, Thenable};
pub use report::{ErrorReport, ErrorSink, RecordingSink, TracingSink};
pub use task_queue::{MicroTask, MicrotaskQueue};
pub use timer::{DelayPolicy, Timer, TimerCallback, TimerClamp, TimerHandle, TimerRegistry};
