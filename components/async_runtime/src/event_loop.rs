//! Event loop implementation.
//!
//! The [`EventLoop`] owns the logical clock, the microtask queue and the timer
//! registry of one simulated JavaScript agent. It is a cheap handle: clones
//! share the same state, which is how callbacks reach the loop to schedule
//! more work. Separate `EventLoop::new()` calls share nothing.
//!
//! Ordering rules, strongest first:
//! 1. Synchronous code runs to completion before any queue is consulted.
//! 2. The microtask queue is drained to empty after every macrotask (the
//!    initial script or one timer callback), including microtasks queued
//!    by other microtasks.
//! 3. Timers run in `(fire_time, sequence)` order.
//!
//! Time only moves through the driver methods: [`EventLoop::advance_by`],
//! [`EventLoop::advance_to_next_timer`], [`EventLoop::run_all_pending`] and
//! [`EventLoop::run_only_pending`].

use crate::clock::{Clock, LogicalTime};
use crate::config::SchedulerConfig;
use crate::error::{SchedulerError, SchedulerResult};
use crate::promise::{Promise, PromiseState};
use crate::report::{ErrorReport, ErrorSink, TracingSink};
use crate::task_queue::{MicroTask, MicrotaskQueue};
use crate::timer::{DelayPolicy, Timer, TimerCallback, TimerHandle, TimerRegistry};
use core_types::{JsError, Value};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use tracing::{debug, trace};

/// Counters describing the work an event loop has done.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    /// Timer callbacks invoked
    pub timers_fired: u64,
    /// Microtasks executed
    pub microtasks_run: u64,
    /// Reports sent to the error sink
    pub errors_reported: u64,
}

struct LoopState {
    config: SchedulerConfig,
    clock: Clock,
    microtasks: RefCell<MicrotaskQueue>,
    timers: RefCell<TimerRegistry>,
    rejections: RefCell<Vec<Promise>>,
    sink: RefCell<Rc<dyn ErrorSink>>,
    policy: RefCell<Box<dyn DelayPolicy>>,
    draining: Cell<bool>,
    driving: Cell<bool>,
    timer_nesting: Cell<Option<u32>>,
    stats: Cell<LoopStats>,
    next_promise_id: Cell<u64>,
}

/// Resets a busy flag when dropped, including on unwind.
struct FlagGuard<'a>(&'a Cell<bool>);

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// Holds the timer nesting level for one firing and restores the outer
/// level when dropped. On unwind it also abandons the in-flight timer.
struct NestingGuard<'a> {
    state: &'a LoopState,
    outer: Option<u32>,
}

impl<'a> NestingGuard<'a> {
    fn enter(state: &'a LoopState, nesting: u32) -> Self {
        let outer = state.timer_nesting.replace(Some(nesting));
        Self { state, outer }
    }
}

impl Drop for NestingGuard<'_> {
    fn drop(&mut self) {
        self.state.timer_nesting.set(self.outer);
        if std::thread::panicking() {
            if let Ok(mut timers) = self.state.timers.try_borrow_mut() {
                timers.abandon_in_flight();
            }
        }
    }
}

/// A deterministic, single-threaded JavaScript event loop.
///
/// # Examples
///
/// ```
/// use async_runtime::EventLoop;
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// let event_loop = EventLoop::new();
/// let log = Rc::new(RefCell::new(Vec::new()));
///
/// log.borrow_mut().push("A");
/// let l = log.clone();
/// event_loop.set_timeout(move || { l.borrow_mut().push("B"); Ok(()) }, 0);
/// log.borrow_mut().push("C");
///
/// event_loop.advance_by(0).unwrap();
/// assert_eq!(*log.borrow(), vec!["A", "C", "B"]);
/// ```
#[derive(Clone)]
pub struct EventLoop {
    state: Rc<LoopState>,
}

impl EventLoop {
    /// Creates an event loop with the default configuration.
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    /// Creates an event loop from a configuration.
    pub fn with_config(config: SchedulerConfig) -> Self {
        let state = LoopState {
            clock: Clock::new(config.start_time_ms),
            microtasks: RefCell::new(MicrotaskQueue::new()),
            timers: RefCell::new(TimerRegistry::new()),
            rejections: RefCell::new(Vec::new()),
            sink: RefCell::new(Rc::new(TracingSink)),
            policy: RefCell::new(Box::new(config.clamp)),
            draining: Cell::new(false),
            driving: Cell::new(false),
            timer_nesting: Cell::new(None),
            stats: Cell::new(LoopStats::default()),
            next_promise_id: Cell::new(0),
            config,
        };
        Self {
            state: Rc::new(state),
        }
    }

    /// Routes asynchronous failures to `sink` instead of the log.
    pub fn with_error_sink<S: ErrorSink + 'static>(self, sink: S) -> Self {
        *self.state.sink.borrow_mut() = Rc::new(sink);
        self
    }

    /// Replaces the minimum-delay policy chosen by the configuration.
    pub fn with_delay_policy<P: DelayPolicy + 'static>(self, policy: P) -> Self {
        *self.state.policy.borrow_mut() = Box::new(policy);
        self
    }

    /// The configuration this loop was built with.
    pub fn config(&self) -> &SchedulerConfig {
        &self.state.config
    }

    /// Current logical time.
    pub fn now(&self) -> LogicalTime {
        self.state.clock.now()
    }

    /// Work counters.
    pub fn stats(&self) -> LoopStats {
        self.state.stats.get()
    }

    /// Returns true if both handles refer to the same loop.
    pub fn ptr_eq(&self, other: &EventLoop) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }

    fn update_stats(&self, f: impl FnOnce(&mut LoopStats)) {
        let mut stats = self.state.stats.get();
        f(&mut stats);
        self.state.stats.set(stats);
    }

    // ---------------------------------------------------------------------
    // Timers
    // ---------------------------------------------------------------------

    /// Schedules `callback` to run once after `delay` milliseconds.
    ///
    /// Negative delays are treated as zero.
    pub fn set_timeout<F>(&self, callback: F, delay: i64) -> TimerHandle
    where
        F: FnOnce() -> Result<(), JsError> + 'static,
    {
        self.set_timeout_with_args(move |_| callback(), delay, Vec::new())
    }

    /// Like [`set_timeout`](Self::set_timeout), passing `args` to the callback.
    pub fn set_timeout_with_args<F>(&self, callback: F, delay: i64, args: Vec<Value>) -> TimerHandle
    where
        F: FnOnce(&[Value]) -> Result<(), JsError> + 'static,
    {
        let mut callback = Some(callback);
        let once: TimerCallback = Box::new(move |args| match callback.take() {
            Some(f) => f(args),
            None => Ok(()),
        });
        self.schedule(delay, once, args, false)
    }

    /// Schedules `callback` to run every `period` milliseconds.
    ///
    /// The period is at least 1ms so that an interval cannot spin forever at
    /// a single instant.
    pub fn set_interval<F>(&self, mut callback: F, period: i64) -> TimerHandle
    where
        F: FnMut() -> Result<(), JsError> + 'static,
    {
        self.schedule(period, Box::new(move |_| callback()), Vec::new(), true)
    }

    /// Like [`set_interval`](Self::set_interval), passing `args` on every tick.
    pub fn set_interval_with_args<F>(&self, callback: F, period: i64, args: Vec<Value>) -> TimerHandle
    where
        F: FnMut(&[Value]) -> Result<(), JsError> + 'static,
    {
        self.schedule(period, Box::new(callback), args, true)
    }

    /// Registers a timer.
    ///
    /// The fire time is `now() + delay` after the delay policy has been
    /// applied. Repeating timers reschedule themselves at
    /// `fire_time + period` after each firing.
    pub fn schedule(
        &self,
        delay: i64,
        callback: TimerCallback,
        args: Vec<Value>,
        repeating: bool,
    ) -> TimerHandle {
        let requested = u64::try_from(delay).unwrap_or(0);
        let nesting = self.state.timer_nesting.get().unwrap_or(0);
        let mut delay = self.state.policy.borrow().effective_delay(requested, nesting);
        let period = if repeating {
            delay = delay.max(1);
            Some(delay)
        } else {
            None
        };
        let fire_time = self.now().saturating_add(delay);
        let handle = self
            .state
            .timers
            .borrow_mut()
            .insert(fire_time, period, callback, args, nesting + 1);
        trace!(%handle, fire_time, repeating, "timer scheduled");
        handle
    }

    /// Cancels a timeout. Unknown or finished handles are ignored.
    pub fn clear_timeout(&self, handle: TimerHandle) {
        if self.state.timers.borrow_mut().cancel(handle) {
            trace!(%handle, "timer cleared");
        }
    }

    /// Cancels an interval. Equivalent to [`clear_timeout`](Self::clear_timeout).
    pub fn clear_interval(&self, handle: TimerHandle) {
        self.clear_timeout(handle);
    }

    /// Cancels every pending timer.
    pub fn clear_all_timers(&self) {
        self.state.timers.borrow_mut().clear();
        debug!("all timers cleared");
    }

    /// Number of timers waiting to fire.
    pub fn pending_timer_count(&self) -> usize {
        self.state.timers.borrow().len()
    }

    /// Fire time of the earliest pending timer.
    pub fn next_timer_time(&self) -> Option<LogicalTime> {
        self.state.timers.borrow_mut().next_fire_time()
    }

    /// Returns a promise fulfilled with `undefined` after `ms` milliseconds.
    pub fn sleep(&self, ms: i64) -> Promise {
        let (promise, resolver) = Promise::with_resolvers(self);
        self.set_timeout(
            move || {
                resolver.resolve(Value::Undefined);
                Ok(())
            },
            ms,
        );
        promise
    }

    // ---------------------------------------------------------------------
    // Microtasks
    // ---------------------------------------------------------------------

    /// Appends a callback to the microtask queue.
    pub fn queue_microtask<F>(&self, callback: F)
    where
        F: FnOnce() -> Result<(), JsError> + 'static,
    {
        let sequence = self
            .state
            .microtasks
            .borrow_mut()
            .enqueue(MicroTask::new(callback));
        trace!(sequence, "microtask queued");
    }

    /// Returns true if microtasks are waiting.
    pub fn has_pending_microtasks(&self) -> bool {
        !self.state.microtasks.borrow().is_empty()
    }

    /// Number of queued microtasks.
    pub fn pending_microtask_count(&self) -> usize {
        self.state.microtasks.borrow().len()
    }

    /// Drains the microtask queue, including microtasks queued while
    /// draining, then reports unhandled rejections.
    ///
    /// Returns the number of microtasks run. Called from inside any running
    /// callback (the script, a timer or a microtask) it does nothing and
    /// returns 0; the loop drains at its own checkpoint once the callback
    /// has returned.
    pub fn run_microtasks(&self) -> usize {
        if self.state.driving.get() {
            return 0;
        }
        self.drain_microtasks()
    }

    fn drain_microtasks(&self) -> usize {
        if self.state.draining.replace(true) {
            return 0;
        }
        let ran = {
            let _guard = FlagGuard(&self.state.draining);
            let mut ran = 0;
            loop {
                let next = self.state.microtasks.borrow_mut().dequeue();
                let Some(microtask) = next else { break };
                ran += 1;
                let sequence = microtask.sequence();
                if let Err(error) = microtask.run() {
                    self.report(ErrorReport::Microtask { sequence, error });
                }
            }
            ran
        };
        self.update_stats(|s| s.microtasks_run += ran as u64);
        self.check_unhandled_rejections();
        ran
    }

    // ---------------------------------------------------------------------
    // Error reporting
    // ---------------------------------------------------------------------

    pub(crate) fn report(&self, report: ErrorReport) {
        self.update_stats(|s| s.errors_reported += 1);
        let sink = self.state.sink.borrow().clone();
        sink.report(report);
    }

    pub(crate) fn track_rejection(&self, promise: Promise) {
        if self.state.config.track_unhandled_rejections {
            self.state.rejections.borrow_mut().push(promise);
        }
    }

    fn check_unhandled_rejections(&self) {
        let tracked = std::mem::take(&mut *self.state.rejections.borrow_mut());
        for promise in tracked {
            if promise.is_handled() || promise.state() != PromiseState::Rejected {
                continue;
            }
            self.report(ErrorReport::UnhandledRejection {
                promise_id: promise.id(),
                reason: promise.result().unwrap_or(Value::Undefined),
            });
        }
    }

    pub(crate) fn next_promise_id(&self) -> u64 {
        let id = self.state.next_promise_id.get() + 1;
        self.state.next_promise_id.set(id);
        id
    }

    // ---------------------------------------------------------------------
    // Driver
    // ---------------------------------------------------------------------

    fn enter(&self, operation: &'static str) -> SchedulerResult<FlagGuard<'_>> {
        if self.state.draining.get() || self.state.driving.replace(true) {
            return Err(SchedulerError::Reentrant { operation });
        }
        Ok(FlagGuard(&self.state.driving))
    }

    /// Runs `script` as the initial macrotask, then drains microtasks.
    ///
    /// An error thrown by the script is returned after the drain.
    pub fn run_script<F>(&self, script: F) -> SchedulerResult<Value>
    where
        F: FnOnce() -> Result<Value, JsError>,
    {
        let _guard = self.enter("run_script")?;
        debug!(now = self.now(), "running script");
        let result = script();
        self.drain_microtasks();
        Ok(result?)
    }

    /// Advances logical time by `ms`, firing every timer due on the way.
    ///
    /// Pending microtasks are drained first. Each timer fires with the clock
    /// set to its fire time and is followed by a full microtask drain; timers
    /// scheduled meanwhile also fire if they fall inside the window. Returns
    /// the number of timers fired.
    pub fn advance_by(&self, ms: u64) -> SchedulerResult<usize> {
        let _guard = self.enter("advance_by")?;
        Ok(self.advance_unguarded(ms))
    }

    fn advance_unguarded(&self, ms: u64) -> usize {
        self.drain_microtasks();
        let target = self.now().saturating_add(ms);
        debug!(from = self.now(), to = target, "advancing clock");
        let mut fired = 0;
        while self.fire_next(target) {
            fired += 1;
        }
        self.state.clock.advance_to(target);
        fired
    }

    /// Advances to the next timer's fire time and runs every timer due then.
    ///
    /// Returns the new time, or `None` if no timer was pending.
    pub fn advance_to_next_timer(&self) -> SchedulerResult<Option<LogicalTime>> {
        let _guard = self.enter("advance_to_next_timer")?;
        self.drain_microtasks();
        let Some(time) = self.next_timer_time() else {
            return Ok(None);
        };
        self.advance_unguarded(time.saturating_sub(self.now()));
        Ok(Some(time))
    }

    /// Fires timers until none remain, including ones scheduled meanwhile.
    ///
    /// Fails with [`SchedulerError::TimerLimitExceeded`] once the configured
    /// limit is reached with timers still pending.
    pub fn run_all_pending(&self) -> SchedulerResult<usize> {
        let _guard = self.enter("run_all_pending")?;
        self.drain_microtasks();
        let limit = self.state.config.timer_limit;
        debug!(pending = self.pending_timer_count(), "running all timers");
        let mut fired = 0;
        while self.fire_next(LogicalTime::MAX) {
            fired += 1;
            if fired >= limit && self.pending_timer_count() > 0 {
                return Err(SchedulerError::TimerLimitExceeded { limit });
            }
        }
        Ok(fired)
    }

    /// Fires only the timers pending at the time of the call, each at most
    /// once. Timers created meanwhile stay queued.
    pub fn run_only_pending(&self) -> SchedulerResult<usize> {
        let _guard = self.enter("run_only_pending")?;
        self.drain_microtasks();
        let limit = self.state.config.timer_limit;
        let mut pending = self.state.timers.borrow().handles();
        let mut fired = 0;
        loop {
            let next = self.state.timers.borrow_mut().pop_next_among(&pending);
            let Some(timer) = next else { break };
            pending.remove(&timer.handle);
            self.fire(timer);
            fired += 1;
            if fired >= limit && !pending.is_empty() {
                return Err(SchedulerError::TimerLimitExceeded { limit });
            }
        }
        Ok(fired)
    }

    fn fire_next(&self, deadline: LogicalTime) -> bool {
        let next = self.state.timers.borrow_mut().pop_due(deadline);
        match next {
            Some(timer) => {
                self.fire(timer);
                true
            }
            None => false,
        }
    }

    /// Runs one timer as a macrotask followed by a microtask drain.
    fn fire(&self, mut timer: Timer) {
        self.state.clock.advance_to(timer.fire_time);
        let handle = timer.handle;
        trace!(%handle, now = self.now(), "timer fired");

        // The nesting level stays set through the microtask checkpoint, so
        // timers scheduled by this timer's reactions count as nested.
        let _nesting = NestingGuard::enter(&self.state, timer.nesting);
        let result = timer.fire();
        self.update_stats(|s| s.timers_fired += 1);

        self.state.timers.borrow_mut().finish(timer);
        if let Err(error) = result {
            self.report(ErrorReport::Timer { handle, error });
        }
        self.drain_microtasks();
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoop")
            .field("now", &self.now())
            .field("pending_timers", &self.pending_timer_count())
            .field("pending_microtasks", &self.pending_microtask_count())
            .finish()
    }
}
