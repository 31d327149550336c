//! Timer registry.
//!
//! Pending timers are kept in a min-heap keyed by `(fire_time, sequence)` with
//! a side table of live entries. Cancellation removes the live entry and
//! leaves the heap key behind; stale keys are discarded when they reach the
//! top of the heap.

use crate::clock::LogicalTime;
use core_types::{JsError, Value};
use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap, HashSet};

/// Callback invoked each time a timer fires, with the timer's arguments.
pub type TimerCallback = Box<dyn FnMut(&[Value]) -> Result<(), JsError>>;

/// Opaque handle returned by `set_timeout` / `set_interval`.
///
/// Timeout and interval handles share one id space, so either clear function
/// accepts either kind of handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

impl TimerHandle {
    /// Builds a handle from a raw id. Unknown ids are valid to clear.
    pub fn from_raw(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw id.
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TimerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A pending one-shot or repeating timer.
pub struct Timer {
    /// Handle the timer was registered under
    pub handle: TimerHandle,
    /// Logical time at which the timer is due
    pub fire_time: LogicalTime,
    /// Repeat period for intervals
    pub period: Option<u64>,
    /// Tie-break among timers due at the same time
    pub sequence: u64,
    /// How deeply this timer was nested inside other timer callbacks
    pub nesting: u32,
    /// Arguments passed to every invocation
    pub args: Vec<Value>,
    /// Set when cleared while its own callback was running
    pub cancelled: bool,
    callback: TimerCallback,
}

impl Timer {
    /// Invokes the callback with the stored arguments.
    pub(crate) fn fire(&mut self) -> Result<(), JsError> {
        (self.callback)(&self.args)
    }

    /// Returns true for intervals.
    pub fn is_repeating(&self) -> bool {
        self.period.is_some()
    }
}

impl std::fmt::Debug for Timer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timer")
            .field("handle", &self.handle)
            .field("fire_time", &self.fire_time)
            .field("period", &self.period)
            .field("sequence", &self.sequence)
            .field("cancelled", &self.cancelled)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TimerKey {
    fire_time: LogicalTime,
    sequence: u64,
    id: u64,
}

impl Ord for TimerKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.fire_time
            .cmp(&other.fire_time)
            .then(self.sequence.cmp(&other.sequence))
            .then(self.id.cmp(&other.id))
    }
}

impl PartialOrd for TimerKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone, Copy)]
struct InFlight {
    id: u64,
    cancelled: bool,
}

/// Stale heap keys tolerated beyond twice the live count before compaction.
const COMPACT_SLACK: usize = 64;

/// Pending timers ordered by `(fire_time, sequence)`.
#[derive(Default)]
pub struct TimerRegistry {
    heap: BinaryHeap<Reverse<TimerKey>>,
    live: HashMap<u64, Timer>,
    in_flight: Option<InFlight>,
    next_id: u64,
    next_sequence: u64,
}

impl TimerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a timer and returns its handle.
    pub fn insert(
        &mut self,
        fire_time: LogicalTime,
        period: Option<u64>,
        callback: TimerCallback,
        args: Vec<Value>,
        nesting: u32,
    ) -> TimerHandle {
        self.next_id += 1;
        let handle = TimerHandle(self.next_id);
        let timer = Timer {
            handle,
            fire_time,
            period,
            sequence: 0,
            nesting,
            args,
            cancelled: false,
            callback,
        };
        self.push(timer);
        handle
    }

    fn push(&mut self, mut timer: Timer) {
        timer.sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(Reverse(TimerKey {
            fire_time: timer.fire_time,
            sequence: timer.sequence,
            id: timer.handle.0,
        }));
        self.live.insert(timer.handle.0, timer);
    }

    /// Cancels a timer. Returns false for unknown or already finished handles.
    ///
    /// Cancelling the timer whose callback is currently running only stops
    /// future repetitions.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        if self.live.remove(&handle.0).is_some() {
            self.compact();
            return true;
        }
        match self.in_flight.as_mut() {
            Some(flight) if flight.id == handle.0 && !flight.cancelled => {
                flight.cancelled = true;
                true
            }
            _ => false,
        }
    }

    /// Drops stale heap keys once they outnumber live timers.
    fn compact(&mut self) {
        if self.heap.len() <= 2 * self.live.len() + COMPACT_SLACK {
            return;
        }
        let live = &self.live;
        self.heap
            .retain(|Reverse(key)| live.get(&key.id).is_some_and(|t| t.sequence == key.sequence));
    }

    fn is_stale(&self, key: &TimerKey) -> bool {
        self.live
            .get(&key.id)
            .map_or(true, |t| t.sequence != key.sequence)
    }

    fn clean_top(&mut self) {
        while let Some(Reverse(key)) = self.heap.peek().copied() {
            if !self.is_stale(&key) {
                break;
            }
            self.heap.pop();
        }
    }

    /// Fire time of the next live timer.
    pub fn next_fire_time(&mut self) -> Option<LogicalTime> {
        self.clean_top();
        self.heap.peek().map(|Reverse(key)| key.fire_time)
    }

    /// Removes the next timer if it is due at or before `deadline` and marks
    /// it as in flight.
    pub fn pop_due(&mut self, deadline: LogicalTime) -> Option<Timer> {
        if self.next_fire_time()? > deadline {
            return None;
        }
        let Reverse(key) = self.heap.pop()?;
        self.take_in_flight(key.id)
    }

    /// Removes the earliest live timer whose handle is in `allowed`, leaving
    /// every other timer queued.
    pub fn pop_next_among(&mut self, allowed: &HashSet<TimerHandle>) -> Option<Timer> {
        let mut skipped = Vec::new();
        let mut found = None;
        while let Some(Reverse(key)) = self.heap.pop() {
            if self.is_stale(&key) {
                continue;
            }
            if allowed.contains(&TimerHandle(key.id)) {
                found = Some(key.id);
                break;
            }
            skipped.push(Reverse(key));
        }
        self.heap.extend(skipped);
        found.and_then(|id| self.take_in_flight(id))
    }

    fn take_in_flight(&mut self, id: u64) -> Option<Timer> {
        let timer = self.live.remove(&id)?;
        self.in_flight = Some(InFlight {
            id,
            cancelled: false,
        });
        Some(timer)
    }

    /// Forgets the in-flight timer without rescheduling it. Used when its
    /// callback unwound instead of returning.
    pub fn abandon_in_flight(&mut self) {
        self.in_flight = None;
    }

    /// Completes a firing started by [`pop_due`](Self::pop_due).
    ///
    /// Repeating timers that were not cleared from their own callback are
    /// rescheduled at `fire_time + period` and return their handle.
    pub fn finish(&mut self, mut timer: Timer) -> Option<TimerHandle> {
        if let Some(flight) = self.in_flight.take() {
            timer.cancelled |= flight.cancelled;
        }
        match timer.period {
            Some(period) if !timer.cancelled => {
                timer.fire_time = timer.fire_time.saturating_add(period);
                let handle = timer.handle;
                self.push(timer);
                Some(handle)
            }
            _ => None,
        }
    }

    /// Handles of every live timer.
    pub fn handles(&self) -> HashSet<TimerHandle> {
        self.live.keys().map(|id| TimerHandle(*id)).collect()
    }

    /// Returns true if the handle refers to a pending timer.
    pub fn contains(&self, handle: TimerHandle) -> bool {
        self.live.contains_key(&handle.0)
    }

    /// Drops every pending timer.
    pub fn clear(&mut self) {
        self.live.clear();
        self.heap.clear();
        if let Some(flight) = self.in_flight.as_mut() {
            flight.cancelled = true;
        }
    }

    /// Number of pending timers.
    pub fn len(&self) -> usize {
        self.live.len()
    }

    /// Returns true if no timer is pending.
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }
}

/// Decides the effective delay of a newly scheduled timer.
pub trait DelayPolicy {
    /// Returns the delay to use for a timer requested with `requested`
    /// milliseconds at the given nesting level.
    fn effective_delay(&self, requested: u64, nesting: u32) -> u64;
}

/// Built-in minimum-delay policies.
///
/// # Examples
///
/// ```
/// use async_runtime::{DelayPolicy, TimerClamp};
///
/// let clamp = TimerClamp::html();
/// assert_eq!(clamp.effective_delay(0, 1), 0);
/// assert_eq!(clamp.effective_delay(0, 6), 4);
/// assert_eq!(TimerClamp::None.effective_delay(0, 100), 0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum TimerClamp {
    /// Delays are used as requested
    #[default]
    None,
    /// Timers nested deeper than `threshold` wait at least `minimum_ms`
    Nested {
        /// Nesting level above which clamping applies
        threshold: u32,
        /// Minimum delay once clamped
        minimum_ms: u64,
    },
}

impl TimerClamp {
    /// The browser clamp: nesting above 5 raises delays to 4ms.
    pub fn html() -> Self {
        TimerClamp::Nested {
            threshold: 5,
            minimum_ms: 4,
        }
    }
}

impl DelayPolicy for TimerClamp {
    fn effective_delay(&self, requested: u64, nesting: u32) -> u64 {
        match *self {
            TimerClamp::None => requested,
            TimerClamp::Nested {
                threshold,
                minimum_ms,
            } if nesting > threshold => requested.max(minimum_ms),
            TimerClamp::Nested { .. } => requested,
        }
    }
}
