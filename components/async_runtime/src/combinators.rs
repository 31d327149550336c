//! Promise combinators: `all`, `allSettled`, `race`, `any`, and a
//! timer-backed `timeout`.
//!
//! Every input goes through [`Promise::resolve`] first, so plain values,
//! native promises and thenables can be mixed freely. Result arrays follow
//! input order, not completion order.

use crate::event_loop::EventLoop;
use crate::promise::{Promise, Resolver};
use core_types::{ErrorKind, JsError, Value};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Shared bookkeeping for combinators that collect one slot per input.
struct Collector {
    slots: RefCell<Vec<Value>>,
    remaining: Cell<usize>,
}

impl Collector {
    fn new(len: usize) -> Rc<Self> {
        Rc::new(Self {
            slots: RefCell::new(vec![Value::Undefined; len]),
            remaining: Cell::new(len),
        })
    }

    /// Stores `value` at `index`; returns every slot once all are filled.
    fn fill(&self, index: usize, value: Value) -> Option<Vec<Value>> {
        self.slots.borrow_mut()[index] = value;
        let remaining = self.remaining.get() - 1;
        self.remaining.set(remaining);
        if remaining == 0 {
            Some(std::mem::take(&mut *self.slots.borrow_mut()))
        } else {
            None
        }
    }
}

fn resolve_all(event_loop: &EventLoop, values: impl IntoIterator<Item = Value>) -> Vec<Promise> {
    values
        .into_iter()
        .map(|value| Promise::resolve(event_loop, value))
        .collect()
}

impl Promise {
    /// `Promise.all`: fulfills with every input's value, in input order, or
    /// rejects with the first rejection reason.
    ///
    /// # Examples
    ///
    /// ```
    /// use async_runtime::{EventLoop, Promise};
    /// use core_types::Value;
    ///
    /// let event_loop = EventLoop::new();
    /// let slow = event_loop.sleep(20).then(|_| Ok(Value::from("slow")));
    /// let fast = event_loop.sleep(10).then(|_| Ok(Value::from("fast")));
    /// let all = Promise::all(&event_loop, [slow.into(), fast.into(), Value::Smi(3)]);
    ///
    /// event_loop.run_all_pending().unwrap();
    /// assert_eq!(
    ///     all.result(),
    ///     Some(Value::Array(vec![Value::from("slow"), Value::from("fast"), Value::Smi(3)]))
    /// );
    /// ```
    pub fn all(event_loop: &EventLoop, values: impl IntoIterator<Item = Value>) -> Promise {
        let (promise, resolver) = Promise::with_resolvers(event_loop);
        let inputs = resolve_all(event_loop, values);
        if inputs.is_empty() {
            resolver.resolve(Value::Array(Vec::new()));
            return promise;
        }
        let collector = Collector::new(inputs.len());
        for (index, input) in inputs.into_iter().enumerate() {
            let collector = collector.clone();
            let on_value = resolver.clone();
            let on_reason = resolver.clone();
            input.then_with(
                move |value| {
                    if let Some(values) = collector.fill(index, value) {
                        on_value.resolve(Value::Array(values));
                    }
                    Ok(Value::Undefined)
                },
                move |reason| {
                    on_reason.reject(reason);
                    Ok(Value::Undefined)
                },
            );
        }
        promise
    }

    /// `Promise.allSettled`: always fulfills, with one
    /// `{ status, value | reason }` object per input in input order.
    pub fn all_settled(event_loop: &EventLoop, values: impl IntoIterator<Item = Value>) -> Promise {
        let (promise, resolver) = Promise::with_resolvers(event_loop);
        let inputs = resolve_all(event_loop, values);
        if inputs.is_empty() {
            resolver.resolve(Value::Array(Vec::new()));
            return promise;
        }
        let collector = Collector::new(inputs.len());
        for (index, input) in inputs.into_iter().enumerate() {
            let fulfilled = (collector.clone(), resolver.clone());
            let rejected = (collector.clone(), resolver.clone());
            input.then_with(
                move |value| {
                    let (collector, resolver) = fulfilled;
                    let entry = Value::object([("status", Value::from("fulfilled")), ("value", value)]);
                    if let Some(values) = collector.fill(index, entry) {
                        resolver.resolve(Value::Array(values));
                    }
                    Ok(Value::Undefined)
                },
                move |reason| {
                    let (collector, resolver) = rejected;
                    let entry = Value::object([("status", Value::from("rejected")), ("reason", reason)]);
                    if let Some(values) = collector.fill(index, entry) {
                        resolver.resolve(Value::Array(values));
                    }
                    Ok(Value::Undefined)
                },
            );
        }
        promise
    }

    /// `Promise.race`: settles like the first input to settle. An empty
    /// input never settles.
    pub fn race(event_loop: &EventLoop, values: impl IntoIterator<Item = Value>) -> Promise {
        let (promise, resolver) = Promise::with_resolvers(event_loop);
        for input in resolve_all(event_loop, values) {
            follow(&input, resolver.clone());
        }
        promise
    }

    /// `Promise.any`: fulfills with the first fulfillment. If every input
    /// rejects (or there are none), rejects with an `AggregateError`
    /// holding the reasons in input order.
    pub fn any(event_loop: &EventLoop, values: impl IntoIterator<Item = Value>) -> Promise {
        let (promise, resolver) = Promise::with_resolvers(event_loop);
        let inputs = resolve_all(event_loop, values);
        if inputs.is_empty() {
            resolver.reject(JsError::aggregate("All promises were rejected", Vec::new()).into_value());
            return promise;
        }
        let collector = Collector::new(inputs.len());
        for (index, input) in inputs.into_iter().enumerate() {
            let collector = collector.clone();
            let on_value = resolver.clone();
            let on_reason = resolver.clone();
            input.then_with(
                move |value| {
                    on_value.resolve(value);
                    Ok(Value::Undefined)
                },
                move |reason| {
                    if let Some(reasons) = collector.fill(index, reason) {
                        let error = JsError::aggregate("All promises were rejected", reasons);
                        on_reason.reject(error.into_value());
                    }
                    Ok(Value::Undefined)
                },
            );
        }
        promise
    }

    /// Races this promise against a timer: the result settles like `self`
    /// if it settles within `ms`, otherwise rejects with a `TimeoutError`.
    /// The timer is cleared as soon as `self` settles.
    pub fn timeout(&self, ms: i64) -> Promise {
        let event_loop = self.event_loop().clone();
        let (promise, resolver) = Promise::with_resolvers(&event_loop);
        let expired = resolver.clone();
        let handle = event_loop.set_timeout(
            move || {
                let error = JsError::new(ErrorKind::TimeoutError, format!("timed out after {}ms", ms));
                expired.reject(error.into_value());
                Ok(())
            },
            ms,
        );
        let on_value = (resolver.clone(), event_loop.clone());
        let on_reason = (resolver, event_loop);
        self.then_with(
            move |value| {
                let (resolver, event_loop) = on_value;
                event_loop.clear_timeout(handle);
                resolver.resolve(value);
                Ok(Value::Undefined)
            },
            move |reason| {
                let (resolver, event_loop) = on_reason;
                event_loop.clear_timeout(handle);
                resolver.reject(reason);
                Ok(Value::Undefined)
            },
        );
        promise
    }
}

/// Settles `resolver` the same way `source` settles.
fn follow(source: &Promise, resolver: Resolver) {
    let on_reason = resolver.clone();
    source.then_with(
        move |value| {
            resolver.resolve(value);
            Ok(Value::Undefined)
        },
        move |reason| {
            on_reason.reject(reason);
            Ok(Value::Undefined)
        },
    );
}
