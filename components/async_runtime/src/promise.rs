//! Promise implementation following the Promises/A+ and ECMAScript job model.
//!
//! A [`Promise`] settles at most once. Reactions attached while it is pending
//! are queued as microtasks, in attachment order, when it settles; reactions
//! attached afterwards are queued immediately. Handlers therefore never run
//! synchronously, even for an already settled promise.
//!
//! Resolution assimilates thenables: resolving with a native promise or a
//! [`Thenable`] subscribes to it through a microtask job instead of
//! fulfilling with the object itself, so one promise is never wrapped in
//! another.

use crate::event_loop::EventLoop;
use core_types::{JsError, Value};
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use tracing::trace;

/// The state of a Promise.
///
/// Once settled (Fulfilled or Rejected), a Promise cannot change state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromiseState {
    /// The initial state; the promise is neither fulfilled nor rejected.
    Pending,
    /// The promise has been resolved with a value.
    Fulfilled,
    /// The promise has been rejected with a reason.
    Rejected,
}

/// A fulfillment or rejection handler.
///
/// Returning `Err` is a throw: the derived promise rejects with the error's
/// value.
pub type Handler = Box<dyn FnOnce(Value) -> Result<Value, JsError>>;

/// A reaction to be triggered when a Promise settles.
///
/// This represents the handlers registered via `.then()` (with a derived
/// promise to settle) and internal subscriptions such as `await` (without).
pub struct PromiseReaction {
    capability: Option<Resolver>,
    on_fulfilled: Option<Handler>,
    on_rejected: Option<Handler>,
}

impl PromiseReaction {
    /// A reaction that settles the promise behind `capability` with the
    /// handler's outcome.
    pub fn new(capability: Resolver, on_fulfilled: Option<Handler>, on_rejected: Option<Handler>) -> Self {
        Self {
            capability: Some(capability),
            on_fulfilled,
            on_rejected,
        }
    }

    /// A reaction with no derived promise. Errors returned by the handlers
    /// are reported as microtask failures.
    pub fn detached(on_fulfilled: Handler, on_rejected: Handler) -> Self {
        Self {
            capability: None,
            on_fulfilled: Some(on_fulfilled),
            on_rejected: Some(on_rejected),
        }
    }

    /// Runs the reaction for a settled source promise.
    fn run(self, state: PromiseState, argument: Value) -> Result<(), JsError> {
        let handler = match state {
            PromiseState::Fulfilled => self.on_fulfilled,
            _ => self.on_rejected,
        };
        let outcome = match handler {
            Some(handler) => handler(argument),
            None if state == PromiseState::Fulfilled => Ok(argument),
            None => Err(JsError::from_value(argument)),
        };
        match self.capability {
            Some(capability) => {
                match outcome {
                    Ok(value) => capability.resolve(value),
                    Err(error) => capability.reject(error.into_value()),
                }
                Ok(())
            }
            None => outcome.map(|_| ()),
        }
    }
}

impl fmt::Debug for PromiseReaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromiseReaction")
            .field("has_capability", &self.capability.is_some())
            .field("on_fulfilled", &self.on_fulfilled.is_some())
            .field("on_rejected", &self.on_rejected.is_some())
            .finish()
    }
}

struct PromiseSlot {
    state: PromiseState,
    result: Option<Value>,
    reactions: Vec<PromiseReaction>,
    handled: bool,
}

struct PromiseCell {
    id: u64,
    event_loop: EventLoop,
    slot: RefCell<PromiseSlot>,
}

/// A JavaScript Promise.
///
/// `Promise` is a shared handle: clones refer to the same promise. A promise
/// belongs to the event loop it was created on and queues its reaction jobs
/// there.
///
/// # Examples
///
/// ```
/// use async_runtime::{EventLoop, Promise, PromiseState};
/// use core_types::Value;
///
/// let event_loop = EventLoop::new();
/// let doubled = Promise::resolve(&event_loop, Value::Smi(21))
///     .then(|v| match v {
///         Value::Smi(n) => Ok(Value::Smi(n * 2)),
///         other => Ok(other),
///     });
///
/// // Handlers never run synchronously.
/// assert_eq!(doubled.state(), PromiseState::Pending);
///
/// event_loop.run_microtasks();
/// assert_eq!(doubled.result(), Some(Value::Smi(42)));
/// ```
#[derive(Clone)]
pub struct Promise {
    cell: Rc<PromiseCell>,
}

impl Promise {
    fn pending(event_loop: &EventLoop) -> Self {
        Self {
            cell: Rc::new(PromiseCell {
                id: event_loop.next_promise_id(),
                event_loop: event_loop.clone(),
                slot: RefCell::new(PromiseSlot {
                    state: PromiseState::Pending,
                    result: None,
                    reactions: Vec::new(),
                    handled: false,
                }),
            }),
        }
    }

    /// Creates a promise and runs `executor` synchronously with its
    /// resolving functions. An error returned by the executor rejects the
    /// promise unless it was already resolved.
    pub fn new<F>(event_loop: &EventLoop, executor: F) -> Self
    where
        F: FnOnce(Resolver) -> Result<(), JsError>,
    {
        let (promise, resolver) = Self::with_resolvers(event_loop);
        if let Err(error) = executor(resolver.clone()) {
            resolver.reject(error.into_value());
        }
        promise
    }

    /// Creates a pending promise together with its resolving functions.
    pub fn with_resolvers(event_loop: &EventLoop) -> (Self, Resolver) {
        let promise = Self::pending(event_loop);
        let resolver = Resolver::new(promise.clone());
        (promise, resolver)
    }

    /// `Promise.resolve`: returns `value` itself if it is a native promise,
    /// otherwise a new promise resolved with it.
    pub fn resolve(event_loop: &EventLoop, value: impl Into<Value>) -> Self {
        let value = value.into();
        if let Some(promise) = Self::from_value(&value) {
            return promise;
        }
        let (promise, resolver) = Self::with_resolvers(event_loop);
        resolver.resolve(value);
        promise
    }

    /// `Promise.reject`: a new promise rejected with `reason`.
    pub fn reject(event_loop: &EventLoop, reason: impl Into<Value>) -> Self {
        let (promise, resolver) = Self::with_resolvers(event_loop);
        resolver.reject(reason);
        promise
    }

    /// Recovers a promise stored in a value.
    pub fn from_value(value: &Value) -> Option<Self> {
        let native = value.as_native()?.clone();
        native
            .downcast::<PromiseCell>()
            .ok()
            .map(|cell| Self { cell })
    }

    /// Wraps the promise as a value, e.g. to return it from a handler.
    pub fn into_value(self) -> Value {
        Value::Native(self.cell as Rc<dyn Any>)
    }

    /// Identifier unique within the owning event loop.
    pub fn id(&self) -> u64 {
        self.cell.id
    }

    /// The event loop this promise queues its jobs on.
    pub fn event_loop(&self) -> &EventLoop {
        &self.cell.event_loop
    }

    /// Current state.
    pub fn state(&self) -> PromiseState {
        self.cell.slot.borrow().state
    }

    /// The fulfillment value or rejection reason, once settled.
    pub fn result(&self) -> Option<Value> {
        self.cell.slot.borrow().result.clone()
    }

    /// Returns true once any reaction has been attached.
    pub fn is_handled(&self) -> bool {
        self.cell.slot.borrow().handled
    }

    /// Returns true if both handles refer to the same promise.
    pub fn ptr_eq(&self, other: &Promise) -> bool {
        Rc::ptr_eq(&self.cell, &other.cell)
    }

    /// Attaches a fulfillment handler. Rejections pass through.
    pub fn then<F>(&self, on_fulfilled: F) -> Promise
    where
        F: FnOnce(Value) -> Result<Value, JsError> + 'static,
    {
        self.then_handlers(Some(Box::new(on_fulfilled)), None)
    }

    /// Attaches fulfillment and rejection handlers.
    pub fn then_with<F, R>(&self, on_fulfilled: F, on_rejected: R) -> Promise
    where
        F: FnOnce(Value) -> Result<Value, JsError> + 'static,
        R: FnOnce(Value) -> Result<Value, JsError> + 'static,
    {
        self.then_handlers(Some(Box::new(on_fulfilled)), Some(Box::new(on_rejected)))
    }

    /// Attaches a rejection handler. Values pass through.
    pub fn catch<R>(&self, on_rejected: R) -> Promise
    where
        R: FnOnce(Value) -> Result<Value, JsError> + 'static,
    {
        self.then_handlers(None, Some(Box::new(on_rejected)))
    }

    /// `then` with optional handlers; a missing handler passes the outcome
    /// through to the derived promise.
    pub fn then_handlers(&self, on_fulfilled: Option<Handler>, on_rejected: Option<Handler>) -> Promise {
        let (derived, capability) = Self::with_resolvers(self.event_loop());
        self.react(PromiseReaction::new(capability, on_fulfilled, on_rejected));
        derived
    }

    /// Runs `on_finally` once the promise settles either way.
    ///
    /// The derived promise keeps this promise's outcome, unless `on_finally`
    /// throws or returns a promise that rejects. A promise returned by
    /// `on_finally` is waited for.
    pub fn finally<F>(&self, on_finally: F) -> Promise
    where
        F: FnOnce() -> Result<Value, JsError> + 'static,
    {
        let callback = Rc::new(RefCell::new(Some(on_finally)));
        let run = move || -> Result<Value, JsError> {
            let taken = callback.borrow_mut().take();
            match taken {
                Some(f) => f(),
                None => Ok(Value::Undefined),
            }
        };
        let run_rejected = run.clone();
        let el = self.event_loop().clone();
        let el_rejected = el.clone();
        self.then_with(
            move |value| {
                let waited = Promise::resolve(&el, run()?);
                Ok(waited.then(move |_| Ok(value)).into_value())
            },
            move |reason| {
                let waited = Promise::resolve(&el_rejected, run_rejected()?);
                Ok(waited
                    .then(move |_| Err(JsError::from_value(reason)))
                    .into_value())
            },
        )
    }

    /// Registers a reaction, queueing it at once if already settled.
    pub fn react(&self, reaction: PromiseReaction) {
        let settled = {
            let mut slot = self.cell.slot.borrow_mut();
            slot.handled = true;
            match slot.state {
                PromiseState::Pending => {
                    slot.reactions.push(reaction);
                    return;
                }
                state => (state, slot.result.clone().unwrap_or(Value::Undefined), reaction),
            }
        };
        let (state, argument, reaction) = settled;
        self.queue_reaction(reaction, state, argument);
    }

    fn queue_reaction(&self, reaction: PromiseReaction, state: PromiseState, argument: Value) {
        self.event_loop()
            .queue_microtask(move || reaction.run(state, argument));
    }

    /// Transitions out of Pending. Later calls are no-ops.
    fn settle(&self, state: PromiseState, value: Value) {
        let (reactions, handled) = {
            let mut slot = self.cell.slot.borrow_mut();
            if slot.state != PromiseState::Pending {
                return;
            }
            slot.state = state;
            slot.result = Some(value.clone());
            (std::mem::take(&mut slot.reactions), slot.handled)
        };
        trace!(promise = self.id(), ?state, reactions = reactions.len(), "promise settled");
        if state == PromiseState::Rejected && !handled {
            self.event_loop().track_rejection(self.clone());
        }
        for reaction in reactions {
            self.queue_reaction(reaction, state, value.clone());
        }
    }
}

impl From<Promise> for Value {
    fn from(promise: Promise) -> Self {
        promise.into_value()
    }
}

impl fmt::Debug for Promise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = self.cell.slot.borrow();
        f.debug_struct("Promise")
            .field("id", &self.cell.id)
            .field("state", &slot.state)
            .field("result", &slot.result)
            .field("reactions", &slot.reactions.len())
            .finish()
    }
}

/// The resolving functions of one promise.
///
/// Clones share a single "already resolved" flag, so only the first call to
/// `resolve` or `reject` across all clones has any effect.
#[derive(Clone)]
pub struct Resolver {
    promise: Promise,
    already_resolved: Rc<Cell<bool>>,
}

impl Resolver {
    fn new(promise: Promise) -> Self {
        Self {
            promise,
            already_resolved: Rc::new(Cell::new(false)),
        }
    }

    /// The promise these functions settle.
    pub fn promise(&self) -> &Promise {
        &self.promise
    }

    /// Returns true once `resolve` or `reject` has been called.
    pub fn is_resolved(&self) -> bool {
        self.already_resolved.get()
    }

    /// Resolves the promise.
    ///
    /// A thenable value is subscribed to through a microtask job and the
    /// promise follows its outcome. Resolving a promise with itself rejects
    /// it with a `TypeError`.
    pub fn resolve(&self, value: impl Into<Value>) {
        if self.already_resolved.replace(true) {
            return;
        }
        let value = value.into();
        if let Some(target) = has_callable_then(&value) {
            if let ThenTarget::Native(inner) = &target {
                if inner.ptr_eq(&self.promise) {
                    let error = JsError::type_error("Chaining cycle detected for promise");
                    self.promise.settle(PromiseState::Rejected, error.into_value());
                    return;
                }
            }
            let promise = self.promise.clone();
            self.promise.event_loop().queue_microtask(move || {
                resolve_thenable_job(promise, target);
                Ok(())
            });
            return;
        }
        self.promise.settle(PromiseState::Fulfilled, value);
    }

    /// Rejects the promise with `reason`.
    pub fn reject(&self, reason: impl Into<Value>) {
        if self.already_resolved.replace(true) {
            return;
        }
        self.promise.settle(PromiseState::Rejected, reason.into());
    }
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("promise", &self.promise.id())
            .field("already_resolved", &self.already_resolved.get())
            .finish()
    }
}

/// A foreign object with a callable `then`.
///
/// `then` receives fresh resolving functions for the promise that is
/// adopting this object. Returning `Err` rejects that promise unless `then`
/// already resolved it.
///
/// # Examples
///
/// ```
/// use async_runtime::{EventLoop, Promise, Thenable};
/// use core_types::Value;
///
/// let event_loop = EventLoop::new();
/// let thenable = Thenable::new(|resolver| {
///     resolver.resolve(Value::Smi(7));
///     Ok(())
/// });
/// let promise = Promise::resolve(&event_loop, thenable.into_value());
/// event_loop.run_microtasks();
/// assert_eq!(promise.result(), Some(Value::Smi(7)));
/// ```
pub struct Thenable {
    then: Box<dyn Fn(Resolver) -> Result<(), JsError>>,
}

impl Thenable {
    /// Creates a thenable from its `then` implementation.
    pub fn new<F>(then: F) -> Self
    where
        F: Fn(Resolver) -> Result<(), JsError> + 'static,
    {
        Self {
            then: Box::new(then),
        }
    }

    /// Wraps the thenable as a value.
    pub fn into_value(self) -> Value {
        Value::Native(Rc::new(self) as Rc<dyn Any>)
    }
}

impl fmt::Debug for Thenable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Thenable {{ ... }}")
    }
}

/// What a thenable value resolves through.
pub enum ThenTarget {
    /// A promise from this engine
    Native(Promise),
    /// A foreign thenable
    Foreign(Rc<Thenable>),
}

/// Checks once, at resolution time, whether `value` has a callable `then`.
pub fn has_callable_then(value: &Value) -> Option<ThenTarget> {
    if let Some(promise) = Promise::from_value(value) {
        return Some(ThenTarget::Native(promise));
    }
    value
        .as_native()?
        .clone()
        .downcast::<Thenable>()
        .ok()
        .map(ThenTarget::Foreign)
}

/// Makes `promise` follow `target` using fresh resolving functions.
fn resolve_thenable_job(promise: Promise, target: ThenTarget) {
    let resolver = Resolver::new(promise);
    match target {
        ThenTarget::Native(source) => {
            let on_reject = resolver.clone();
            source.react(PromiseReaction::detached(
                Box::new(move |value| {
                    resolver.resolve(value);
                    Ok(Value::Undefined)
                }),
                Box::new(move |reason| {
                    on_reject.reject(reason);
                    Ok(Value::Undefined)
                }),
            ));
        }
        ThenTarget::Foreign(thenable) => {
            if let Err(error) = (thenable.then)(resolver.clone()) {
                resolver.reject(error.into_value());
            }
        }
    }
}
