//! Async function activations.
//!
//! An async function is modelled as an [`AsyncBody`]: a resumable state
//! machine that is started once and then resumed with the outcome of every
//! value it awaits. Calling it ([`run_async`]) runs the body synchronously up
//! to its first `await`; each later step runs as a microtask once the awaited
//! promise settles. The call's promise settles exactly once, when the body
//! returns or throws.
//!
//! Frames live on the heap and are linked only through the promise they
//! wait on, so long chains of awaits never grow the native stack.
//!
//! Bodies can be written by hand as closures over [`Resume`], or as Rust
//! `async` blocks through [`spawn_async`], where
//! [`AsyncScope::await_value`] is the suspension point.

use crate::event_loop::EventLoop;
use crate::promise::{Promise, PromiseReaction, Resolver};
use core_types::{ErrorKind, JsError, Value};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};
use tracing::trace;

/// Input delivered to an async body when it (re)starts.
#[derive(Debug, Clone, PartialEq)]
pub enum Resume {
    /// First step of the call
    Start,
    /// The awaited value fulfilled
    Fulfilled(Value),
    /// The awaited value rejected; the body sees this as a throw at the
    /// `await`
    Rejected(Value),
}

/// What an async body does at the end of a step.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Suspend until the value settles
    Await(Value),
    /// Finish, fulfilling the call's promise
    Return(Value),
    /// Finish, rejecting the call's promise
    Throw(Value),
}

/// The body of an async function.
///
/// # Examples
///
/// A function equivalent to
/// `async () => { try { await Promise.reject("x") } catch (e) { return "caught " + e } }`:
///
/// ```
/// use async_runtime::{run_async, EventLoop, Promise, Resume, Step};
/// use core_types::Value;
///
/// let event_loop = EventLoop::new();
/// let el = event_loop.clone();
/// let promise = run_async(&event_loop, move |input| match input {
///     Resume::Start => Step::Await(Promise::reject(&el, Value::from("x")).into()),
///     Resume::Rejected(e) => Step::Return(Value::from(format!("caught {}", e))),
///     Resume::Fulfilled(v) => Step::Return(v),
/// });
///
/// event_loop.run_microtasks();
/// assert_eq!(promise.result(), Some(Value::from("caught x")));
/// ```
pub trait AsyncBody {
    /// Runs the body until its next `await`, `return` or `throw`.
    fn resume(&mut self, input: Resume) -> Step;
}

impl<F> AsyncBody for F
where
    F: FnMut(Resume) -> Step,
{
    fn resume(&mut self, input: Resume) -> Step {
        self(input)
    }
}

/// Lifecycle of one async activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// Executing a step
    Running,
    /// Waiting on a promise
    Suspended,
    /// Returned; the call's promise is fulfilled or following the value
    Returned,
    /// Threw; the call's promise is rejected
    Threw,
}

struct AsyncFrame {
    body: RefCell<Option<Box<dyn AsyncBody>>>,
    state: Cell<FrameState>,
    resolver: Resolver,
    awaiting: RefCell<Option<Promise>>,
}

impl AsyncFrame {
    fn step(self: &Rc<Self>, input: Resume) {
        let taken = self.body.borrow_mut().take();
        let Some(mut body) = taken else { return };
        self.awaiting.borrow_mut().take();
        self.state.set(FrameState::Running);

        match body.resume(input) {
            Step::Await(value) => {
                *self.body.borrow_mut() = Some(body);
                self.state.set(FrameState::Suspended);
                let event_loop = self.resolver.promise().event_loop().clone();
                let awaited = Promise::resolve(&event_loop, value);
                trace!(call = self.resolver.promise().id(), awaiting = awaited.id(), "async frame suspended");
                *self.awaiting.borrow_mut() = Some(awaited.clone());
                let on_value = self.clone();
                let on_reason = self.clone();
                awaited.react(PromiseReaction::detached(
                    Box::new(move |value| {
                        on_value.step(Resume::Fulfilled(value));
                        Ok(Value::Undefined)
                    }),
                    Box::new(move |reason| {
                        on_reason.step(Resume::Rejected(reason));
                        Ok(Value::Undefined)
                    }),
                ));
            }
            Step::Return(value) => {
                self.state.set(FrameState::Returned);
                self.resolver.resolve(value);
            }
            Step::Throw(reason) => {
                self.state.set(FrameState::Threw);
                self.resolver.reject(reason);
            }
        }
    }
}

/// A running async function call.
pub struct AsyncCall {
    promise: Promise,
    frame: Rc<AsyncFrame>,
}

impl AsyncCall {
    /// Calls `body`: runs it up to its first suspension point.
    pub fn start<B>(event_loop: &EventLoop, body: B) -> Self
    where
        B: AsyncBody + 'static,
    {
        let (promise, resolver) = Promise::with_resolvers(event_loop);
        let frame = Rc::new(AsyncFrame {
            body: RefCell::new(Some(Box::new(body))),
            state: Cell::new(FrameState::Running),
            resolver,
            awaiting: RefCell::new(None),
        });
        frame.step(Resume::Start);
        Self { promise, frame }
    }

    /// Current activation state.
    pub fn state(&self) -> FrameState {
        self.frame.state.get()
    }

    /// The promise the call returned.
    pub fn promise(&self) -> &Promise {
        &self.promise
    }

    /// The promise the frame is suspended on, if any.
    pub fn awaiting(&self) -> Option<Promise> {
        self.frame.awaiting.borrow().clone()
    }

    /// Consumes the call, keeping only its promise.
    pub fn into_promise(self) -> Promise {
        self.promise
    }
}

impl fmt::Debug for AsyncCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncCall")
            .field("promise", &self.promise.id())
            .field("state", &self.state())
            .finish()
    }
}

/// Calls an async body and returns its promise.
pub fn run_async<B>(event_loop: &EventLoop, body: B) -> Promise
where
    B: AsyncBody + 'static,
{
    AsyncCall::start(event_loop, body).into_promise()
}

enum AwaitSlot {
    Empty,
    Requested(Value),
    Ready(Result<Value, Value>),
}

/// Handle given to a [`spawn_async`] body for awaiting values.
#[derive(Clone)]
pub struct AsyncScope {
    event_loop: EventLoop,
    slot: Rc<RefCell<AwaitSlot>>,
}

impl AsyncScope {
    /// The loop the body runs on.
    pub fn event_loop(&self) -> &EventLoop {
        &self.event_loop
    }

    /// `await value`. Resolves to the fulfillment value, or to the rejection
    /// reason as a [`JsError`] so that `?` rethrows it unchanged.
    pub fn await_value(&self, value: impl Into<Value>) -> AwaitValue {
        AwaitValue {
            slot: self.slot.clone(),
            value: Some(value.into()),
        }
    }
}

impl fmt::Debug for AsyncScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncScope").finish_non_exhaustive()
    }
}

/// Future returned by [`AsyncScope::await_value`].
pub struct AwaitValue {
    slot: Rc<RefCell<AwaitSlot>>,
    value: Option<Value>,
}

impl Future for AwaitValue {
    type Output = Result<Value, JsError>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if let Some(value) = this.value.take() {
            *this.slot.borrow_mut() = AwaitSlot::Requested(value);
            return Poll::Pending;
        }
        let slot = std::mem::replace(&mut *this.slot.borrow_mut(), AwaitSlot::Empty);
        match slot {
            AwaitSlot::Ready(Ok(value)) => Poll::Ready(Ok(value)),
            AwaitSlot::Ready(Err(reason)) => Poll::Ready(Err(JsError::from_value(reason))),
            other => {
                *this.slot.borrow_mut() = other;
                Poll::Pending
            }
        }
    }
}

type BoxedBody = Pin<Box<dyn Future<Output = Result<Value, JsError>>>>;

/// Drives a Rust future as an [`AsyncBody`].
struct FutureBody {
    future: BoxedBody,
    slot: Rc<RefCell<AwaitSlot>>,
}

impl AsyncBody for FutureBody {
    fn resume(&mut self, input: Resume) -> Step {
        match input {
            Resume::Start => {}
            Resume::Fulfilled(value) => *self.slot.borrow_mut() = AwaitSlot::Ready(Ok(value)),
            Resume::Rejected(reason) => *self.slot.borrow_mut() = AwaitSlot::Ready(Err(reason)),
        }
        let mut cx = Context::from_waker(futures::task::noop_waker_ref());
        match self.future.as_mut().poll(&mut cx) {
            Poll::Ready(Ok(value)) => Step::Return(value),
            Poll::Ready(Err(error)) => Step::Throw(error.into_value()),
            Poll::Pending => {
                let slot = std::mem::replace(&mut *self.slot.borrow_mut(), AwaitSlot::Empty);
                match slot {
                    AwaitSlot::Requested(value) => Step::Await(value),
                    _ => Step::Throw(
                        JsError::new(
                            ErrorKind::InternalError,
                            "async body suspended on a future that is not an await",
                        )
                        .into_value(),
                    ),
                }
            }
        }
    }
}

/// Calls a Rust `async` body as a JavaScript async function.
///
/// Code before the first `await_value(..).await` runs synchronously. Only
/// futures produced by the given [`AsyncScope`] may suspend the body; any
/// other pending future rejects the call with an `InternalError`.
///
/// # Examples
///
/// ```
/// use async_runtime::{spawn_async, EventLoop};
/// use core_types::Value;
///
/// let event_loop = EventLoop::new();
/// let promise = spawn_async(&event_loop, |scope| async move {
///     let slept = scope.event_loop().sleep(100);
///     scope.await_value(slept).await?;
///     let n = scope.await_value(Value::Smi(41)).await?;
///     match n {
///         Value::Smi(n) => Ok(Value::Smi(n + 1)),
///         other => Ok(other),
///     }
/// });
///
/// event_loop.advance_by(100).unwrap();
/// assert_eq!(promise.result(), Some(Value::Smi(42)));
/// ```
pub fn spawn_async<F, Fut>(event_loop: &EventLoop, body: F) -> Promise
where
    F: FnOnce(AsyncScope) -> Fut,
    Fut: Future<Output = Result<Value, JsError>> + 'static,
{
    let slot = Rc::new(RefCell::new(AwaitSlot::Empty));
    let scope = AsyncScope {
        event_loop: event_loop.clone(),
        slot: slot.clone(),
    };
    let future: BoxedBody = Box::pin(body(scope));
    run_async(event_loop, FutureBody { future, slot })
}
