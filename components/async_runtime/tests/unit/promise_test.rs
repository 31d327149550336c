//! Unit tests for Promise

use async_runtime::{
    ErrorReport, EventLoop, Promise, PromiseState, RecordingSink, SchedulerConfig, Thenable,
};
use core_types::{ErrorKind, JsError, Value};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

fn recorder() -> (Rc<RefCell<Vec<Value>>>, impl Fn() -> Box<dyn FnOnce(Value) -> Result<Value, JsError>>) {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let s = seen.clone();
    let make = move || {
        let s = s.clone();
        Box::new(move |v: Value| {
            s.borrow_mut().push(v.clone());
            Ok(v)
        }) as Box<dyn FnOnce(Value) -> Result<Value, JsError>>
    };
    (seen, make)
}

#[test]
fn then_on_settled_promise_is_still_async() {
    let event_loop = EventLoop::new();
    let (seen, record) = recorder();
    Promise::resolve(&event_loop, Value::Smi(1)).then(record());
    assert!(seen.borrow().is_empty());
    event_loop.run_microtasks();
    assert_eq!(*seen.borrow(), vec![Value::Smi(1)]);
}

#[test]
fn reactions_run_in_attachment_order() {
    let event_loop = EventLoop::new();
    let (promise, resolver) = Promise::with_resolvers(&event_loop);
    let order = Rc::new(RefCell::new(Vec::new()));
    for i in 0..3 {
        let o = order.clone();
        promise.then(move |v| {
            o.borrow_mut().push(i);
            Ok(v)
        });
    }
    resolver.resolve(Value::Null);
    event_loop.run_microtasks();
    assert_eq!(*order.borrow(), vec![0, 1, 2]);
}

#[test]
fn rejection_passes_through_then_to_catch() {
    let event_loop = EventLoop::new();
    let (seen, record) = recorder();
    let touched = Rc::new(Cell::new(false));
    let t = touched.clone();
    Promise::reject(&event_loop, Value::from("why"))
        .then(move |v| {
            t.set(true);
            Ok(v)
        })
        .catch(record());
    event_loop.run_microtasks();
    assert!(!touched.get());
    assert_eq!(*seen.borrow(), vec![Value::from("why")]);
}

#[test]
fn catch_recovers_the_chain() {
    let event_loop = EventLoop::new();
    let recovered = Promise::reject(&event_loop, Value::Smi(1))
        .catch(|_| Ok(Value::from("recovered")))
        .then(|v| Ok(Value::Array(vec![v])));
    event_loop.run_microtasks();
    assert_eq!(
        recovered.result(),
        Some(Value::Array(vec![Value::from("recovered")]))
    );
}

#[test]
fn rethrow_in_catch_propagates_new_error() {
    let event_loop = EventLoop::new();
    let outcome = Promise::reject(&event_loop, Value::Smi(1))
        .catch(|_| Err(JsError::type_error("second")))
        .catch(|reason| Ok(Value::from(JsError::from_value(reason).message)));
    event_loop.run_microtasks();
    assert_eq!(outcome.result(), Some(Value::from("second")));
}

#[test]
fn handler_returning_promise_is_flattened() {
    let event_loop = EventLoop::new();
    let el = event_loop.clone();
    let outcome = Promise::resolve(&event_loop, Value::Smi(1))
        .then(move |_| Ok(Promise::resolve(&el, Value::Smi(2)).into_value()));
    event_loop.run_microtasks();
    assert_eq!(outcome.result(), Some(Value::Smi(2)));
}

#[test]
fn resolving_with_pending_promise_waits_for_it() {
    let event_loop = EventLoop::new();
    let (inner, inner_resolver) = Promise::with_resolvers(&event_loop);
    let (outer, outer_resolver) = Promise::with_resolvers(&event_loop);
    outer_resolver.resolve(inner);
    event_loop.run_microtasks();
    assert_eq!(outer.state(), PromiseState::Pending);

    inner_resolver.resolve(Value::from("done"));
    event_loop.run_microtasks();
    assert_eq!(outer.result(), Some(Value::from("done")));
}

#[test]
fn thenable_is_assimilated_once() {
    let event_loop = EventLoop::new();
    let calls = Rc::new(Cell::new(0));
    let c = calls.clone();
    let thenable = Thenable::new(move |resolver| {
        c.set(c.get() + 1);
        resolver.resolve(Value::Smi(5));
        resolver.resolve(Value::Smi(6));
        Ok(())
    });
    let promise = Promise::resolve(&event_loop, thenable.into_value());
    event_loop.run_microtasks();
    assert_eq!(calls.get(), 1);
    assert_eq!(promise.result(), Some(Value::Smi(5)));
}

#[test]
fn throwing_thenable_rejects() {
    let event_loop = EventLoop::new();
    let thenable = Thenable::new(|_| Err(JsError::new(ErrorKind::RangeError, "nope")));
    let promise = Promise::resolve(&event_loop, thenable.into_value());
    promise.catch(|_| Ok(Value::Undefined));
    event_loop.run_microtasks();
    assert_eq!(promise.state(), PromiseState::Rejected);
    let error = promise.result().map(JsError::from_value);
    assert_eq!(error.map(|e| e.kind), Some(ErrorKind::RangeError));
}

#[test]
fn handler_returning_itself_rejects_with_type_error() {
    let event_loop = EventLoop::new();
    let slot: Rc<RefCell<Option<Promise>>> = Rc::new(RefCell::new(None));
    let s = slot.clone();
    let derived = Promise::resolve(&event_loop, Value::Undefined).then(move |_| {
        Ok(s.borrow().clone().map(Promise::into_value).unwrap_or(Value::Undefined))
    });
    *slot.borrow_mut() = Some(derived.clone());
    derived.catch(|_| Ok(Value::Undefined));
    event_loop.run_microtasks();
    let error = derived.result().map(JsError::from_value);
    assert_eq!(error.map(|e| e.kind), Some(ErrorKind::TypeError));
}

#[test]
fn finally_passes_value_through() {
    let event_loop = EventLoop::new();
    let ran = Rc::new(Cell::new(false));
    let r = ran.clone();
    let outcome = Promise::resolve(&event_loop, Value::Smi(3)).finally(move || {
        r.set(true);
        Ok(Value::from("ignored"))
    });
    event_loop.run_microtasks();
    assert!(ran.get());
    assert_eq!(outcome.result(), Some(Value::Smi(3)));
}

#[test]
fn finally_passes_rejection_through() {
    let event_loop = EventLoop::new();
    let outcome = Promise::reject(&event_loop, Value::from("original")).finally(|| Ok(Value::Undefined));
    outcome.catch(|_| Ok(Value::Undefined));
    event_loop.run_microtasks();
    assert_eq!(outcome.state(), PromiseState::Rejected);
    assert_eq!(outcome.result(), Some(Value::from("original")));
}

#[test]
fn throwing_finally_replaces_outcome() {
    let event_loop = EventLoop::new();
    let outcome = Promise::resolve(&event_loop, Value::Smi(3))
        .finally(|| Err(JsError::type_error("cleanup failed")));
    outcome.catch(|_| Ok(Value::Undefined));
    event_loop.run_microtasks();
    let error = outcome.result().map(JsError::from_value);
    assert_eq!(error.map(|e| e.message), Some("cleanup failed".to_string()));
}

#[test]
fn finally_waits_for_returned_promise() {
    let event_loop = EventLoop::new();
    let el = event_loop.clone();
    let outcome = Promise::resolve(&event_loop, Value::Smi(3)).finally(move || Ok(el.sleep(50).into_value()));
    event_loop.advance_by(49).unwrap();
    assert_eq!(outcome.state(), PromiseState::Pending);
    event_loop.advance_by(1).unwrap();
    assert_eq!(outcome.result(), Some(Value::Smi(3)));
}

#[test]
fn unhandled_rejection_is_reported_once() {
    let sink = RecordingSink::new();
    let event_loop = EventLoop::new().with_error_sink(sink.clone());
    let rejected = Promise::reject(&event_loop, Value::from("lost"));
    event_loop.run_microtasks();
    event_loop.run_microtasks();

    let reports = sink.take();
    assert_eq!(reports.len(), 1);
    assert_eq!(
        reports[0],
        ErrorReport::UnhandledRejection {
            promise_id: rejected.id(),
            reason: Value::from("lost"),
        }
    );
}

#[test]
fn handler_attached_before_checkpoint_suppresses_report() {
    let sink = RecordingSink::new();
    let event_loop = EventLoop::new().with_error_sink(sink.clone());
    let rejected = Promise::reject(&event_loop, Value::from("seen"));
    rejected.catch(|_| Ok(Value::Undefined));
    event_loop.run_microtasks();
    assert!(sink.is_empty());
}

#[test]
fn rejection_tracking_can_be_disabled() {
    let sink = RecordingSink::new();
    let config = SchedulerConfig::default().with_unhandled_rejection_tracking(false);
    let event_loop = EventLoop::with_config(config).with_error_sink(sink.clone());
    Promise::reject(&event_loop, Value::from("quiet"));
    event_loop.run_microtasks();
    assert!(sink.is_empty());
}

#[test]
fn all_settled_describes_each_outcome() {
    let event_loop = EventLoop::new();
    let settled = Promise::all_settled(
        &event_loop,
        [
            Promise::resolve(&event_loop, Value::Smi(1)).into(),
            Promise::reject(&event_loop, Value::from("no")).into(),
        ],
    );
    event_loop.run_microtasks();
    assert_eq!(
        settled.result(),
        Some(Value::Array(vec![
            Value::object([("status", Value::from("fulfilled")), ("value", Value::Smi(1))]),
            Value::object([("status", Value::from("rejected")), ("reason", Value::from("no"))]),
        ]))
    );
}

#[test]
fn race_settles_with_first() {
    let event_loop = EventLoop::new();
    let slow = event_loop.sleep(20).then(|_| Ok(Value::from("slow")));
    let fast = event_loop.sleep(10).then(|_| Err(JsError::type_error("fast")));
    let race = Promise::race(&event_loop, [slow.into(), fast.into()]);
    race.catch(|_| Ok(Value::Undefined));
    event_loop.run_all_pending().unwrap();
    let error = race.result().map(JsError::from_value);
    assert_eq!(error.map(|e| e.message), Some("fast".to_string()));
}

#[test]
fn any_takes_first_fulfillment() {
    let event_loop = EventLoop::new();
    let any = Promise::any(
        &event_loop,
        [
            Promise::reject(&event_loop, Value::Smi(1)).into(),
            event_loop.sleep(5).then(|_| Ok(Value::Smi(2))).into(),
        ],
    );
    event_loop.run_all_pending().unwrap();
    assert_eq!(any.result(), Some(Value::Smi(2)));
}

#[test]
fn any_aggregates_reasons_in_input_order() {
    let event_loop = EventLoop::new();
    let late = event_loop.sleep(10).then(|_| Err(JsError::from_value(Value::from("late"))));
    let early = Promise::reject(&event_loop, Value::from("early"));
    let any = Promise::any(&event_loop, [late.into(), early.into()]);
    any.catch(|_| Ok(Value::Undefined));
    event_loop.run_all_pending().unwrap();
    let error = any.result().map(JsError::from_value);
    let error = error.expect("settled");
    assert_eq!(error.kind, ErrorKind::AggregateError);
    assert_eq!(error.errors, vec![Value::from("late"), Value::from("early")]);
}

#[test]
fn timeout_rejects_when_too_slow() {
    let event_loop = EventLoop::new();
    let limited = event_loop.sleep(100).timeout(50);
    limited.catch(|_| Ok(Value::Undefined));
    event_loop.advance_by(50).unwrap();
    let error = limited.result().map(JsError::from_value);
    assert_eq!(error.map(|e| e.kind), Some(ErrorKind::TimeoutError));
}
