//! Contract tests for async_runtime
//!
//! These tests pin down the ordering guarantees the runtime promises to its
//! callers: the observable order of synchronous code, microtasks, timers and
//! async continuations.

use async_runtime::{
    spawn_async, EventLoop, Promise, PromiseState, RecordingSink, Resolver, TimerHandle,
};
use core_types::{JsError, Value};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

type Log = Rc<RefCell<Vec<Value>>>;

fn log() -> Log {
    Rc::new(RefCell::new(Vec::new()))
}

fn push(log: &Log, value: impl Into<Value>) {
    log.borrow_mut().push(value.into());
}

fn values(log: &Log) -> Vec<Value> {
    log.borrow().clone()
}

mod ordering_contract {
    use super::*;

    #[test]
    fn sync_code_runs_before_zero_delay_timeout() {
        let event_loop = EventLoop::new();
        let order = log();
        push(&order, "A");
        let o = order.clone();
        event_loop.set_timeout(
            move || {
                push(&o, "B");
                Ok(())
            },
            0,
        );
        push(&order, "C");
        event_loop.advance_by(0).unwrap();
        assert_eq!(values(&order), vec![Value::from("A"), Value::from("C"), Value::from("B")]);
    }

    #[test]
    fn promise_reaction_runs_before_timeout() {
        let event_loop = EventLoop::new();
        let order = log();
        push(&order, 1);
        let o = order.clone();
        Promise::resolve(&event_loop, Value::Undefined).then(move |v| {
            push(&o, 2);
            Ok(v)
        });
        let o = order.clone();
        event_loop.set_timeout(
            move || {
                push(&o, 3);
                Ok(())
            },
            0,
        );
        push(&order, 4);
        event_loop.run_microtasks();
        event_loop.advance_by(0).unwrap();
        assert_eq!(
            values(&order),
            vec![Value::Smi(1), Value::Smi(4), Value::Smi(2), Value::Smi(3)]
        );
    }

    #[test]
    fn interval_cleared_on_fifth_tick() {
        let event_loop = EventLoop::new();
        let count = Rc::new(Cell::new(0));
        let handle: Rc<Cell<Option<TimerHandle>>> = Rc::new(Cell::new(None));
        let c = count.clone();
        let h = handle.clone();
        let el = event_loop.clone();
        let id = event_loop.set_interval(
            move || {
                c.set(c.get() + 1);
                if c.get() == 5 {
                    if let Some(handle) = h.get() {
                        el.clear_interval(handle);
                    }
                }
                Ok(())
            },
            1000,
        );
        handle.set(Some(id));

        event_loop.advance_by(5000).unwrap();
        assert_eq!(count.get(), 5);
        event_loop.advance_by(5000).unwrap();
        assert_eq!(count.get(), 5);
        assert_eq!(event_loop.pending_timer_count(), 0);
    }

    #[test]
    fn async_try_catch_fulfills_with_catch_value() {
        let event_loop = EventLoop::new();
        let el = event_loop.clone();
        let promise = spawn_async(&event_loop, move |scope| async move {
            match scope.await_value(Promise::reject(&el, Value::from("fail"))).await {
                Ok(_) => Ok(Value::from("unexpected")),
                Err(_) => Ok(Value::from("from catch")),
            }
        });
        event_loop.run_microtasks();
        assert_eq!(promise.state(), PromiseState::Fulfilled);
        assert_eq!(promise.result(), Some(Value::from("from catch")));
    }

    #[test]
    fn microtask_queued_by_microtask_runs_before_timer() {
        let event_loop = EventLoop::new();
        let order = log();
        let o = order.clone();
        event_loop.set_timeout(
            move || {
                push(&o, "timeout");
                Ok(())
            },
            0,
        );
        let o = order.clone();
        let el = event_loop.clone();
        event_loop.queue_microtask(move || {
            push(&o, "micro 1");
            let o = o.clone();
            el.queue_microtask(move || {
                push(&o, "micro 2");
                Ok(())
            });
            Ok(())
        });
        event_loop.advance_by(0).unwrap();
        assert_eq!(
            values(&order),
            vec![Value::from("micro 1"), Value::from("micro 2"), Value::from("timeout")]
        );
    }

    #[test]
    fn smaller_timer_does_not_jump_pending_microtasks() {
        let event_loop = EventLoop::new();
        let order = log();
        let o = order.clone();
        let el = event_loop.clone();
        event_loop.set_timeout(
            move || {
                push(&o, "t10");
                let o2 = o.clone();
                el.set_timeout(
                    move || {
                        push(&o2, "t0-from-t10");
                        Ok(())
                    },
                    0,
                );
                let o3 = o.clone();
                el.queue_microtask(move || {
                    push(&o3, "micro-from-t10");
                    Ok(())
                });
                Ok(())
            },
            10,
        );
        let o = order.clone();
        event_loop.set_timeout(
            move || {
                push(&o, "t10b");
                Ok(())
            },
            10,
        );
        event_loop.advance_by(10).unwrap();
        assert_eq!(
            values(&order),
            vec![
                Value::from("t10"),
                Value::from("micro-from-t10"),
                Value::from("t10b"),
                Value::from("t0-from-t10"),
            ]
        );
    }
}

mod promise_contract {
    use super::*;

    #[test]
    fn settling_twice_has_no_effect() {
        let event_loop = EventLoop::new();
        let order = log();
        let (promise, resolver) = Promise::with_resolvers(&event_loop);
        let o = order.clone();
        promise.then(move |v| {
            push(&o, v.clone());
            Ok(v)
        });
        resolver.resolve(Value::Smi(1));
        resolver.resolve(Value::Smi(2));
        resolver.reject(Value::Smi(3));
        event_loop.run_microtasks();
        assert_eq!(values(&order), vec![Value::Smi(1)]);
        assert_eq!(promise.result(), Some(Value::Smi(1)));
    }

    #[test]
    fn executor_resolvers_share_one_flag() {
        let event_loop = EventLoop::new();
        let saved: Rc<RefCell<Option<Resolver>>> = Rc::new(RefCell::new(None));
        let s = saved.clone();
        let promise = Promise::new(&event_loop, move |resolver| {
            resolver.resolve(Value::from("first"));
            *s.borrow_mut() = Some(resolver);
            Err(JsError::type_error("ignored after resolve"))
        });
        if let Some(resolver) = saved.borrow().as_ref() {
            resolver.reject(Value::from("late"));
        }
        assert_eq!(promise.result(), Some(Value::from("first")));
    }

    #[test]
    fn all_preserves_input_order() {
        let event_loop = EventLoop::new();
        let inputs: Vec<Value> = [30, 10, 20]
            .into_iter()
            .map(|ms| {
                event_loop
                    .sleep(ms)
                    .then(move |_| Ok(Value::Smi(ms as i32)))
                    .into_value()
            })
            .collect();
        let all = Promise::all(&event_loop, inputs);
        event_loop.run_all_pending().unwrap();
        assert_eq!(
            all.result(),
            Some(Value::Array(vec![Value::Smi(30), Value::Smi(10), Value::Smi(20)]))
        );
    }

    #[test]
    fn race_with_timer_backed_rejection() {
        let event_loop = EventLoop::new();
        let el = event_loop.clone();
        let deadline = Promise::new(&event_loop, move |resolver| {
            el.set_timeout(
                move || {
                    resolver.reject(JsError::new(core_types::ErrorKind::TimeoutError, "too slow").into_value());
                    Ok(())
                },
                100,
            );
            Ok(())
        });
        let work = event_loop.sleep(500).then(|_| Ok(Value::from("work")));
        let race = Promise::race(&event_loop, [work.into(), deadline.into()]);
        race.catch(|_| Ok(Value::Undefined));
        event_loop.advance_by(100).unwrap();
        assert_eq!(race.state(), PromiseState::Rejected);
    }

    #[test]
    fn unhandled_rejection_never_halts_the_loop() {
        let sink = RecordingSink::new();
        let event_loop = EventLoop::new().with_error_sink(sink.clone());
        let ran = Rc::new(Cell::new(false));
        let r = ran.clone();
        Promise::reject(&event_loop, Value::from("swallowed"));
        event_loop.set_timeout(
            move || {
                r.set(true);
                Ok(())
            },
            1,
        );
        event_loop.run_all_pending().unwrap();
        assert!(ran.get());
        assert_eq!(sink.len(), 1);
    }
}

mod async_contract {
    use super::*;

    #[test]
    fn async_function_exception_becomes_rejection() {
        let event_loop = EventLoop::new();
        let promise = spawn_async(&event_loop, |_| async { Err(JsError::type_error("inside")) });
        promise.catch(|_| Ok(Value::Undefined));
        assert_eq!(promise.state(), PromiseState::Rejected);
    }

    #[test]
    fn chained_timeout_polling_never_overlaps() {
        let event_loop = EventLoop::new();
        let active = Rc::new(Cell::new(0));
        let max_active = Rc::new(Cell::new(0));
        let polls = Rc::new(Cell::new(0));

        fn poll(event_loop: &EventLoop, active: Rc<Cell<i32>>, max_active: Rc<Cell<i32>>, polls: Rc<Cell<i32>>) {
            let el = event_loop.clone();
            event_loop.set_timeout(
                move || {
                    let el2 = el.clone();
                    let (a, m, p) = (active.clone(), max_active.clone(), polls.clone());
                    let done = spawn_async(&el, move |scope| async move {
                        a.set(a.get() + 1);
                        m.set(m.get().max(a.get()));
                        scope.await_value(el2.sleep(150)).await?;
                        a.set(a.get() - 1);
                        p.set(p.get() + 1);
                        Ok(Value::Undefined)
                    });
                    let el3 = el.clone();
                    done.then(move |v| {
                        if polls.get() < 4 {
                            poll(&el3, active, max_active, polls);
                        }
                        Ok(v)
                    });
                    Ok(())
                },
                100,
            );
        }

        poll(&event_loop, active.clone(), max_active.clone(), polls.clone());
        event_loop.run_all_pending().unwrap();
        assert_eq!(polls.get(), 4);
        assert_eq!(max_active.get(), 1);
        assert_eq!(event_loop.now(), 4 * 250);
    }

    #[test]
    fn interval_polling_with_async_body_overlaps() {
        let event_loop = EventLoop::new();
        let active = Rc::new(Cell::new(0));
        let max_active = Rc::new(Cell::new(0));
        let el = event_loop.clone();
        let (a, m) = (active.clone(), max_active.clone());
        event_loop.set_interval(
            move || {
                let (a, m, el2) = (a.clone(), m.clone(), el.clone());
                spawn_async(&el, move |scope| async move {
                    a.set(a.get() + 1);
                    m.set(m.get().max(a.get()));
                    scope.await_value(el2.sleep(150)).await?;
                    a.set(a.get() - 1);
                    Ok(Value::Undefined)
                });
                Ok(())
            },
            100,
        );
        event_loop.advance_by(400).unwrap();
        assert!(max_active.get() > 1);
    }
}
