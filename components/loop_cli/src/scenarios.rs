//! Catalogue of ordering scenarios.
//!
//! Each scenario is a small program written against the event loop API. It
//! records what happens through a [`Recorder`]; the runner then flushes
//! remaining timers and reports the recorded order.

use async_runtime::{spawn_async, EventLoop, Promise, SchedulerResult, TimerHandle};
use core_types::{JsError, Value};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Shared, append-only log of observed events.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    entries: Rc<RefCell<Vec<String>>>,
}

impl Recorder {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one entry.
    pub fn log(&self, entry: impl Into<String>) {
        self.entries.borrow_mut().push(entry.into());
    }

    /// A callback that logs `entry` when run.
    pub fn logger(&self, entry: impl Into<String>) -> impl FnOnce() -> Result<(), JsError> + 'static {
        let recorder = self.clone();
        let entry = entry.into();
        move || {
            recorder.log(entry);
            Ok(())
        }
    }

    /// Everything logged so far.
    pub fn entries(&self) -> Vec<String> {
        self.entries.borrow().clone()
    }
}

/// A named ordering lesson.
pub struct Scenario {
    /// Name used on the command line
    pub name: &'static str,
    /// One-line summary
    pub description: &'static str,
    /// Sets up and drives the program
    pub run: fn(&EventLoop, &Recorder) -> SchedulerResult<()>,
}

impl std::fmt::Debug for Scenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scenario").field("name", &self.name).finish()
    }
}

/// Every scenario, in presentation order.
pub const SCENARIOS: &[Scenario] = &[
    Scenario {
        name: "sync-vs-timeout",
        description: "Synchronous code finishes before a zero-delay timeout",
        run: sync_vs_timeout,
    },
    Scenario {
        name: "promise-vs-timeout",
        description: "Promise reactions run before timers",
        run: promise_vs_timeout,
    },
    Scenario {
        name: "interval-clear",
        description: "An interval clears itself on its fifth tick",
        run: interval_clear,
    },
    Scenario {
        name: "async-try-catch",
        description: "try/catch around a rejected await fulfills the async function",
        run: async_try_catch,
    },
    Scenario {
        name: "nested-microtasks",
        description: "Microtasks queued by microtasks still run before the next timer",
        run: nested_microtasks,
    },
    Scenario {
        name: "await-ordering",
        description: "Where await continuations land among other microtasks",
        run: await_ordering,
    },
    Scenario {
        name: "chained-polling",
        description: "Chained timeouts poll without overlapping, unlike setInterval",
        run: chained_polling,
    },
    Scenario {
        name: "race-timeout",
        description: "Promise.race against a timer-backed rejection",
        run: race_timeout,
    },
    Scenario {
        name: "combinators",
        description: "Promise.all, allSettled, race and any on the same inputs",
        run: combinators,
    },
    Scenario {
        name: "unhandled-rejection",
        description: "A rejection nobody handles is reported and the loop keeps going",
        run: unhandled_rejection,
    },
];

/// Looks up a scenario by name.
pub fn find(name: &str) -> Option<&'static Scenario> {
    SCENARIOS.iter().find(|s| s.name == name)
}

fn sync_vs_timeout(el: &EventLoop, rec: &Recorder) -> SchedulerResult<()> {
    el.run_script(|| {
        rec.log("A");
        el.set_timeout(rec.logger("B"), 0);
        rec.log("C");
        Ok(Value::Undefined)
    })?;
    el.advance_by(0)?;
    Ok(())
}

fn promise_vs_timeout(el: &EventLoop, rec: &Recorder) -> SchedulerResult<()> {
    el.run_script(|| {
        rec.log("1");
        let r = rec.clone();
        Promise::resolve(el, Value::Undefined).then(move |v| {
            r.log("2");
            Ok(v)
        });
        el.set_timeout(rec.logger("3"), 0);
        rec.log("4");
        Ok(Value::Undefined)
    })?;
    el.advance_by(0)?;
    Ok(())
}

fn interval_clear(el: &EventLoop, rec: &Recorder) -> SchedulerResult<()> {
    let ticks = Rc::new(Cell::new(0));
    let handle: Rc<Cell<Option<TimerHandle>>> = Rc::new(Cell::new(None));
    let (r, h, inner) = (rec.clone(), handle.clone(), el.clone());
    let id = el.set_interval(
        move || {
            ticks.set(ticks.get() + 1);
            r.log(format!("tick {} at {}ms", ticks.get(), inner.now()));
            if ticks.get() == 5 {
                if let Some(handle) = h.get() {
                    inner.clear_interval(handle);
                    r.log("cleared");
                }
            }
            Ok(())
        },
        1000,
    );
    handle.set(Some(id));
    el.advance_by(5000)?;
    rec.log(format!("after first 5000ms: {} timers pending", el.pending_timer_count()));
    el.advance_by(5000)?;
    rec.log(format!("after next 5000ms: now {}ms", el.now()));
    Ok(())
}

fn async_try_catch(el: &EventLoop, rec: &Recorder) -> SchedulerResult<()> {
    let (r, inner) = (rec.clone(), el.clone());
    let call = spawn_async(el, move |scope| async move {
        r.log("try");
        let failing = Promise::reject(&inner, JsError::type_error("network down").into_value());
        match scope.await_value(failing).await {
            Ok(value) => Ok(value),
            Err(error) => {
                r.log(format!("catch: {}", error));
                Ok(Value::from("fallback"))
            }
        }
    });
    let r = rec.clone();
    call.then_with(
        move |value| {
            r.log(format!("fulfilled with {}", value));
            Ok(Value::Undefined)
        },
        |reason| Err(JsError::from_value(reason)),
    );
    el.run_microtasks();
    Ok(())
}

fn nested_microtasks(el: &EventLoop, rec: &Recorder) -> SchedulerResult<()> {
    el.run_script(|| {
        rec.log("script");
        el.set_timeout(rec.logger("timeout"), 0);
        let (r, inner) = (rec.clone(), el.clone());
        el.queue_microtask(move || {
            r.log("microtask 1");
            let r2 = r.clone();
            inner.queue_microtask(move || {
                r2.log("microtask 2 (queued by 1)");
                Ok(())
            });
            Ok(())
        });
        let r = rec.clone();
        Promise::resolve(el, Value::Undefined)
            .then(move |v| {
                r.log("then 1");
                Ok(v)
            })
            .then({
                let r = rec.clone();
                move |v| {
                    r.log("then 2");
                    Ok(v)
                }
            });
        Ok(Value::Undefined)
    })?;
    el.advance_by(0)?;
    Ok(())
}

fn await_ordering(el: &EventLoop, rec: &Recorder) -> SchedulerResult<()> {
    el.run_script(|| {
        rec.log("script start");
        el.set_timeout(rec.logger("setTimeout"), 0);

        let (r, inner) = (rec.clone(), el.clone());
        spawn_async(el, move |scope| async move {
            r.log("async1 start");
            let r2 = r.clone();
            let async2 = spawn_async(&inner, move |_| async move {
                r2.log("async2");
                Ok(Value::Undefined)
            });
            scope.await_value(async2).await?;
            r.log("async1 end");
            Ok(Value::Undefined)
        });

        let r = rec.clone();
        Promise::new(el, |resolver| {
            r.log("promise1");
            resolver.resolve(Value::Undefined);
            Ok(())
        })
        .then(move |v| {
            r.log("promise2");
            Ok(v)
        });
        rec.log("script end");
        Ok(Value::Undefined)
    })?;
    el.run_all_pending()?;
    Ok(())
}

fn poll_once(el: &EventLoop, rec: &Recorder, remaining: u32) {
    let (inner, r) = (el.clone(), rec.clone());
    el.set_timeout(
        move || {
            let (r2, el2) = (r.clone(), inner.clone());
            let done = spawn_async(&inner, move |scope| async move {
                r2.log(format!("poll start at {}ms", el2.now()));
                scope.await_value(el2.sleep(150)).await?;
                r2.log(format!("poll end at {}ms", el2.now()));
                Ok(Value::Undefined)
            });
            done.then(move |v| {
                if remaining > 1 {
                    poll_once(&inner, &r, remaining - 1);
                }
                Ok(v)
            });
            Ok(())
        },
        100,
    );
}

fn chained_polling(el: &EventLoop, rec: &Recorder) -> SchedulerResult<()> {
    poll_once(el, rec, 3);
    el.run_all_pending()?;
    Ok(())
}

fn race_timeout(el: &EventLoop, rec: &Recorder) -> SchedulerResult<()> {
    for (label, work_ms) in [("fast", 50), ("slow", 500)] {
        let work = el.sleep(work_ms).then(move |_| Ok(Value::from(format!("{} response", label))));
        let (ok, err) = (rec.clone(), rec.clone());
        work.timeout(200).then_with(
            move |value| {
                ok.log(format!("{}: {}", label, value));
                Ok(Value::Undefined)
            },
            move |reason| {
                err.log(format!("{}: {}", label, reason));
                Ok(Value::Undefined)
            },
        );
    }
    el.run_all_pending()?;
    Ok(())
}

fn combinators(el: &EventLoop, rec: &Recorder) -> SchedulerResult<()> {
    let inputs = || {
        vec![
            el.sleep(30).then(|_| Ok(Value::from("a"))).into_value(),
            el.sleep(10).then(|_| Err(JsError::from_value(Value::from("b failed")))).into_value(),
            Value::from("c"),
        ]
    };
    let report = |name: &'static str, promise: Promise| {
        let (ok, err) = (rec.clone(), rec.clone());
        promise.then_with(
            move |value| {
                ok.log(format!("{} fulfilled: {:?}", name, value));
                Ok(Value::Undefined)
            },
            move |reason| {
                err.log(format!("{} rejected: {}", name, reason));
                Ok(Value::Undefined)
            },
        );
    };
    report("all", Promise::all(el, inputs()));
    report("allSettled", Promise::all_settled(el, inputs()));
    report("race", Promise::race(el, inputs()));
    report("any", Promise::any(el, inputs()));
    el.run_all_pending()?;
    Ok(())
}

fn unhandled_rejection(el: &EventLoop, rec: &Recorder) -> SchedulerResult<()> {
    el.run_script(|| {
        rec.log("rejecting without a handler");
        Promise::reject(el, JsError::type_error("nobody listens").into_value());
        el.set_timeout(rec.logger("timer still runs"), 10);
        Ok(Value::Undefined)
    })?;
    el.run_all_pending()?;
    Ok(())
}
