//! Scenario execution and reporting.

use crate::error::CliResult;
use crate::scenarios::{Recorder, Scenario};
use async_runtime::{EventLoop, LogicalTime, RecordingSink, SchedulerConfig};
use serde::Serialize;
use std::fmt::Write as _;
use tracing::debug;

/// What one scenario run observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioReport {
    /// Scenario name
    pub name: String,
    /// Scenario summary
    pub description: String,
    /// Recorded events, in execution order
    pub order: Vec<String>,
    /// Logical time when the run ended
    pub final_time_ms: LogicalTime,
    /// Timer callbacks invoked
    pub timers_fired: u64,
    /// Microtasks executed
    pub microtasks_run: u64,
    /// Asynchronous failures reported by the loop
    pub errors: Vec<String>,
}

impl ScenarioReport {
    /// Human-readable rendering.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "== {}: {}", self.name, self.description);
        for (i, entry) in self.order.iter().enumerate() {
            let _ = writeln!(out, "  {:>2}. {}", i + 1, entry);
        }
        let _ = writeln!(
            out,
            "  final time: {}ms, timers fired: {}, microtasks run: {}",
            self.final_time_ms, self.timers_fired, self.microtasks_run
        );
        for error in &self.errors {
            let _ = writeln!(out, "  reported: {}", error);
        }
        out
    }
}

/// Runs scenarios, each on a fresh event loop.
#[derive(Debug, Clone, Default)]
pub struct Runner {
    config: SchedulerConfig,
}

impl Runner {
    /// Creates a runner whose loops use `config`.
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config }
    }

    /// Runs one scenario, then fires any timers it left behind.
    pub fn run(&self, scenario: &Scenario) -> CliResult<ScenarioReport> {
        debug!(scenario = scenario.name, "running scenario");
        let sink = RecordingSink::new();
        let event_loop = EventLoop::with_config(self.config.clone()).with_error_sink(sink.clone());
        let recorder = Recorder::new();

        (scenario.run)(&event_loop, &recorder)?;
        event_loop.run_all_pending()?;

        let stats = event_loop.stats();
        Ok(ScenarioReport {
            name: scenario.name.to_string(),
            description: scenario.description.to_string(),
            order: recorder.entries(),
            final_time_ms: event_loop.now(),
            timers_fired: stats.timers_fired,
            microtasks_run: stats.microtasks_run,
            errors: sink.take().iter().map(ToString::to_string).collect(),
        })
    }
}
