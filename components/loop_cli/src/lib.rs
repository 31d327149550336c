//! Scenario runner for the deterministic event loop.
//!
//! Provides the `loopsim` argument parser, the scenario catalogue and the
//! runner that executes scenarios and reports the observed order.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cli;
pub mod error;
pub mod runner;
pub mod scenarios;
pub mod trace;

pub use cli::{run, Cli};
pub use error::{CliError, CliResult};
pub use runner::{Runner, ScenarioReport};
pub use scenarios::{find, Recorder, Scenario, SCENARIOS};
