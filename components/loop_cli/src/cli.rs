//! Command-line arguments and dispatch.

use crate::error::{CliError, CliResult};
use crate::runner::{Runner, ScenarioReport};
use crate::scenarios::{self, SCENARIOS};
use async_runtime::SchedulerConfig;
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;

/// Deterministic event loop scenario runner
#[derive(Parser, Debug)]
#[command(name = "loopsim")]
#[command(version = "0.1.0")]
#[command(about = "Runs event loop ordering scenarios on a logical clock", long_about = None)]
pub struct Cli {
    /// Scenario to run
    #[arg(short, long, conflicts_with = "all")]
    pub scenario: Option<String>,

    /// List available scenarios
    #[arg(short, long)]
    pub list: bool,

    /// Run every scenario
    #[arg(short, long)]
    pub all: bool,

    /// Print reports as JSON
    #[arg(short, long)]
    pub json: bool,

    /// Scheduler configuration file (JSON)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log every scheduling event to stderr
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Loads the scheduler configuration, or the default when none is given.
    pub fn scheduler_config(&self) -> CliResult<SchedulerConfig> {
        match &self.config {
            Some(path) => Ok(SchedulerConfig::from_path(path)?),
            None => Ok(SchedulerConfig::default()),
        }
    }
}

/// Executes the parsed command, writing results to `out`.
pub fn run(cli: &Cli, out: &mut impl Write) -> CliResult<()> {
    if cli.list {
        for scenario in SCENARIOS {
            writeln!(out, "{:<22} {}", scenario.name, scenario.description)?;
        }
        return Ok(());
    }

    let selected = if cli.all {
        SCENARIOS.iter().collect::<Vec<_>>()
    } else if let Some(name) = &cli.scenario {
        let scenario = scenarios::find(name).ok_or_else(|| CliError::UnknownScenario(name.clone()))?;
        vec![scenario]
    } else {
        writeln!(out, "loopsim v0.1.0")?;
        writeln!(out)?;
        writeln!(out, "Usage:")?;
        writeln!(out, "  loopsim --list               List scenarios")?;
        writeln!(out, "  loopsim --scenario <NAME>    Run one scenario")?;
        writeln!(out, "  loopsim --all                Run every scenario")?;
        writeln!(out)?;
        writeln!(out, "Run 'loopsim --help' for more options.")?;
        return Ok(());
    };

    let runner = Runner::new(cli.scheduler_config()?);
    let reports = selected
        .into_iter()
        .map(|scenario| runner.run(scenario))
        .collect::<CliResult<Vec<ScenarioReport>>>()?;

    if cli.json {
        if let [report] = reports.as_slice() {
            serde_json::to_writer_pretty(&mut *out, report)?;
        } else {
            serde_json::to_writer_pretty(&mut *out, &reports)?;
        }
        writeln!(out)?;
    } else {
        for report in &reports {
            write!(out, "{}", report.render())?;
        }
    }
    Ok(())
}
