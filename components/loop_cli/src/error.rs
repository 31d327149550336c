//! Error types for the CLI

use async_runtime::{ConfigError, SchedulerError};

/// CLI-specific errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// No scenario has the requested name
    #[error("unknown scenario '{0}' (run with --list to see available scenarios)")]
    UnknownScenario(String),

    /// The configuration file could not be loaded
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The event loop driver failed
    #[error("scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// Report serialization failed
    #[error("failed to encode report: {0}")]
    Json(#[from] serde_json::Error),

    /// Writing output failed
    #[error("output error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;
