//! Event loop configuration.
//!
//! A [`SchedulerConfig`] is usually built in code, but can also be loaded
//! from JSON:
//!
//! ```json
//! {
//!   "start_time_ms": 0,
//!   "timer_limit": 1000,
//!   "clamp": { "policy": "nested", "threshold": 5, "minimum_ms": 4 },
//!   "track_unhandled_rejections": true
//! }
//! ```

use crate::clock::LogicalTime;
use crate::timer::TimerClamp;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default cap on timers fired by a single `run_all_pending` call.
pub const DEFAULT_TIMER_LIMIT: usize = 100_000;

/// Errors from loading or validating a configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("failed to read config file {}: {source}", path.display())]
    Io {
        /// Path that was read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
    /// The JSON was malformed or had unknown fields
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    /// A field had an unusable value
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Settings for one [`EventLoop`](crate::EventLoop).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Logical time the clock starts at
    pub start_time_ms: LogicalTime,
    /// Maximum timers fired by one `run_all_pending` / `run_only_pending`
    pub timer_limit: usize,
    /// Minimum-delay policy for nested timers
    pub clamp: TimerClamp,
    /// Whether rejections without handlers are reported
    pub track_unhandled_rejections: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            start_time_ms: 0,
            timer_limit: DEFAULT_TIMER_LIMIT,
            clamp: TimerClamp::None,
            track_unhandled_rejections: true,
        }
    }
}

impl SchedulerConfig {
    /// Parses and validates a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: SchedulerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Checks field values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timer_limit == 0 {
            return Err(ConfigError::Invalid(
                "timer_limit must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Sets the timer limit.
    pub fn with_timer_limit(mut self, limit: usize) -> Self {
        self.timer_limit = limit;
        self
    }

    /// Sets the nested-timer clamp.
    pub fn with_clamp(mut self, clamp: TimerClamp) -> Self {
        self.clamp = clamp;
        self
    }

    /// Sets the initial logical time.
    pub fn with_start_time(mut self, start: LogicalTime) -> Self {
        self.start_time_ms = start;
        self
    }

    /// Enables or disables unhandled rejection reporting.
    pub fn with_unhandled_rejection_tracking(mut self, enabled: bool) -> Self {
        self.track_unhandled_rejections = enabled;
        self
    }
}
