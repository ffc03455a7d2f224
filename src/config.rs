//! Settings loaded from `tnfsearch.toml`.
//!
//! Every field has a default, so a missing file is the same as an empty one.
//! Command-line flags are applied on top by the runner.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::SearchError;
use crate::evaluator::Limits;
use crate::protocol::DEFAULT_MIN_BATCH;
use crate::queue::{MasterSettings, WorkerSettings};

pub const DEFAULT_CONFIG_FILE: &str = "tnfsearch.toml";

/// Environment variable holding a `tracing` filter, e.g. `tnfsearch=debug`.
pub const LOG_ENV: &str = "TNFSEARCH_LOG";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchConfig {
    #[serde(default = "default_step_limit")]
    pub step_limit: u64,

    #[serde(default = "default_tape_limit")]
    pub tape_limit: usize,

    /// Steps during which exact configuration repeats are detected.
    #[serde(default = "default_cycle_check_steps")]
    pub cycle_check_steps: u64,

    #[serde(default = "default_min_batch")]
    pub min_batch: usize,

    #[serde(default = "default_initial_max_queue_size")]
    pub initial_max_queue_size: usize,

    #[serde(default = "default_report_interval_secs")]
    pub report_interval_secs: u64,

    #[serde(default = "default_broadcast_interval_secs")]
    pub broadcast_interval_secs: u64,

    /// Jobs between two progress updates.
    #[serde(default = "default_progress_interval")]
    pub progress_interval: u64,
}

fn default_step_limit() -> u64 {
    10_000
}

fn default_tape_limit() -> usize {
    100_000
}

fn default_cycle_check_steps() -> u64 {
    1_000
}

fn default_min_batch() -> usize {
    DEFAULT_MIN_BATCH
}

fn default_initial_max_queue_size() -> usize {
    1_000
}

fn default_report_interval_secs() -> u64 {
    10
}

fn default_broadcast_interval_secs() -> u64 {
    10
}

fn default_progress_interval() -> u64 {
    10_000
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            step_limit: default_step_limit(),
            tape_limit: default_tape_limit(),
            cycle_check_steps: default_cycle_check_steps(),
            min_batch: default_min_batch(),
            initial_max_queue_size: default_initial_max_queue_size(),
            report_interval_secs: default_report_interval_secs(),
            broadcast_interval_secs: default_broadcast_interval_secs(),
            progress_interval: default_progress_interval(),
        }
    }
}

impl SearchConfig {
    /// Loads `path`, or `tnfsearch.toml` in the working directory when no path
    /// is given. Only an explicitly named file has to exist.
    pub fn load(path: Option<&Path>) -> Result<Self, SearchError> {
        let (path, required) = match path {
            Some(p) => (p, true),
            None => (Path::new(DEFAULT_CONFIG_FILE), false),
        };
        if !path.exists() {
            if required {
                return Err(SearchError::Config(format!(
                    "config file {} not found",
                    path.display()
                )));
            }
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let config: SearchConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SearchError> {
        if self.min_batch == 0 {
            return Err(SearchError::Config("min_batch must be at least 1".into()));
        }
        if self.initial_max_queue_size == 0 {
            return Err(SearchError::Config("initial_max_queue_size must be at least 1".into()));
        }
        if self.initial_max_queue_size < self.min_batch {
            return Err(SearchError::Config(format!(
                "initial_max_queue_size ({}) must be at least min_batch ({})",
                self.initial_max_queue_size, self.min_batch
            )));
        }
        if self.step_limit == 0 {
            return Err(SearchError::Config("step_limit must be at least 1".into()));
        }
        Ok(())
    }

    pub fn limits(&self) -> Limits {
        Limits {
            step_limit: self.step_limit,
            tape_limit: self.tape_limit,
            cycle_check_steps: self.cycle_check_steps,
        }
    }

    pub fn master_settings(&self) -> MasterSettings {
        MasterSettings {
            min_batch: self.min_batch,
            initial_max_queue_size: self.initial_max_queue_size,
            broadcast_interval: Duration::from_secs(self.broadcast_interval_secs),
        }
    }

    pub fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            initial_max_queue_size: self.initial_max_queue_size,
            report_interval: Duration::from_secs(self.report_interval_secs),
            ..WorkerSettings::default()
        }
    }
}
