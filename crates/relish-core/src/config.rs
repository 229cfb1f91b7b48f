//! Run configuration.
//!
//! Loaded from YAML, overridable field by field from the CLI. Every field
//! has a default so an empty file (or no file) is a valid configuration.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{EngineError, Result};
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Concurrent scenario workers, each with its own driver session.
    pub workers: usize,
    /// Classify steps without executing anything.
    pub dry_run: bool,
    /// Stop dispatching new scenarios after the first failure.
    pub fail_fast: bool,
    pub results_dir: PathBuf,
    /// Allow a pre-existing results directory.
    pub reuse_results: bool,
    /// Scenarios carrying any of these tags are skipped without starting.
    pub skip_tags: HashSet<String>,
    /// Default retry timeout for retryable steps, in seconds.
    pub step_timeout_secs: u64,
    /// Fixed poll interval between retry attempts, in milliseconds.
    pub step_poll_interval_ms: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            dry_run: false,
            fail_fast: false,
            results_dir: PathBuf::from("results"),
            reuse_results: false,
            skip_tags: HashSet::from(["disabled".to_string()]),
            step_timeout_secs: 20,
            step_poll_interval_ms: 500,
        }
    }
}

impl RunConfig {
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&raw)
            .map_err(|e| EngineError::InvalidConfig(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(EngineError::InvalidConfig("workers must be >= 1".into()));
        }
        self.retry_policy()?;
        Ok(())
    }

    /// The run-level default policy handed to retryable steps.
    pub fn retry_policy(&self) -> Result<RetryPolicy> {
        RetryPolicy::new(
            Duration::from_secs(self.step_timeout_secs),
            Duration::from_millis(self.step_poll_interval_ms),
        )
    }
}
