//! # PhOS Configuration System
//!
//! Layered configuration for the virtualization core: built-in defaults, then optional
//! TOML files, then `PHOS__`-prefixed environment variables.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use phos_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let interval = manager.config().checkpoint.interval();
//! let policy = manager.config().checkpoint.policy;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::{detect_environment, ConfigManager};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure mirroring `config/phos.toml`
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct PhosConfig {
    /// Checkpoint insertion and retention
    #[serde(default)]
    pub checkpoint: CheckpointConfig,

    /// Parser pipeline tuning
    #[serde(default)]
    pub parser: ParserConfig,
}

/// Which handles a checkpoint operation records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointPolicy {
    /// Never insert checkpoint operations on the timer
    Disabled,
    /// Every handle of every stateful kind
    Naive,
    /// Only handles modified since the previous checkpoint
    Incremental,
}

impl CheckpointPolicy {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::Disabled)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CheckpointConfig {
    pub policy: CheckpointPolicy,
    pub interval_ms: u64,
    /// Root directory handed to the persistence backend on dump
    pub directory: PathBuf,
    /// Slots each checkpoint bag keeps after a capture
    pub max_retained_versions: usize,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            policy: CheckpointPolicy::Incremental,
            interval_ms: 1000,
            directory: PathBuf::from("ckpt"),
            max_retained_versions: 2,
        }
    }
}

impl CheckpointConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Spare handles preserved per pool-capable manager at client init
    pub pooled_handles: usize,
    /// Requests drained per loop iteration; 0 drains the queue
    pub max_batch: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            pooled_handles: 0,
            max_batch: 0,
        }
    }
}

impl PhosConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.checkpoint.policy.is_enabled() && self.checkpoint.interval_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "checkpoint.interval_ms",
                "0",
                "interval must be greater than 0 while checkpointing is enabled",
            ));
        }

        if self.checkpoint.max_retained_versions == 0 {
            return Err(ConfigurationError::invalid_value(
                "checkpoint.max_retained_versions",
                "0",
                "every bag must keep its most recent version",
            ));
        }

        if self.checkpoint.directory.as_os_str().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "checkpoint.directory",
                "checkpoint configuration",
            ));
        }

        Ok(())
    }
}
