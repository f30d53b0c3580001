//! Configuration Loader
//!
//! Environment-aware loading: built-in defaults, then `phos.toml`, then
//! `phos.<environment>.toml`, then `PHOS__SECTION__FIELD` environment variables.

use super::error::ConfigResult;
use super::PhosConfig;
use config::{Config, Environment, File, FileFormat};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

pub struct ConfigManager {
    config: PhosConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with an explicit environment,
    /// leaving the process environment untouched
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(|| PathBuf::from("config"));

        debug!(
            "Loading configuration for environment '{}' from directory: {}",
            environment,
            config_directory.display()
        );

        let config = Self::load_and_merge_config(&config_directory, environment)?;
        config.validate()?;

        info!(
            environment = %environment,
            policy = ?config.checkpoint.policy,
            interval_ms = config.checkpoint.interval_ms,
            max_retained_versions = config.checkpoint.max_retained_versions,
            "⚙️ CONFIG: Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Wrap an already-built configuration, validating it first
    pub fn from_config(config: PhosConfig) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: detect_environment(),
            config_directory: PathBuf::from("config"),
        }))
    }

    fn load_and_merge_config(
        config_directory: &Path,
        environment: &str,
    ) -> ConfigResult<PhosConfig> {
        let defaults = Config::try_from(&PhosConfig::default())?;

        let base = config_directory.join("phos.toml");
        let overlay = config_directory.join(format!("phos.{environment}.toml"));
        debug!(
            base = %base.display(),
            base_exists = base.exists(),
            overlay = %overlay.display(),
            overlay_exists = overlay.exists(),
            "Resolving configuration sources"
        );

        let merged = Config::builder()
            .add_source(defaults)
            .add_source(File::from(base).format(FileFormat::Toml).required(false))
            .add_source(File::from(overlay).format(FileFormat::Toml).required(false))
            .add_source(
                Environment::with_prefix("PHOS")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(merged.try_deserialize::<PhosConfig>()?)
    }

    pub fn config(&self) -> &PhosConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

}

/// Deployment environment: PHOS_ENV || APP_ENV || 'development'
pub fn detect_environment() -> String {
    env::var("PHOS_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
        .to_lowercase()
}
