//! Configuration Loader
//!
//! Environment-aware configuration loading. Discovers an optional
//! `config/sheetmerge.yaml` plus a `config/sheetmerge.{environment}.yaml`
//! override, then applies `SHEETMERGE_`-prefixed environment variables on
//! top. Missing files fall back to validated defaults rather than failing.

use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use super::SheetmergeConfig;
use crate::error::{CoreError, Result};

/// Loaded configuration plus the environment it was resolved for
#[derive(Debug)]
pub struct ConfigManager {
    config: SheetmergeConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> Result<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> Result<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration with an explicit environment; useful in tests that
    /// must not mutate process-global environment variables
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> Result<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(|| PathBuf::from("config"));

        debug!(
            environment,
            directory = %config_directory.display(),
            "loading configuration"
        );

        let config = Self::build_config(&config_directory, environment)?;
        config.validate()?;

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Access the loaded configuration
    pub fn config(&self) -> &SheetmergeConfig {
        &self.config
    }

    /// Environment this configuration was resolved for
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Directory configuration files were loaded from
    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    fn build_config(config_directory: &Path, environment: &str) -> Result<SheetmergeConfig> {
        let base_file = config_directory.join("sheetmerge.yaml");
        let env_file = config_directory.join(format!("sheetmerge.{environment}.yaml"));

        let settings = config::Config::builder()
            .add_source(config::File::from(base_file).required(false))
            .add_source(config::File::from(env_file).required(false))
            .add_source(
                config::Environment::with_prefix("SHEETMERGE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| CoreError::Configuration {
                message: format!("failed to read configuration sources: {e}"),
            })?;

        settings
            .try_deserialize()
            .map_err(|e| CoreError::Configuration {
                message: format!("failed to deserialize configuration: {e}"),
            })
    }

    /// Detect current environment from environment variables
    fn detect_environment() -> String {
        env::var("SHEETMERGE_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
    }
}
