//! Configuration Loader
//!
//! Environment-aware configuration loading. Handles file discovery, environment
//! detection, and layering of the environment overlay and variables on top of
//! the base file.

use super::error::{ConfigResult, ConfigurationError};
use super::SchedulerConfig;
use config::{Config, Environment, File, FileFormat};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const BASE_FILE_NAMES: [&str; 2] = ["scheduler-config.yaml", "scheduler-config.yml"];
const ENV_PREFIX: &str = "OFFER_SCHEDULER";
const CONFIG_DIR_VAR: &str = "OFFER_SCHEDULER_CONFIG_DIR";

/// Loaded, validated configuration plus the context it was loaded from
#[derive(Debug)]
pub struct ConfigManager {
    config: SchedulerConfig,
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
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment.
    /// Useful for tests that must not touch process-wide variables.
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);

        debug!(
            environment = %environment,
            directory = %config_directory.display(),
            "Loading scheduler configuration"
        );

        let config = Self::load_layered(&config_directory, environment)?;
        config.validate()?;

        info!(
            environment = %environment,
            offer_queue_size = config.offers.queue_size,
            launch_constrainer = ?config.recovery.launch_constrainer,
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Wrap an already-built configuration, validating it first
    pub fn from_config(config: SchedulerConfig, environment: &str) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory: PathBuf::from("config"),
        }))
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// JSON rendering of the loaded configuration for diagnostics
    pub fn debug_config(&self) -> serde_json::Value {
        serde_json::to_value(&self.config).unwrap_or(serde_json::Value::Null)
    }

    /// Get the current environment
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Get the configuration directory
    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Detect current environment: SCHEDULER_ENV || APP_ENV || 'development'
    pub fn detect_environment() -> String {
        env::var("SCHEDULER_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }

    fn default_config_directory() -> PathBuf {
        env::var(CONFIG_DIR_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config"))
    }

    fn find_base_file(config_directory: &Path) -> ConfigResult<PathBuf> {
        let mut searched_paths = Vec::new();
        for name in BASE_FILE_NAMES {
            let path = config_directory.join(name);
            if path.is_file() {
                debug!("Found configuration file: {}", path.display());
                return Ok(path);
            }
            searched_paths.push(path);
        }
        Err(ConfigurationError::config_file_not_found(searched_paths))
    }

    fn load_layered(config_directory: &Path, environment: &str) -> ConfigResult<SchedulerConfig> {
        let base_file = Self::find_base_file(config_directory)?;
        let overlay_file = config_directory.join(format!("scheduler-config.{environment}.yaml"));
        if overlay_file.is_file() {
            debug!(
                "Applying environment-specific overrides from {}",
                overlay_file.display()
            );
        }

        let settings = Config::builder()
            .add_source(
                File::from(base_file.as_path())
                    .format(FileFormat::Yaml)
                    .required(true),
            )
            .add_source(
                File::from(overlay_file.as_path())
                    .format(FileFormat::Yaml)
                    .required(false),
            )
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigurationError::invalid_source(base_file.display().to_string(), e))?;

        settings
            .try_deserialize::<SchedulerConfig>()
            .map_err(|e| ConfigurationError::invalid_source(base_file.display().to_string(), e))
    }
}
