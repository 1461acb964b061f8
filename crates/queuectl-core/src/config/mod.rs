//! Application configuration schemas.
//!
//! The root [`AppConfig`] is deserialized via the `config` crate from an
//! optional TOML file overlaid with `QUEUECTL__`-prefixed environment
//! variables. Every field has a default, so running without a file works.

pub mod database;
pub mod logging;
pub mod worker;

use serde::{Deserialize, Serialize};

pub use self::database::DatabaseConfig;
pub use self::logging::LoggingConfig;
pub use self::worker::WorkerConfig;

use crate::error::AppError;

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Job store connection settings.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Worker loop and supervisor settings.
    #[serde(default)]
    pub worker: WorkerConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Location of the queue settings file.
    #[serde(default)]
    pub settings: SettingsConfig,
}

/// Location of the flat key-value queue settings file
/// (`max-retries`, `backoff-base`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsConfig {
    /// Path to the JSON settings file.
    #[serde(default = "default_settings_path")]
    pub path: String,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            path: default_settings_path(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file (optional) and the environment.
    ///
    /// Environment variables use the `QUEUECTL` prefix and `__` as the
    /// section separator, e.g. `QUEUECTL__WORKER__IDLE_INTERVAL_MS=500`.
    pub fn load(path: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("QUEUECTL")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        let config: Self = config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))?;
        config.worker.validate()?;
        Ok(config)
    }
}

fn default_settings_path() -> String {
    "queuectl-settings.json".to_string()
}
