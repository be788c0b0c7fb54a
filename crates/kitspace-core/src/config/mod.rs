//! Application configuration schemas.
//!
//! All configuration structs are deserialized via the `config` crate from
//! `config/default.toml`, an optional environment overlay, and `KITSPACE__*`
//! environment variables. Each sub-module represents a logical section.

pub mod api;
pub mod app;
pub mod converters;
pub mod gitea;
pub mod logging;
pub mod scheduler;
pub mod storage;
pub mod watcher;

use serde::{Deserialize, Serialize};
use validator::Validate;

use self::api::ApiConfig;
use self::app::ServerConfig;
use self::converters::ConvertersConfig;
use self::gitea::GiteaConfig;
use self::logging::LoggingConfig;
use self::scheduler::SchedulerConfig;
use self::storage::StorageConfig;
use self::watcher::WatcherConfig;

use crate::error::AppError;

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Asset store settings.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Task scheduler settings.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// External tool settings for the converters.
    #[serde(default)]
    pub converters: ConvertersConfig,
    /// Gitea connection settings.
    #[serde(default)]
    pub gitea: GiteaConfig,
    /// Repository watcher settings.
    #[serde(default)]
    pub watcher: WatcherConfig,
    /// Trigger API settings.
    #[serde(default)]
    pub api: ApiConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration.
    ///
    /// Merges `config/default`, the environment overlay `config/{env}`, and
    /// environment variables prefixed with `KITSPACE__`, then validates the
    /// sections that carry numeric bounds.
    pub fn load(env: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("KITSPACE")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("api.tokens")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        let config: Self = config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate bounded settings.
    pub fn validate(&self) -> Result<(), AppError> {
        self.scheduler.validate()?;
        self.converters.validate()?;
        Ok(())
    }
}
