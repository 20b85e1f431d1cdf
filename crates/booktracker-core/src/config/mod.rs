//! Application configuration schemas.
//!
//! All configuration structs are deserialized via the `config` crate.
//! Each sub-module represents a logical configuration section.

pub mod access;
pub mod database;
pub mod logging;

use serde::{Deserialize, Serialize};

pub use self::access::AccessConfig;
pub use self::database::DatabaseConfig;
pub use self::logging::LoggingConfig;

use crate::error::AppError;

/// Root application configuration.
///
/// Top-level deserialization target for the merged configuration files
/// (`config/default` + environment overlay + `BOOKTRACKER__*` variables).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Database connection settings.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Permission cache and invitation settings.
    #[serde(default)]
    pub access: AccessConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration.
    ///
    /// Merges `config/default` with an environment-specific overlay
    /// (`config/{env}`) and environment variables prefixed with
    /// `BOOKTRACKER__`, e.g. `BOOKTRACKER__DATABASE__URL`.
    pub fn load(env: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("BOOKTRACKER")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))
    }
}
