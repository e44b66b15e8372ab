//! Application configuration schemas.
//!
//! Configuration is read from an optional TOML file through the `config`
//! crate and overlaid with `HOOKWIRE__*` environment variables. Every field
//! carries a serde default so a missing file still yields a usable setup.

pub mod logging;
pub mod plugin;

use serde::{Deserialize, Serialize};

pub use self::logging::LoggingConfig;
pub use self::plugin::PluginConfig;

use crate::error::AppError;

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Plugin system settings.
    #[serde(default)]
    pub plugins: PluginConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    ///
    /// The file is optional; environment variables prefixed with `HOOKWIRE`
    /// (separator `__`, e.g. `HOOKWIRE__PLUGINS__DEBOUNCE_MS=500`) override
    /// file values.
    pub fn load(path: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("HOOKWIRE")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("plugins.source_extensions")
                    .with_list_parse_key("plugins.extra_build_args")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))
    }
}
