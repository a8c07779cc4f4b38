//! Application configuration module
//!
//! Type-safe configuration loaded from environment variables using the
//! `config` and `dotenvy` crates. Variables carry the `SCHOOL_MESSAGING`
//! prefix and nested values are separated by double underscores.
//!
//! # Example
//!
//! ```no_run
//! use school_messaging::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//!
//! println!("Server running on {}", config.server.socket_addr().unwrap());
//! ```

mod api;
mod error;
mod messaging;
mod server;
mod upload;

pub use api::ApiConfig;
pub use error::{ConfigError, ValidationError};
pub use messaging::MessagingConfig;
pub use server::{Environment, LogFormat, ServerConfig};
pub use upload::UploadConfig;

use serde::Deserialize;

/// Root application configuration
///
/// Every section has defaults, so an empty environment yields a usable
/// development setup. Load using [`AppConfig::load()`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Reference server (bind address, logging)
    #[serde(default)]
    pub server: ServerConfig,

    /// Messaging API client
    #[serde(default)]
    pub api: ApiConfig,

    /// Search debounce and related tunables
    #[serde(default)]
    pub messaging: MessagingConfig,

    /// Attachment limits
    #[serde(default)]
    pub upload: UploadConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with `SCHOOL_MESSAGING` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    /// 4. Deserializes into typed configuration structs
    ///
    /// # Environment Variable Format
    ///
    /// - `SCHOOL_MESSAGING__SERVER__PORT=8080` -> `server.port = 8080`
    /// - `SCHOOL_MESSAGING__API__BASE_URL=...` -> `api.base_url = ...`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if values cannot be parsed into expected types
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("SCHOOL_MESSAGING")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.api.validate(&self.server.environment)?;
        self.messaging.validate()?;
        self.upload.validate()?;
        Ok(())
    }

    /// Check if running in production environment
    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}
