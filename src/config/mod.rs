//! Configuration management for vidtrack
//!
//! Settings are layered, lowest priority first:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. `.env` file
//! 4. Environment variables
//!
//! # Usage
//!
//! ```no_run
//! use vidtrack::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Polling {} every {}", config.service.base_url, config.polling.interval);
//! ```
//!
//! # Environment Variables
//!
//! Any key can be overridden with `VIDTRACK__<section>__<key>`:
//! - `VIDTRACK__SERVICE__BASE_URL=http://gpu-box:8000`
//! - `VIDTRACK__POLLING__INTERVAL=5s`
//! - `VIDTRACK__PROCESSING__MAX_FRAMES=400`
//!
//! # Configuration File
//!
//! Read from `config/vidtrack.toml` unless `VIDTRACK_CONFIG` points
//! elsewhere. A missing file is not an error.

mod models;
mod sources;
mod validation;

pub use crate::humanize::HumanDuration;
pub use models::{Config, LoggingConfig, PathValidationConfig, PollingConfig, ServiceConfig};
pub use sources::default_path;
pub use validation::ValidationError;

use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),

    #[error("Failed to render configuration: {0}")]
    RenderError(#[from] toml::ser::Error),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// # Errors
    ///
    /// Returns an error if the file is malformed or validation fails.
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file plus the environment
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path.as_ref())?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Re-check after programmatic overrides (e.g. CLI flags)
    pub fn validate(&self) -> Result<(), ConfigError> {
        validation::validate(self)?;
        Ok(())
    }

    pub fn http_config(&self) -> crate::service::HttpConfig {
        self.service.http_config()
    }

    /// Effective configuration rendered as TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}
