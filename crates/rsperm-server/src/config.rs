//! Configuration management for rsperm.
//!
//! This module provides configuration loading with multiple sources:
//! 1. Default values (hardcoded)
//! 2. Configuration file (YAML)
//! 3. Environment variables (override)
//!
//! # Configuration Hierarchy
//!
//! Environment variables take precedence over config file values,
//! which take precedence over defaults.
//!
//! # Example
//!
//! ```ignore
//! use rsperm_server::config::ServerConfig;
//!
//! // Load from file with env overrides
//! let config = ServerConfig::load("rsperm.yaml")?;
//!
//! // Or load from environment only
//! let config = ServerConfig::from_env()?;
//! ```

use config::{Config, ConfigError, Environment, File, FileFormat};
use rsperm_domain::query::GRANTED_MARKER;
use rsperm_domain::resolver::RegistryConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Server configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ServerConfig {
    /// Permission registry settings
    #[serde(default)]
    pub permissions: PermissionsSettings,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Permission registry settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct PermissionsSettings {
    /// Prepend a native rule to every registration unless overridden
    #[serde(default = "default_true")]
    pub native_default: bool,

    /// Maximum delegation depth
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    /// Name of the boolean marker column on query fragments
    #[serde(default = "default_marker_column")]
    pub marker_column: String,
}

impl Default for PermissionsSettings {
    fn default() -> Self {
        Self {
            native_default: true,
            max_depth: default_max_depth(),
            marker_column: default_marker_column(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_depth() -> u32 {
    25
}

fn default_marker_column() -> String {
    GRANTED_MARKER.to_string()
}

impl From<&PermissionsSettings> for RegistryConfig {
    fn from(settings: &PermissionsSettings) -> Self {
        RegistryConfig::default()
            .with_native_default(settings.native_default)
            .with_max_depth(settings.max_depth)
            .with_marker_column(settings.marker_column.clone())
    }
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LoggingSettings {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Use JSON format (true for production, false for development)
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),

    #[error("configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

impl ServerConfig {
    /// Load configuration from a YAML file with environment variable overrides.
    ///
    /// Environment variables are prefixed with `RSPERM_` and use `__` as separator.
    /// For example:
    /// - `RSPERM_PERMISSIONS__MAX_DEPTH=10` overrides `permissions.max_depth`
    /// - `RSPERM_LOGGING__JSON=true` overrides `logging.json`
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigLoadError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let config = Config::builder()
            .add_source(Config::try_from(&ServerConfig::default())?)
            .add_source(File::from(path).format(FileFormat::Yaml))
            .add_source(env_source())
            .build()?;

        let server_config: ServerConfig = config.try_deserialize()?;
        server_config.validate()?;

        Ok(server_config)
    }

    /// Load configuration from environment variables only.
    ///
    /// Uses default values and allows overrides via RSPERM_ prefixed env vars.
    pub fn from_env() -> Result<Self, ConfigLoadError> {
        let config = Config::builder()
            .add_source(Config::try_from(&ServerConfig::default())?)
            .add_source(env_source())
            .build()?;

        let server_config: ServerConfig = config.try_deserialize()?;
        server_config.validate()?;

        Ok(server_config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.permissions.max_depth == 0 {
            return Err(ConfigLoadError::Invalid {
                message: "permissions.max_depth must be greater than 0".to_string(),
            });
        }

        let marker = self.permissions.marker_column.trim();
        if marker.is_empty() || marker == "id" {
            return Err(ConfigLoadError::Invalid {
                message: format!(
                    "permissions.marker_column must be a non-empty name other than 'id', got: {:?}",
                    self.permissions.marker_column
                ),
            });
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigLoadError::Invalid {
                message: format!(
                    "logging.level must be one of: {:?}, got: {}",
                    valid_levels, self.logging.level
                ),
            });
        }

        Ok(())
    }

    /// Registry configuration derived from the permissions section.
    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig::from(&self.permissions)
    }
}

// RSPERM_PERMISSIONS__MAX_DEPTH -> permissions.max_depth
fn env_source() -> Environment {
    Environment::with_prefix("RSPERM")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}
