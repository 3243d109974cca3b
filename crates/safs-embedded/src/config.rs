//! Embedded services configuration (safs.toml)
//!
//! Every section and field is optional; an empty file yields the defaults.

use crate::defaults::{
    DEFAULT_QUEUE_CAPACITY, QUEUE_HANDLE_ID, QUEUE_SERVICE_NAME, SEM_HANDLE_ID, SEM_SERVICE_NAME,
    VAR_SERVICE_NAME,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur while loading a configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Failed to render TOML
    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// Validation error
    #[error("Invalid config: {0}")]
    ValidationError(String),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddedConfig {
    /// Registry settings
    pub registry: RegistryConfig,

    /// QUEUE service
    pub queue: QueueConfig,

    /// SEM service
    pub sem: SemConfig,

    /// VAR service
    pub var: VarConfig,
}

/// `[registry]`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RegistryConfig {
    /// Capacity of each new handle's message queue
    pub queue_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// `[queue]`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QueueConfig {
    pub enabled: bool,
    pub handle_id: String,
    pub service_name: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            handle_id: QUEUE_HANDLE_ID.to_string(),
            service_name: QUEUE_SERVICE_NAME.to_string(),
        }
    }
}

/// `[sem]`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SemConfig {
    pub enabled: bool,
    pub handle_id: String,
    pub service_name: String,
}

impl Default for SemConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            handle_id: SEM_HANDLE_ID.to_string(),
            service_name: SEM_SERVICE_NAME.to_string(),
        }
    }
}

/// `[var]`. The handle id is derived from the service name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VarConfig {
    pub enabled: bool,
    pub service_name: String,
    /// Passed through as the init parameters
    pub parms: String,
}

impl Default for VarConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            service_name: VAR_SERVICE_NAME.to_string(),
            parms: String::new(),
        }
    }
}

impl EmbeddedConfig {
    /// Load a configuration from a file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse a configuration from a string
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: EmbeddedConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.registry.queue_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "registry.queue_capacity must be greater than zero".to_string(),
            ));
        }

        let names = [
            ("queue.handle_id", &self.queue.handle_id),
            ("queue.service_name", &self.queue.service_name),
            ("sem.handle_id", &self.sem.handle_id),
            ("sem.service_name", &self.sem.service_name),
            ("var.service_name", &self.var.service_name),
        ];
        for (field, value) in names {
            if value.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!("{} cannot be empty", field)));
            }
        }
        Ok(())
    }

    /// Render the configuration as TOML
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}
