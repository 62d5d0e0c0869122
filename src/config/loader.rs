//! Configuration file loading.

use crate::config::{validate_config, Config, Overrides};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("configuration validation failed: {0}")]
    ValidationError(String),
}

/// Read and parse a YAML file without validating it.
///
/// Every key is optional; missing keys take their defaults.
pub fn read_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    Ok(serde_yaml::from_str(&contents)?)
}

/// Load and validate configuration from a YAML file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    resolve_config(Some(path.as_ref()), &Overrides::default())
}

/// Build the effective configuration: the file (or defaults when there is
/// none), then command line overrides, validated once at the end.
pub fn resolve_config(path: Option<&Path>, overrides: &Overrides) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(path) => read_config(path)?,
        None => Config::default(),
    };

    config.apply_overrides(overrides);
    validate_config(&config).map_err(ConfigError::ValidationError)?;

    Ok(config)
}
