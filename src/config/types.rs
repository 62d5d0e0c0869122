//! Configuration data types.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Global settings
    #[serde(default)]
    pub global: GlobalConfig,

    /// Monitored node
    #[serde(default)]
    pub target: TargetConfig,

    /// Exposition endpoint
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Config {
    /// Replace file values with those given on the command line.
    pub fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(target) = &overrides.target {
            self.target.url = target.clone();
        }
        if let Some(listen) = overrides.listen {
            self.metrics.address = listen;
        }
        if let Some(level) = &overrides.log_level {
            self.global.log_level = level.clone();
        }
    }
}

/// Command line values that win over the configuration file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub target: Option<String>,
    pub listen: Option<SocketAddr>,
    pub log_level: Option<String>,
}

/// Global configuration settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GlobalConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::Json,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// The node whose RPC API is scraped.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TargetConfig {
    /// Base URL of the node RPC, e.g. `http://localhost:26657`
    #[serde(default = "default_target_url")]
    pub url: String,

    /// Deadline for each outbound fetch
    #[serde(default = "default_fetch_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            url: default_target_url(),
            timeout: default_fetch_timeout(),
        }
    }
}

/// Metrics endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricsConfig {
    /// Address to bind the exposition server
    #[serde(default = "default_metrics_address")]
    pub address: SocketAddr,

    /// Path for metrics endpoint
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            address: default_metrics_address(),
            path: default_metrics_path(),
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Json
}

fn default_target_url() -> String {
    "http://localhost:26657".to_string()
}

fn default_fetch_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_metrics_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9101))
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

/// Custom serde module for humantime durations.
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
