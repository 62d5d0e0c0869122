//! Configuration validation.

use crate::config::Config;
use hyper::Uri;

/// Validate the configuration.
///
/// Checks for:
/// - A target URL that parses, uses the `http` scheme and names a host
/// - A non-zero fetch timeout
/// - A metrics path that is absolute and does not shadow the health endpoints
/// - A recognized log level
///
/// # Returns
///
/// `Ok(())` if valid, or an error message describing every problem found.
pub fn validate_config(config: &Config) -> Result<(), String> {
    let mut errors = Vec::new();

    match config.target.url.parse::<Uri>() {
        Ok(uri) => {
            if uri.scheme_str() != Some("http") {
                errors.push(format!(
                    "target url '{}' must use the http scheme",
                    config.target.url
                ));
            }
            if uri.host().is_none() {
                errors.push(format!("target url '{}' has no host", config.target.url));
            }
            if uri.query().is_some() {
                errors.push(format!(
                    "target url '{}' must not carry a query string",
                    config.target.url
                ));
            }
        }
        Err(e) => {
            errors.push(format!("invalid target url '{}': {}", config.target.url, e));
        }
    }

    if config.target.timeout.is_zero() {
        errors.push("target timeout must be greater than zero".to_string());
    }

    let path = &config.metrics.path;
    if !path.starts_with('/') {
        errors.push(format!("metrics path '{}' must start with '/'", path));
    }
    if path == "/" || path == "/health" || path == "/healthz" {
        errors.push(format!("metrics path '{}' is reserved", path));
    }

    // Validate log level
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.global.log_level.to_lowercase().as_str()) {
        errors.push(format!(
            "invalid log level '{}', must be one of: {}",
            config.global.log_level,
            valid_levels.join(", ")
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.join("; "))
    }
}
