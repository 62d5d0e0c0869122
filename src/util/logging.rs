//! Logging initialization.

use crate::config::{GlobalConfig, LogFormat};
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global tracing subscriber described by `global`.
///
/// `RUST_LOG` takes precedence over the configured level when set. Fails if
/// a global subscriber is already installed.
pub fn init_logging(global: &GlobalConfig) -> Result<(), TryInitError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&global.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    match global.log_format {
        LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
        LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init(),
    }
}
