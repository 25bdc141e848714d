//! Structured logging setup
//!
//! `RUST_LOG` wins when set; otherwise the configured `server.log_level`
//! applies. Output is human-readable or JSON per `server.log_format`.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use tunelink_domain::{LogFormat, Result, ServerConfig, TuneLinkError};

/// Build the level filter for `config`, preferring `RUST_LOG`.
///
/// # Errors
/// Returns `TuneLinkError::Config` if the fallback directive is invalid.
pub fn build_filter(config: &ServerConfig) -> Result<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.tracing_level()))
        .map_err(|e| TuneLinkError::Config(format!("Invalid log filter: {e}")))
}

/// Install the global tracing subscriber.
///
/// # Errors
/// Returns `TuneLinkError::Config` if the filter is invalid or a global
/// subscriber is already installed.
pub fn init_logging(config: &ServerConfig) -> Result<()> {
    let registry = tracing_subscriber::registry().with(build_filter(config)?);

    let result = match config.log_format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(true).with_span_list(false))
            .try_init(),
        LogFormat::Pretty => registry.with(fmt::layer().with_target(true).with_level(true)).try_init(),
    };

    result.map_err(|e| TuneLinkError::Config(format!("Failed to initialise logging: {e}")))
}
