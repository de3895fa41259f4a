//! Controller log output.
//!
//! `RUST_LOG` wins when set; otherwise the filter comes from the configured
//! controller level.

use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::container::LoggerConfig;

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Invalid log filter: {0}")]
    Filter(String),

    #[error("Failed to install log subscriber: {0}")]
    Init(String),
}

/// Build the filter for `config`, honouring `RUST_LOG`.
///
/// # Errors
///
/// Returns `LoggingError::Filter` if neither source yields a valid filter.
pub fn env_filter(config: &LoggerConfig) -> Result<EnvFilter, LoggingError> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.filter_directive()))
        .map_err(|e| LoggingError::Filter(e.to_string()))
}

/// Install the global subscriber.
///
/// # Errors
///
/// Returns `LoggingError` if the filter is invalid or a subscriber is
/// already installed.
pub fn init_logging(config: &LoggerConfig) -> Result<(), LoggingError> {
    let filter = env_filter(config)?;

    if config.json_logs {
        let json_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true);
        tracing_subscriber::registry()
            .with(filter)
            .with(json_layer)
            .try_init()
            .map_err(|e| LoggingError::Init(e.to_string()))
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(true);
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| LoggingError::Init(e.to_string()))
    }
}
