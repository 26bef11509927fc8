//! Tracing bootstrap shared by hosts and tests

use thiserror::Error;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Error returned when the global subscriber cannot be installed
#[derive(Error, Debug)]
#[error("Failed to initialize logging: {0}")]
pub struct LoggingError(String);

/// Install a fmt subscriber filtered by `RUST_LOG`, falling back to `level`.
///
/// Returns an error if a global subscriber is already set; callers that may
/// run more than once (tests) can ignore it.
pub fn init_logging(level: &str) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| LoggingError(e.to_string()))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| LoggingError(e.to_string()))?;

    debug!("Logging initialized at level {}", level);
    Ok(())
}
