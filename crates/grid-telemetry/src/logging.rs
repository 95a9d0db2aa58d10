//! Structured logging setup.
//!
//! One fmt subscriber per process, filter from `GM_LOG` (falling back to
//! `RUST_LOG`, then `info`). Components log with `tracing` field syntax and
//! a `component` field so log pipelines can split streams.

use tracing_subscriber::{fmt, EnvFilter};

use crate::TelemetryError;

/// Initialize the global tracing subscriber.
///
/// Safe to call once per process; a second call reports an error rather than
/// panicking so tests that race initialization can ignore it.
pub fn init_logging(default_level: &str) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_from_env("GM_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| TelemetryError::LoggingInit(e.to_string()))
}
