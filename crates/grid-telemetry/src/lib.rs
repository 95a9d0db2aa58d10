//! # Grid Telemetry
//!
//! Observability for the GridMarket core: a process-wide Prometheus registry
//! with `gm_*` metrics and tracing-subscriber setup.
//!
//! Metrics registries are naturally process-wide; they are isolated to this
//! crate and initialized lazily so the rest of the core can stay free of
//! global state.

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
pub use metrics::{gather, register_metrics, MetricsHandle, REGISTRY};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// Logging subscriber could not be installed.
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    /// Metric registration or encoding failed.
    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),
}
