//! # Driven Ports (Outbound SPI)
//!
//! Interfaces the aggregator requires the host application to provide.

use async_trait::async_trait;
use shared_types::MetricsRecord;

/// Consumer of validated per-resource metric samples.
///
/// The usage reporter implements this in production wiring; the aggregator
/// only validates and forwards.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    /// Accept one validated sample.
    async fn submit(&self, record: MetricsRecord);
}

/// Sink that drops everything, for wiring stages and tests that do not care
/// about usage.
#[derive(Debug, Default)]
pub struct NullMetricsSink;

#[async_trait]
impl MetricsSink for NullMetricsSink {
    async fn submit(&self, _record: MetricsRecord) {}
}
