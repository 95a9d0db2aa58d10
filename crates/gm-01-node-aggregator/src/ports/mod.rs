//! Ports of the node aggregator.

pub mod outbound;

pub use outbound::{MetricsSink, NullMetricsSink};
