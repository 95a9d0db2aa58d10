//! Aggregator configuration.

/// Aggregator configuration.
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Maximum records accepted in one metrics batch.
    pub max_batch_len: usize,
    /// Maximum future timestamp skew tolerated on submissions (milliseconds).
    pub max_future_skew_ms: u64,
    /// Smoothing factor for the per-node latency estimate (0..1).
    pub latency_alpha: f64,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            max_batch_len: 256,
            max_future_skew_ms: 10_000,
            latency_alpha: 0.2,
        }
    }
}
