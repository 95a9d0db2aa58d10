//! Outbox configuration.

/// Delivery retry policy and retention.
#[derive(Debug, Clone)]
pub struct OutboxConfig {
    /// Delivery attempts before an entry is dead-lettered.
    pub max_attempts: u32,
    /// First retry delay (milliseconds).
    pub base_backoff_ms: u64,
    /// Retry delay cap (milliseconds).
    pub max_backoff_ms: u64,
    /// Jitter applied to every delay, as a percentage (20 = +/-20%).
    pub jitter_pct: u8,
    /// Flusher poll interval when the queue is idle (milliseconds).
    pub poll_interval_ms: u64,
    /// Acked entries older than this may be purged (milliseconds).
    pub purge_acked_after_ms: u64,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_backoff_ms: 1_000,
            max_backoff_ms: 300_000,
            jitter_pct: 20,
            poll_interval_ms: 500,
            purge_acked_after_ms: 24 * 60 * 60 * 1000,
        }
    }
}

impl OutboxConfig {
    /// Testing config with immediate retries and a fast poll.
    pub fn for_testing() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 1,
            max_backoff_ms: 20,
            jitter_pct: 0,
            poll_interval_ms: 5,
            purge_acked_after_ms: 1_000,
        }
    }
}
