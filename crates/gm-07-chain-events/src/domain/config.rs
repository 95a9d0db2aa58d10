//! Event client configuration.

/// Connection and reconnect policy for the consensus-layer stream.
#[derive(Debug, Clone)]
pub struct EventClientConfig {
    /// Websocket endpoint, e.g. `ws://127.0.0.1:26657/websocket`.
    pub ws_endpoint: String,
    /// First reconnect delay (milliseconds).
    pub reconnect_base_ms: u64,
    /// Reconnect delay cap (milliseconds).
    pub reconnect_max_ms: u64,
    /// Reconnect attempts before giving up; 0 means unlimited.
    pub max_reconnect_attempts: u32,
    /// Whether a dropped socket is re-dialed at all.
    pub auto_reconnect: bool,
}

impl Default for EventClientConfig {
    fn default() -> Self {
        Self {
            ws_endpoint: "ws://127.0.0.1:26657/websocket".into(),
            reconnect_base_ms: 1_000,
            reconnect_max_ms: 60_000,
            max_reconnect_attempts: 0,
            auto_reconnect: true,
        }
    }
}

impl EventClientConfig {
    /// Reconnect delay for attempt number `attempt` (1-based), capped.
    pub fn reconnect_delay_ms(&self, attempt: u32) -> u64 {
        let exp = attempt.min(32);
        self.reconnect_base_ms
            .saturating_mul(1u64.checked_shl(exp).unwrap_or(u64::MAX))
            .min(self.reconnect_max_ms)
    }
}
