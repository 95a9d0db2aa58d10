//! Monitor configuration.

/// Heartbeat classification thresholds and sweep cadence.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Silence before a node is `stale` (milliseconds).
    pub stale_ms: u64,
    /// Silence before a node is `offline` (milliseconds).
    pub offline_ms: u64,
    /// Silence before a node is deregistered (milliseconds).
    pub dereg_ms: u64,
    /// Sweep interval; must be at most `stale_ms / 3`.
    pub check_interval_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            stale_ms: 30_000,       // 30s
            offline_ms: 120_000,    // 2 minutes
            dereg_ms: 3_600_000,    // 1 hour
            check_interval_ms: 10_000,
        }
    }
}

impl MonitorConfig {
    /// Check threshold ordering and sweep cadence.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.stale_ms < self.offline_ms && self.offline_ms < self.dereg_ms) {
            return Err(format!(
                "thresholds must be ordered stale < offline < dereg, got {} / {} / {}",
                self.stale_ms, self.offline_ms, self.dereg_ms
            ));
        }
        if self.check_interval_ms == 0 || self.check_interval_ms > self.stale_ms / 3 {
            return Err(format!(
                "check interval {}ms must be in (0, stale/3 = {}ms]",
                self.check_interval_ms,
                self.stale_ms / 3
            ));
        }
        Ok(())
    }

    /// Testing config with fast thresholds.
    pub fn for_testing() -> Self {
        Self {
            stale_ms: 300,
            offline_ms: 900,
            dereg_ms: 3_000,
            check_interval_ms: 100,
        }
    }
}
