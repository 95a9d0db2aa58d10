//! Reporter configuration.

/// Reporting period bounds.
#[derive(Debug, Clone)]
pub struct ReporterConfig {
    /// Samples closer together than this are absorbed into the next period
    /// (volume bound).
    pub min_period_secs: u64,
    /// Periods longer than this are emitted but flagged in the log; they
    /// usually mean a collection gap.
    pub max_period_secs: u64,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            min_period_secs: 60,
            max_period_secs: 3_600,
        }
    }
}

impl ReporterConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.min_period_secs == 0 || self.min_period_secs >= self.max_period_secs {
            return Err(format!(
                "reporter periods must satisfy 0 < min < max, got {} / {}",
                self.min_period_secs, self.max_period_secs
            ));
        }
        Ok(())
    }

    /// Testing config with a tiny minimum period.
    pub fn for_testing() -> Self {
        Self {
            min_period_secs: 1,
            max_period_secs: 60,
        }
    }
}
