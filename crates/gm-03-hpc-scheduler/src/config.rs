//! Scheduler configuration.

/// Scoring weights; must sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerWeights {
    /// Weight of softmax-smoothed free-capacity headroom.
    pub capacity: f64,
    /// Weight of the (inverted) recent latency score.
    pub latency: f64,
    /// Weight of historical reliability.
    pub reliability: f64,
}

impl Default for SchedulerWeights {
    fn default() -> Self {
        Self {
            capacity: 0.5,
            latency: 0.2,
            reliability: 0.3,
        }
    }
}

impl SchedulerWeights {
    /// Check that the weights are non-negative and sum to 1.0.
    pub fn validate(&self) -> Result<(), String> {
        if self.capacity < 0.0 || self.latency < 0.0 || self.reliability < 0.0 {
            return Err("scheduler weights must be non-negative".into());
        }
        let sum = self.capacity + self.latency + self.reliability;
        if (sum - 1.0).abs() > 1e-6 {
            return Err(format!("scheduler weights must sum to 1.0, got {sum}"));
        }
        Ok(())
    }
}
