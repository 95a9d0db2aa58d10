//! Per-resource accounting state and delta computation.

use shared_types::{CumulativeCounters, Timestamp, UsageMetrics};

/// What the reporter remembers about one resource between samples.
#[derive(Debug, Clone)]
pub struct ResourceLedger {
    /// Time of the last absorbed sample; the next period starts here.
    pub last_at: Timestamp,
    /// Counters at that sample.
    pub last_counters: CumulativeCounters,
    /// End of the last emitted record, enforcing non-overlap.
    pub last_emitted_end: Option<Timestamp>,
    /// Set once the final record is out; nothing further may be emitted.
    pub finalized: bool,
}

impl ResourceLedger {
    pub fn new(at: Timestamp, counters: CumulativeCounters) -> Self {
        Self {
            last_at: at,
            last_counters: counters,
            last_emitted_end: None,
            finalized: false,
        }
    }
}

/// Counter delta across one period.
///
/// Cumulative counters never decrease; an apparent decrease means the
/// collecting agent restarted, so the current sample is a fresh epoch and
/// counts from zero.
pub fn delta(previous: &CumulativeCounters, current: &CumulativeCounters) -> CumulativeCounters {
    if !current.dominates(previous) {
        return *current;
    }
    CumulativeCounters {
        cpu_core_seconds: current.cpu_core_seconds - previous.cpu_core_seconds,
        mem_gb_seconds: current.mem_gb_seconds - previous.mem_gb_seconds,
        gpu_seconds: current.gpu_seconds - previous.gpu_seconds,
        storage_gb_seconds: current.storage_gb_seconds - previous.storage_gb_seconds,
        network_gb: current.network_gb - previous.network_gb,
    }
}

/// Convert a delta into billable units (seconds become hours).
pub fn to_usage_metrics(delta: &CumulativeCounters) -> UsageMetrics {
    UsageMetrics {
        cpu_hours: delta.cpu_core_seconds / 3600.0,
        mem_gb_hours: delta.mem_gb_seconds / 3600.0,
        gpu_hours: delta.gpu_seconds / 3600.0,
        storage_gb_hours: delta.storage_gb_seconds / 3600.0,
        network_gb: delta.network_gb,
    }
}
