//! Node scoring and deterministic tie-breaking.

use shared_crypto::sha256_hex;
use shared_types::NodeRecord;

use crate::config::SchedulerWeights;

/// Free-capacity fraction of a node, averaged over its resource dimensions.
pub fn headroom(node: &NodeRecord) -> f64 {
    let total = &node.capacity.total;
    let available = &node.capacity.available;
    let mut dims = 0u32;
    let mut sum = 0.0;
    for (avail, tot) in [
        (available.cpu_cores, total.cpu_cores),
        (available.memory_gb, total.memory_gb),
        (available.gpus, total.gpus),
        (available.storage_gb, total.storage_gb),
    ] {
        if tot > 0 {
            dims += 1;
            sum += avail as f64 / tot as f64;
        }
    }
    if dims == 0 {
        0.0
    } else {
        sum / f64::from(dims)
    }
}

/// Softmax over headroom values, smoothing relative capacity within one
/// cluster so a single nearly-empty node does not dominate.
pub fn softmax(values: &[f64]) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = values.iter().map(|v| (v - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Latency component: lower round-trip is better, mapped into (0, 1].
pub fn latency_score(latency_ms: f64) -> f64 {
    1.0 / (1.0 + latency_ms.max(0.0) / 1000.0)
}

/// Weighted node score given the node's softmaxed capacity share.
pub fn node_score(node: &NodeRecord, capacity_share: f64, weights: &SchedulerWeights) -> f64 {
    weights.capacity * capacity_share
        + weights.latency * latency_score(node.recent_latency_ms)
        + weights.reliability * node.reliability
}

/// Deterministic tie-break digest over `(job_id, node_ids)`.
///
/// Candidates with equal scores are ordered by this digest; wall-clock
/// ordering never participates.
pub fn tie_break_seed(job_id: &str, node_ids: &[String]) -> String {
    let mut sorted = node_ids.to_vec();
    sorted.sort_unstable();
    sha256_hex(format!("{job_id}|{}", sorted.join(",")).as_bytes())
}
