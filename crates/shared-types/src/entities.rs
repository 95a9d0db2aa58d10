//! # Core Domain Entities
//!
//! Defines the entities shared across subsystems: the node roster, clusters,
//! heartbeats, jobs and their scheduling decisions, usage records, outbox
//! entries, and chain events.
//!
//! ## Clusters
//!
//! - **Fleet**: `NodeRecord`, `NodeCapacity`, `NodeLocality`, `Heartbeat`
//! - **Jobs**: `Job`, `WorkloadSpec`, `ResourceDemand`, `SchedulingDecision`
//! - **Billing**: `UsageRecord`, `UsageMetrics`, `OutboxEntry`
//! - **Chain**: `ChainEvent`

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::time::Timestamp;

/// A 32-byte Ed25519 public key.
pub type PublicKey = [u8; 32];

// =============================================================================
// CLUSTER A: THE FLEET
// =============================================================================

/// Lifecycle state of a compute node.
///
/// `Deregistered` is terminal: once a node leaves, its id is never reused and
/// future submissions under it are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    Pending,
    Active,
    Stale,
    Draining,
    Offline,
    Deregistered,
}

impl NodeState {
    /// Whether a node in this state may receive new job placements.
    pub fn schedulable(&self) -> bool {
        matches!(self, NodeState::Active)
    }

    /// Whether this state is terminal.
    pub fn terminal(&self) -> bool {
        matches!(self, NodeState::Deregistered)
    }
}

/// Per-resource capacity of a node. `available` never exceeds `total`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceAmounts {
    pub cpu_cores: u64,
    pub memory_gb: u64,
    pub gpus: u64,
    pub storage_gb: u64,
}

impl ResourceAmounts {
    pub const ZERO: ResourceAmounts = ResourceAmounts {
        cpu_cores: 0,
        memory_gb: 0,
        gpus: 0,
        storage_gb: 0,
    };

    /// Component-wise `self >= other`.
    pub fn covers(&self, other: &ResourceAmounts) -> bool {
        self.cpu_cores >= other.cpu_cores
            && self.memory_gb >= other.memory_gb
            && self.gpus >= other.gpus
            && self.storage_gb >= other.storage_gb
    }

    /// Component-wise saturating subtraction.
    pub fn saturating_sub(&self, other: &ResourceAmounts) -> ResourceAmounts {
        ResourceAmounts {
            cpu_cores: self.cpu_cores.saturating_sub(other.cpu_cores),
            memory_gb: self.memory_gb.saturating_sub(other.memory_gb),
            gpus: self.gpus.saturating_sub(other.gpus),
            storage_gb: self.storage_gb.saturating_sub(other.storage_gb),
        }
    }

    /// Component-wise saturating addition.
    pub fn saturating_add(&self, other: &ResourceAmounts) -> ResourceAmounts {
        ResourceAmounts {
            cpu_cores: self.cpu_cores.saturating_add(other.cpu_cores),
            memory_gb: self.memory_gb.saturating_add(other.memory_gb),
            gpus: self.gpus.saturating_add(other.gpus),
            storage_gb: self.storage_gb.saturating_add(other.storage_gb),
        }
    }
}

/// Total and currently available capacity of a node, plus GPU model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeCapacity {
    pub total: ResourceAmounts,
    pub available: ResourceAmounts,
    /// GPU model string, empty when the node has no GPUs.
    #[serde(default)]
    pub gpu_type: String,
}

impl NodeCapacity {
    /// Capacity with everything available.
    pub fn unused(total: ResourceAmounts, gpu_type: impl Into<String>) -> Self {
        Self {
            total,
            available: total,
            gpu_type: gpu_type.into(),
        }
    }

    /// INVARIANT: available <= total, component-wise.
    pub fn is_consistent(&self) -> bool {
        self.total.covers(&self.available)
    }
}

/// Physical placement of a node, used for locality constraints.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeLocality {
    pub region: String,
    pub datacenter: String,
    pub zone: String,
    pub rack: String,
}

/// A registered compute node as seen by the rest of the system.
///
/// The aggregator exclusively owns the authoritative roster; everything else
/// works with snapshots of this record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRecord {
    pub node_id: String,
    pub cluster_id: String,
    pub provider_address: String,
    /// Registered once; never changes afterwards.
    pub public_key: PublicKey,
    pub hostname: String,
    pub capacity: NodeCapacity,
    pub locality: NodeLocality,
    pub state: NodeState,
    /// Strictly increasing per node; heartbeats at or below it are replays.
    pub last_sequence: u64,
    pub last_heartbeat_at: Timestamp,
    /// Recent round-trip latency in milliseconds, smoothed by the aggregator.
    pub recent_latency_ms: f64,
    /// Fraction of jobs on this node that completed successfully.
    pub reliability: f64,
}

/// Lifecycle state of a cluster. Only `Active` clusters host new jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterState {
    Pending,
    Active,
    Draining,
    Terminated,
}

/// A provider-controlled group of nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterRecord {
    pub cluster_id: String,
    pub provider_address: String,
    pub region: String,
    pub state: ClusterState,
    pub total_nodes: u64,
    pub available_nodes: u64,
}

/// Telemetry carried by a heartbeat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMetrics {
    pub cpu_util: f64,
    pub mem_util: f64,
    pub load1m: f64,
    pub gpu_util: f64,
    /// Raw scheduler state string from the node agent (e.g. slurm state).
    #[serde(default)]
    pub slurm_state: String,
}

/// A signed heartbeat from a node agent.
///
/// The signature covers the canonical JSON of all other fields: keys sorted
/// lexicographically, no insignificant whitespace, ed25519 over the bytes,
/// base64-encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Heartbeat {
    pub node_id: String,
    pub cluster_id: String,
    pub sequence: u64,
    pub timestamp: Timestamp,
    pub metrics: NodeMetrics,
    /// Base64 ed25519 signature over `HeartbeatBody`.
    pub signature: String,
}

impl Heartbeat {
    /// The signed portion of the heartbeat (everything but the signature).
    pub fn body(&self) -> HeartbeatBody {
        HeartbeatBody {
            node_id: self.node_id.clone(),
            cluster_id: self.cluster_id.clone(),
            sequence: self.sequence,
            timestamp: self.timestamp,
            metrics: self.metrics.clone(),
        }
    }
}

/// The signed fields of a heartbeat, in wire order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatBody {
    pub node_id: String,
    pub cluster_id: String,
    pub sequence: u64,
    pub timestamp: Timestamp,
    pub metrics: NodeMetrics,
}

// =============================================================================
// CLUSTER B: JOBS & SCHEDULING
// =============================================================================

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Submitted,
    Scheduled,
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    /// Completed, failed, and cancelled are terminal.
    pub fn terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Cancelled
        )
    }
}

/// The workload a job runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadSpec {
    pub image: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// Resource demand of a job: a node count and per-node amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDemand {
    pub nodes: u64,
    pub cpu_per_node: u64,
    pub mem_gb_per_node: u64,
    pub gpus_per_node: u64,
    #[serde(default)]
    pub storage_gb_per_node: u64,
}

impl ResourceDemand {
    /// Per-node demand as resource amounts.
    pub fn per_node(&self) -> ResourceAmounts {
        ResourceAmounts {
            cpu_cores: self.cpu_per_node,
            memory_gb: self.mem_gb_per_node,
            gpus: self.gpus_per_node,
            storage_gb: self.storage_gb_per_node,
        }
    }
}

/// Optional placement constraints attached to a job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacementConstraints {
    /// Allowed regions; empty means any region.
    #[serde(default)]
    pub regions: Vec<String>,
    /// Required GPU model; empty means any (or none).
    #[serde(default)]
    pub gpu_type: String,
    /// Locality requirement for the selected node set.
    #[serde(default)]
    pub locality: LocalityConstraint,
}

/// How tightly the selected nodes must be colocated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocalityConstraint {
    #[default]
    None,
    SameZone,
    SameRack,
}

/// A customer's request to run a workload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub job_id: String,
    pub offering_id: String,
    pub customer_address: String,
    pub escrow_id: String,
    pub workload: WorkloadSpec,
    pub resources: ResourceDemand,
    #[serde(default)]
    pub constraints: PlacementConstraints,
    pub max_runtime_seconds: u64,
    pub state: JobState,
    /// Set on entry to `Scheduled` and never rewritten.
    pub decision: Option<SchedulingDecision>,
    pub submitted_at: Timestamp,
    pub terminal_at: Option<Timestamp>,
    pub exit_code: Option<i32>,
}

/// The scheduler's placement for a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulingDecision {
    pub job_id: String,
    pub cluster_id: String,
    /// Exactly `job.resources.nodes` ids, all in `cluster_id`.
    pub node_ids: Vec<String>,
    pub score: f64,
    pub decided_at: Timestamp,
    /// Hex digest used for the deterministic tie-break.
    pub tie_breaker_seed: String,
}

/// One line of the append-only job audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionRecord {
    pub job_id: String,
    pub from: JobState,
    pub to: JobState,
    pub reason: String,
    pub timestamp: Timestamp,
}

// =============================================================================
// CLUSTER C: BILLING
// =============================================================================

/// Raw cumulative counters as collected on a node, monotonically
/// non-decreasing per resource. An apparent decrease means the collecting
/// agent restarted and began a new epoch.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CumulativeCounters {
    pub cpu_core_seconds: f64,
    pub mem_gb_seconds: f64,
    pub gpu_seconds: f64,
    pub storage_gb_seconds: f64,
    pub network_gb: f64,
}

impl CumulativeCounters {
    /// Whether every component is finite and non-negative.
    pub fn is_sane(&self) -> bool {
        [
            self.cpu_core_seconds,
            self.mem_gb_seconds,
            self.gpu_seconds,
            self.storage_gb_seconds,
            self.network_gb,
        ]
        .iter()
        .all(|v| v.is_finite() && *v >= 0.0)
    }

    /// Whether every component of `self` is at or above `other`.
    pub fn dominates(&self, other: &CumulativeCounters) -> bool {
        self.cpu_core_seconds >= other.cpu_core_seconds
            && self.mem_gb_seconds >= other.mem_gb_seconds
            && self.gpu_seconds >= other.gpu_seconds
            && self.storage_gb_seconds >= other.storage_gb_seconds
            && self.network_gb >= other.network_gb
    }
}

/// One periodic metric sample for a resource, submitted in a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsRecord {
    pub resource_id: String,
    pub at: Timestamp,
    pub counters: CumulativeCounters,
}

/// Billable metric components of a usage record.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetrics {
    pub cpu_hours: f64,
    pub mem_gb_hours: f64,
    pub gpu_hours: f64,
    pub storage_gb_hours: f64,
    pub network_gb: f64,
}

/// A signed, billable usage record covering `(period_start, period_end]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    /// Deterministic: a pure function of `(resource_id, period_start,
    /// period_end)`, so re-submission is naturally idempotent.
    pub usage_id: String,
    pub resource_id: String,
    pub period_start: Timestamp,
    pub period_end: Timestamp,
    pub metrics: UsageMetrics,
    pub is_final: bool,
    /// Base64 ed25519 provider signature over the canonical record.
    pub provider_signature: String,
}

/// Kind tag for outbox entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutboxKind {
    Usage,
    Settlement,
    LifecycleCallback,
}

/// Delivery state of an outbox entry.
///
/// `Acked` and `Dead` are terminal; an entry reaches exactly one of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboxState {
    Pending,
    Inflight,
    Acked,
    Dead,
}

/// A pending outbound record awaiting at-least-once delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxEntry {
    pub entry_id: String,
    pub kind: OutboxKind,
    pub payload: serde_json::Value,
    /// Unique across the outbox lifetime; duplicates are rejected at insert.
    pub idempotency_key: String,
    /// Groups entries that must flush in insertion order.
    pub resource_key: String,
    pub attempt_count: u32,
    pub next_attempt_at: Timestamp,
    pub state: OutboxState,
    /// Present only while `Inflight`; identifies the claiming flusher.
    pub lease: Option<String>,
    pub inserted_at: Timestamp,
}

// =============================================================================
// CLUSTER D: CHAIN
// =============================================================================

/// A parsed, canonical event from the consensus-layer stream.
///
/// `event_id` is stable and reproducible; subscribers see each event at least
/// once per subscription window and dedupe by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainEvent {
    /// `hex(sha256(tx_hash || raw_type || attribute_index))`.
    pub event_id: String,
    /// Canonical type, e.g. `order.created`.
    pub event_type: String,
    pub block_height: u64,
    pub timestamp: Timestamp,
    pub tx_hash: String,
    /// Position of the source event within the transaction result.
    pub tx_index: u32,
    pub attributes: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_amounts_covers() {
        let big = ResourceAmounts {
            cpu_cores: 8,
            memory_gb: 32,
            gpus: 2,
            storage_gb: 100,
        };
        let small = ResourceAmounts {
            cpu_cores: 4,
            memory_gb: 16,
            gpus: 0,
            storage_gb: 50,
        };
        assert!(big.covers(&small));
        assert!(!small.covers(&big));
        assert!(big.covers(&big));
    }

    #[test]
    fn test_capacity_consistency() {
        let total = ResourceAmounts {
            cpu_cores: 8,
            memory_gb: 32,
            gpus: 0,
            storage_gb: 100,
        };
        let mut cap = NodeCapacity::unused(total, "");
        assert!(cap.is_consistent());

        cap.available.cpu_cores = 9;
        assert!(!cap.is_consistent());
    }

    #[test]
    fn test_terminal_states() {
        assert!(JobState::Completed.terminal());
        assert!(JobState::Failed.terminal());
        assert!(JobState::Cancelled.terminal());
        assert!(!JobState::Running.terminal());
        assert!(NodeState::Deregistered.terminal());
        assert!(!NodeState::Offline.terminal());
    }

    #[test]
    fn test_heartbeat_body_drops_signature() {
        let hb = Heartbeat {
            node_id: "n1".into(),
            cluster_id: "c1".into(),
            sequence: 7,
            timestamp: Timestamp::from_secs(1000),
            metrics: NodeMetrics {
                cpu_util: 0.5,
                mem_util: 0.25,
                load1m: 1.0,
                gpu_util: 0.0,
                slurm_state: "idle".into(),
            },
            signature: "sig".into(),
        };
        let body = serde_json::to_value(hb.body()).unwrap();
        assert!(body.get("signature").is_none());
        assert_eq!(body["sequence"], 7);
    }

    #[test]
    fn test_wire_field_names_are_camel_case() {
        let demand = ResourceDemand {
            nodes: 2,
            cpu_per_node: 4,
            mem_gb_per_node: 8,
            gpus_per_node: 0,
            storage_gb_per_node: 0,
        };
        let v = serde_json::to_value(demand).unwrap();
        assert!(v.get("cpuPerNode").is_some());
        assert!(v.get("memGbPerNode").is_some());
    }
}
