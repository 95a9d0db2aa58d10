//! # The Node Roster
//!
//! The aggregator exclusively owns this state. Nodes live behind a
//! reader-writer map of per-node mutexes: reads dominate (sweeps, roster
//! views), while the per-node mutex serializes the sequence check and
//! capacity updates for a single node. Cluster counters are atomics inside a
//! concurrent map, so heartbeat-path updates never take the roster write
//! lock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use dashmap::DashMap;
use shared_crypto::Ed25519PublicKey;
use shared_types::{
    ClusterRecord, ClusterState, NodeMetrics, NodeRecord, NodeState, ResourceAmounts,
};

use super::errors::AggregatorError;

/// A node as held by the roster: the shared record plus the verifying key
/// parsed once at registration (the signature hot path never re-parses key
/// bytes).
#[derive(Debug)]
pub struct RosterNode {
    pub record: NodeRecord,
    pub key: Ed25519PublicKey,
    /// Telemetry from the most recent accepted heartbeat.
    pub last_metrics: Option<NodeMetrics>,
    /// Jobs completed / failed on this node, feeding the reliability score.
    pub jobs_completed: u64,
    pub jobs_failed: u64,
}

impl RosterNode {
    /// Reliability as the completed fraction; neutral 0.5 with no history.
    pub fn reliability(&self) -> f64 {
        let total = self.jobs_completed + self.jobs_failed;
        if total == 0 {
            0.5
        } else {
            self.jobs_completed as f64 / total as f64
        }
    }
}

/// Shared handle to one node's serialized state.
pub type NodeSlot = Arc<Mutex<RosterNode>>;

/// The authoritative node map.
#[derive(Default)]
pub struct Roster {
    nodes: RwLock<HashMap<String, NodeSlot>>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a newly registered node. The caller has already validated the
    /// cluster and ownership; this only guards id reuse.
    pub fn insert(&self, record: NodeRecord, key: Ed25519PublicKey) -> Result<(), AggregatorError> {
        let mut nodes = self
            .nodes
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if nodes.contains_key(&record.node_id) {
            return Err(AggregatorError::KeyMismatch(record.node_id));
        }
        nodes.insert(
            record.node_id.clone(),
            Arc::new(Mutex::new(RosterNode {
                record,
                key,
                last_metrics: None,
                jobs_completed: 0,
                jobs_failed: 0,
            })),
        );
        Ok(())
    }

    /// Look up a node's slot.
    pub fn get(&self, node_id: &str) -> Option<NodeSlot> {
        self.nodes
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(node_id)
            .cloned()
    }

    /// Snapshot every node record. Sweeps and scheduling work off this; a
    /// heartbeat landing mid-snapshot is observed or not, both are correct.
    pub fn snapshot(&self) -> Vec<NodeRecord> {
        let slots: Vec<NodeSlot> = {
            let nodes = self
                .nodes
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            nodes.values().cloned().collect()
        };
        slots
            .iter()
            .map(|slot| {
                slot.lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .record
                    .clone()
            })
            .collect()
    }

    /// Number of registered node ids, tombstones included.
    pub fn len(&self) -> usize {
        self.nodes
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One cluster's registry entry; node counters are atomics so heartbeat and
/// monitor paths update them without locking the directory.
pub struct ClusterEntry {
    pub cluster_id: String,
    pub provider_address: String,
    pub region: String,
    pub state: ClusterState,
    pub total_nodes: AtomicU64,
    pub available_nodes: AtomicU64,
}

impl ClusterEntry {
    pub fn snapshot(&self) -> ClusterRecord {
        ClusterRecord {
            cluster_id: self.cluster_id.clone(),
            provider_address: self.provider_address.clone(),
            region: self.region.clone(),
            state: self.state,
            total_nodes: self.total_nodes.load(Ordering::Relaxed),
            available_nodes: self.available_nodes.load(Ordering::Relaxed),
        }
    }
}

/// Directory of clusters known to the aggregator.
#[derive(Default)]
pub struct ClusterDirectory {
    clusters: DashMap<String, ClusterEntry>,
}

impl ClusterDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or overwrite) a cluster. Counters reset only on first insert.
    pub fn upsert(&self, record: ClusterRecord) {
        match self.clusters.get_mut(&record.cluster_id) {
            Some(mut entry) => {
                entry.provider_address = record.provider_address;
                entry.region = record.region;
                entry.state = record.state;
            }
            None => {
                self.clusters.insert(
                    record.cluster_id.clone(),
                    ClusterEntry {
                        cluster_id: record.cluster_id,
                        provider_address: record.provider_address,
                        region: record.region,
                        state: record.state,
                        total_nodes: AtomicU64::new(record.total_nodes),
                        available_nodes: AtomicU64::new(record.available_nodes),
                    },
                );
            }
        }
    }

    /// Validate that `cluster_id` exists, is active, and is owned by
    /// `provider`. Returns the region for the node record.
    pub fn check_registration(
        &self,
        cluster_id: &str,
        provider: &str,
    ) -> Result<String, AggregatorError> {
        let entry = self
            .clusters
            .get(cluster_id)
            .ok_or_else(|| AggregatorError::UnknownCluster(cluster_id.to_string()))?;
        if entry.state != ClusterState::Active {
            return Err(AggregatorError::ClusterNotActive(cluster_id.to_string()));
        }
        if entry.provider_address != provider {
            return Err(AggregatorError::ProviderMismatch {
                provider: provider.to_string(),
                cluster: cluster_id.to_string(),
            });
        }
        Ok(entry.region.clone())
    }

    /// Adjust counters when a node joins the cluster.
    pub fn node_added(&self, cluster_id: &str) {
        if let Some(entry) = self.clusters.get(cluster_id) {
            entry.total_nodes.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Adjust the schedulable-node counter as a node enters or leaves the
    /// active state. INVARIANT: available <= total.
    pub fn node_availability_changed(&self, cluster_id: &str, now_available: bool) {
        let Some(entry) = self.clusters.get(cluster_id) else {
            return;
        };
        if now_available {
            let total = entry.total_nodes.load(Ordering::Relaxed);
            let _ = entry.available_nodes.fetch_update(
                Ordering::Relaxed,
                Ordering::Relaxed,
                |available| (available < total).then_some(available + 1),
            );
        } else {
            let _ = entry.available_nodes.fetch_update(
                Ordering::Relaxed,
                Ordering::Relaxed,
                |available| available.checked_sub(1),
            );
        }
    }

    /// Counters when a node leaves the cluster for good.
    pub fn node_removed(&self, cluster_id: &str, was_available: bool) {
        if let Some(entry) = self.clusters.get(cluster_id) {
            let _ = entry.total_nodes.fetch_update(
                Ordering::Relaxed,
                Ordering::Relaxed,
                |total| total.checked_sub(1),
            );
            if was_available {
                let _ = entry.available_nodes.fetch_update(
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                    |available| available.checked_sub(1),
                );
            }
        }
    }

    /// Snapshot every cluster record.
    pub fn snapshot(&self) -> Vec<ClusterRecord> {
        self.clusters.iter().map(|e| e.snapshot()).collect()
    }

    pub fn get(&self, cluster_id: &str) -> Option<ClusterRecord> {
        self.clusters.get(cluster_id).map(|e| e.snapshot())
    }
}

/// Reserve `per_node` on a locked node, failing without effect when the node
/// cannot cover it.
pub fn reserve_on(node: &mut RosterNode, per_node: &ResourceAmounts) -> Result<(), AggregatorError> {
    if !node.record.capacity.available.covers(per_node) {
        return Err(AggregatorError::InsufficientCapacity(
            node.record.node_id.clone(),
        ));
    }
    node.record.capacity.available = node.record.capacity.available.saturating_sub(per_node);
    Ok(())
}

/// Release a prior reservation, clamped so available never exceeds total.
pub fn release_on(node: &mut RosterNode, per_node: &ResourceAmounts) {
    let restored = node.record.capacity.available.saturating_add(per_node);
    node.record.capacity.available = ResourceAmounts {
        cpu_cores: restored.cpu_cores.min(node.record.capacity.total.cpu_cores),
        memory_gb: restored.memory_gb.min(node.record.capacity.total.memory_gb),
        gpus: restored.gpus.min(node.record.capacity.total.gpus),
        storage_gb: restored
            .storage_gb
            .min(node.record.capacity.total.storage_gb),
    };
    debug_assert!(node.record.capacity.is_consistent());
}
