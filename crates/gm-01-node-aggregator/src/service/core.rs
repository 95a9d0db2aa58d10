//! Aggregator service: the surface node agents talk to.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use shared_bus::{EventPublisher, MarketEvent};
use shared_crypto::{to_canonical_bytes, Ed25519PublicKey};
use shared_types::{
    ClusterRecord, Heartbeat, MetricsRecord, NodeCapacity, NodeLocality, NodeRecord, NodeState,
    ResourceAmounts, SchedulingDecision, TimeSource, Timestamp,
};
use tracing::{debug, info, warn};

use crate::domain::roster::{release_on, reserve_on};
use crate::domain::{AggregatorConfig, AggregatorError, ClusterDirectory, Roster};
use crate::ports::MetricsSink;

/// A node agent's registration request.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterNodeRequest {
    pub node_id: String,
    pub cluster_id: String,
    pub provider_address: String,
    /// Raw ed25519 public key bytes.
    pub public_key: [u8; 32],
    pub hostname: String,
    pub capacity: ResourceAmounts,
    #[serde(default)]
    pub gpu_type: String,
    #[serde(default)]
    pub locality: NodeLocality,
}

/// Per-batch outcome of a metrics submission.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub accepted: usize,
    /// `(index, reason)` for each rejected record.
    pub rejected: Vec<(usize, String)>,
}

/// The node aggregator.
///
/// Owns the roster and cluster directory exclusively; other components read
/// through snapshots and mutate only through the methods here.
pub struct NodeAggregator {
    roster: Roster,
    clusters: ClusterDirectory,
    config: AggregatorConfig,
    time: Arc<dyn TimeSource>,
    bus: Arc<dyn EventPublisher>,
    metrics_sink: Arc<dyn MetricsSink>,
    /// Malformed or unverifiable submissions, counted and dropped.
    rejected: AtomicU64,
}

impl NodeAggregator {
    pub fn new(
        config: AggregatorConfig,
        time: Arc<dyn TimeSource>,
        bus: Arc<dyn EventPublisher>,
        metrics_sink: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            roster: Roster::new(),
            clusters: ClusterDirectory::new(),
            config,
            time,
            bus,
            metrics_sink,
            rejected: AtomicU64::new(0),
        }
    }

    /// Record a cluster (from provider onboarding or a chain event).
    pub fn record_cluster(&self, record: ClusterRecord) {
        debug!(cluster_id = %record.cluster_id, state = ?record.state, "Cluster recorded");
        self.clusters.upsert(record);
    }

    /// Register a node into the fleet.
    ///
    /// Re-registration with the same key is answered as success (the existing
    /// record stands); a different key is rejected, since a node's key never
    /// changes after registration.
    pub async fn register_node(
        &self,
        req: RegisterNodeRequest,
    ) -> Result<(), AggregatorError> {
        let key = Ed25519PublicKey::from_bytes(req.public_key)
            .map_err(|e| self.reject("bad-key", AggregatorError::InvalidSignature(e.to_string())))?;

        if let Some(slot) = self.roster.get(&req.node_id) {
            let node = slot.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            if node.record.state == NodeState::Deregistered {
                return Err(self.reject(
                    "deregistered",
                    AggregatorError::NodeDeregistered(req.node_id.clone()),
                ));
            }
            if node.record.public_key == req.public_key {
                // Idempotent duplicate.
                return Ok(());
            }
            return Err(self.reject("key-mismatch", AggregatorError::KeyMismatch(req.node_id.clone())));
        }

        self.clusters
            .check_registration(&req.cluster_id, &req.provider_address)?;

        let now = self.time.now();
        let record = NodeRecord {
            node_id: req.node_id.clone(),
            cluster_id: req.cluster_id.clone(),
            provider_address: req.provider_address,
            public_key: req.public_key,
            hostname: req.hostname,
            capacity: NodeCapacity::unused(req.capacity, req.gpu_type),
            locality: req.locality,
            state: NodeState::Pending,
            last_sequence: 0,
            // Registration counts as the first sign of life so a node that
            // never heartbeats still times out.
            last_heartbeat_at: now,
            recent_latency_ms: 0.0,
            reliability: 0.5,
        };
        self.roster.insert(record, key)?;
        self.clusters.node_added(&req.cluster_id);

        info!(node_id = %req.node_id, cluster_id = %req.cluster_id, "Node registered");
        self.bus
            .publish(MarketEvent::NodeRegistered {
                node_id: req.node_id,
                cluster_id: req.cluster_id,
            })
            .await;
        Ok(())
    }

    /// Apply a signed heartbeat.
    ///
    /// The whole check-and-advance runs under the node's mutex, so the
    /// sequence invariant holds under concurrent submission.
    pub async fn submit_heartbeat(&self, hb: Heartbeat) -> Result<(), AggregatorError> {
        let now = self.time.now();
        let slot = self.roster.get(&hb.node_id).ok_or_else(|| {
            self.reject("unknown-node", AggregatorError::UnknownNode(hb.node_id.clone()))
        })?;

        let became_active = {
            let mut node = slot.lock().unwrap_or_else(std::sync::PoisonError::into_inner);

            if node.record.state == NodeState::Deregistered {
                return Err(self.reject(
                    "deregistered",
                    AggregatorError::NodeDeregistered(hb.node_id.clone()),
                ));
            }
            if hb.cluster_id != node.record.cluster_id {
                return Err(self.reject(
                    "cluster-mismatch",
                    AggregatorError::ClusterMismatch {
                        got: hb.cluster_id.clone(),
                        registered: node.record.cluster_id.clone(),
                    },
                ));
            }
            let skew = hb.timestamp.millis_since(now);
            if skew > self.config.max_future_skew_ms {
                return Err(self.reject("timestamp-skew", AggregatorError::TimestampSkew {
                    skew_ms: skew,
                }));
            }

            // Signature over the canonical body, under the key cached at
            // registration.
            let body = to_canonical_bytes(&hb.body())
                .map_err(|e| AggregatorError::InvalidSignature(e.to_string()))?;
            node.key.verify_base64(&body, &hb.signature).map_err(|e| {
                self.reject("bad-signature", AggregatorError::InvalidSignature(e.to_string()))
            })?;

            // Replay check after authenticity: a replayed-but-valid frame is
            // a state conflict, not a forgery.
            if hb.sequence <= node.record.last_sequence {
                return Err(self.reject("replay", AggregatorError::SequenceReplay {
                    got: hb.sequence,
                    last: node.record.last_sequence,
                }));
            }

            node.record.last_sequence = hb.sequence;
            node.record.last_heartbeat_at = now;

            // One-sided clock offset as the latency proxy, smoothed.
            let sample = now.millis_since(hb.timestamp) as f64;
            let alpha = self.config.latency_alpha;
            node.record.recent_latency_ms = if node.record.recent_latency_ms == 0.0 {
                sample
            } else {
                alpha * sample + (1.0 - alpha) * node.record.recent_latency_ms
            };
            node.last_metrics = Some(hb.metrics.clone());

            let was_active = node.record.state == NodeState::Active;
            if !was_active {
                node.record.state = NodeState::Active;
            }
            !was_active
        };

        if became_active {
            self.clusters.node_availability_changed(&hb.cluster_id, true);
        }

        grid_telemetry::metrics::HEARTBEATS_ACCEPTED.inc();
        debug!(node_id = %hb.node_id, sequence = hb.sequence, "Heartbeat accepted");
        self.bus
            .publish(MarketEvent::HeartbeatAccepted { heartbeat: hb })
            .await;
        Ok(())
    }

    /// Accept a batch of per-resource metric samples; each record validates
    /// independently and valid ones flow to the metrics sink.
    pub async fn submit_metrics_batch(
        &self,
        node_id: &str,
        records: Vec<MetricsRecord>,
    ) -> Result<BatchOutcome, AggregatorError> {
        let slot = self.roster.get(node_id).ok_or_else(|| {
            self.reject("unknown-node", AggregatorError::UnknownNode(node_id.to_string()))
        })?;
        {
            let node = slot.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            if node.record.state == NodeState::Deregistered {
                return Err(self.reject(
                    "deregistered",
                    AggregatorError::NodeDeregistered(node_id.to_string()),
                ));
            }
        }

        let now = self.time.now();
        let mut outcome = BatchOutcome {
            accepted: 0,
            rejected: Vec::new(),
        };
        for (index, record) in records.into_iter().enumerate() {
            if index >= self.config.max_batch_len {
                outcome.rejected.push((index, "batch too large".into()));
                continue;
            }
            if !record.counters.is_sane() {
                outcome.rejected.push((index, "non-finite counter".into()));
                continue;
            }
            if record.at.millis_since(now) > self.config.max_future_skew_ms {
                outcome.rejected.push((index, "timestamp skew".into()));
                continue;
            }
            self.metrics_sink.submit(record).await;
            outcome.accepted += 1;
        }
        if !outcome.rejected.is_empty() {
            self.rejected
                .fetch_add(outcome.rejected.len() as u64, Ordering::Relaxed);
        }
        Ok(outcome)
    }

    /// Terminal removal of a node. Future submissions under this id are
    /// rejected forever.
    pub async fn deregister(&self, node_id: &str, reason: &str) -> Result<(), AggregatorError> {
        let slot = self
            .roster
            .get(node_id)
            .ok_or_else(|| AggregatorError::UnknownNode(node_id.to_string()))?;

        let (cluster_id, was_available) = {
            let mut node = slot.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            if node.record.state == NodeState::Deregistered {
                return Ok(()); // already terminal
            }
            let was_available = node.record.state.schedulable();
            node.record.state = NodeState::Deregistered;
            (node.record.cluster_id.clone(), was_available)
        };
        self.clusters.node_removed(&cluster_id, was_available);

        warn!(node_id, reason, "Node deregistered");
        self.bus
            .publish(MarketEvent::NodeDeregistered {
                node_id: node_id.to_string(),
                reason: reason.to_string(),
            })
            .await;
        Ok(())
    }

    /// Apply a health classification produced by the monitor.
    ///
    /// `observed_beat` is the `last_heartbeat_at` value the sweep classified
    /// against; if a heartbeat has landed since, the transition is stale and
    /// skipped. Returns the applied `(from, to)` pair, if any.
    pub fn apply_health_state(
        &self,
        node_id: &str,
        to: NodeState,
        observed_beat: Timestamp,
    ) -> Result<Option<(NodeState, NodeState)>, AggregatorError> {
        let slot = self
            .roster
            .get(node_id)
            .ok_or_else(|| AggregatorError::UnknownNode(node_id.to_string()))?;
        let mut node = slot.lock().unwrap_or_else(std::sync::PoisonError::into_inner);

        if node.record.last_heartbeat_at != observed_beat {
            return Ok(None); // raced a fresh heartbeat; next sweep re-evaluates
        }
        let from = node.record.state;
        if from == to || from.terminal() {
            return Ok(None);
        }
        node.record.state = to;
        let cluster_id = node.record.cluster_id.clone();
        drop(node);

        // Scheduling eligibility changed in either direction.
        if from.schedulable() && !to.schedulable() {
            self.clusters.node_availability_changed(&cluster_id, false);
        } else if !from.schedulable() && to.schedulable() {
            self.clusters.node_availability_changed(&cluster_id, true);
        }
        Ok(Some((from, to)))
    }

    /// Reserve per-node capacity on every node of a placement; all-or-nothing.
    pub fn reserve_capacity(
        &self,
        decision: &SchedulingDecision,
        per_node: &ResourceAmounts,
    ) -> Result<(), AggregatorError> {
        let mut reserved: Vec<&String> = Vec::with_capacity(decision.node_ids.len());
        for node_id in &decision.node_ids {
            let slot = self
                .roster
                .get(node_id)
                .ok_or_else(|| AggregatorError::UnknownNode(node_id.clone()))?;
            let mut node = slot.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            match reserve_on(&mut node, per_node) {
                Ok(()) => reserved.push(node_id),
                Err(e) => {
                    drop(node);
                    // Roll back what was taken so far.
                    for taken in reserved {
                        if let Some(slot) = self.roster.get(taken) {
                            let mut node =
                                slot.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                            release_on(&mut node, per_node);
                        }
                    }
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Release a prior reservation.
    pub fn release_capacity(&self, node_ids: &[String], per_node: &ResourceAmounts) {
        for node_id in node_ids {
            if let Some(slot) = self.roster.get(node_id) {
                let mut node = slot.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                release_on(&mut node, per_node);
            }
        }
    }

    /// Feed a finished job back into per-node reliability.
    pub fn record_job_outcome(&self, node_ids: &[String], success: bool) {
        for node_id in node_ids {
            if let Some(slot) = self.roster.get(node_id) {
                let mut node = slot.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                if success {
                    node.jobs_completed += 1;
                } else {
                    node.jobs_failed += 1;
                }
                let reliability = node.reliability();
                node.record.reliability = reliability;
            }
        }
    }

    /// Current roster snapshot (scheduler and monitor input).
    pub fn roster_snapshot(&self) -> Vec<NodeRecord> {
        self.roster.snapshot()
    }

    /// Current cluster snapshot.
    pub fn cluster_snapshot(&self) -> Vec<ClusterRecord> {
        self.clusters.snapshot()
    }

    /// One node's record, if registered.
    pub fn node(&self, node_id: &str) -> Option<NodeRecord> {
        self.roster.get(node_id).map(|slot| {
            slot.lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .record
                .clone()
        })
    }

    /// One cluster's record, if known.
    pub fn cluster(&self, cluster_id: &str) -> Option<ClusterRecord> {
        self.clusters.get(cluster_id)
    }

    /// Total submissions dropped for validation failures.
    pub fn rejected_count(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    fn reject(&self, reason: &str, err: AggregatorError) -> AggregatorError {
        self.rejected.fetch_add(1, Ordering::Relaxed);
        grid_telemetry::metrics::SUBMISSIONS_REJECTED
            .with_label_values(&[reason])
            .inc();
        err
    }
}
