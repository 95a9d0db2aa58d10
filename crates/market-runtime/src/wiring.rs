//! Adapters binding the subsystems onto each other's ports.
//!
//! Each collaborator sees only the narrow capability it needs; the concrete
//! subsystems stay ignorant of one another.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use gm_01_node_aggregator::{MetricsSink, NodeAggregator};
use gm_03_hpc_scheduler::{schedule, ScheduleError, SchedulerWeights};
use gm_04_job_lifecycle::{
    BillingPort, FleetPort, JobLifecycleEngine, PlacementFailure, PlacementProvider,
    SettlementKind,
};
use gm_05_usage_reporter::{ReporterError, UsageReporter};
use gm_06_outbox::{OutboxError, OutboxStore};
use shared_bus::{EventFilter, EventTopic, InMemoryEventBus, MarketEvent};
use shared_crypto::sha256_hex;
use shared_types::{
    ChainEvent, Job, MetricsRecord, OutboxEntry, OutboxKind, OutboxState, ResourceAmounts,
    SchedulingDecision, TimeSource, Timestamp,
};
use tracing::{debug, info, warn};

/// Scheduler over live roster snapshots.
pub struct SchedulerAdapter {
    pub aggregator: Arc<NodeAggregator>,
    pub weights: SchedulerWeights,
    pub time: Arc<dyn TimeSource>,
}

impl PlacementProvider for SchedulerAdapter {
    fn place(&self, job: &Job) -> Result<SchedulingDecision, PlacementFailure> {
        let nodes = self.aggregator.roster_snapshot();
        let clusters = self.aggregator.cluster_snapshot();
        schedule(job, &nodes, &clusters, &self.weights, self.time.now()).map_err(|e| {
            PlacementFailure {
                // A roster can always change; only a nonsensical demand is
                // beyond retrying.
                retriable: !matches!(e, ScheduleError::InvalidDemand(_)),
                reason: e.to_string(),
            }
        })
    }
}

/// Fleet capacity bookkeeping over the aggregator.
pub struct FleetAdapter {
    pub aggregator: Arc<NodeAggregator>,
}

impl FleetPort for FleetAdapter {
    fn reserve(
        &self,
        decision: &SchedulingDecision,
        per_node: &ResourceAmounts,
    ) -> Result<(), String> {
        self.aggregator
            .reserve_capacity(decision, per_node)
            .map_err(|e| e.to_string())
    }

    fn release(&self, node_ids: &[String], per_node: &ResourceAmounts) {
        self.aggregator.release_capacity(node_ids, per_node);
    }

    fn record_outcome(&self, node_ids: &[String], success: bool) {
        self.aggregator.record_job_outcome(node_ids, success);
    }
}

/// Billing side effects over the reporter and outbox.
pub struct BillingAdapter {
    pub reporter: Arc<UsageReporter>,
    pub store: Arc<dyn OutboxStore>,
    pub time: Arc<dyn TimeSource>,
}

#[async_trait]
impl BillingPort for BillingAdapter {
    async fn finalize_usage(&self, resource_id: &str, at: Timestamp) -> Result<(), String> {
        match self.reporter.finalize_resource(resource_id, at).await {
            Ok(_) => Ok(()),
            // A job that never reported usage has no books to close; a
            // double-finalize already closed them.
            Err(ReporterError::NoSnapshot(_)) | Err(ReporterError::AlreadyFinal(_)) => Ok(()),
            Err(e) => Err(e.to_string()),
        }
    }

    async fn settle(&self, job: &Job, kind: SettlementKind) -> Result<(), String> {
        let kind_tag = match kind {
            SettlementKind::Completed => "completed",
            SettlementKind::FailedPartial => "failed-partial",
            SettlementKind::Cancelled => "cancelled",
            SettlementKind::Refund => "refund",
        };
        // One settlement per (job, outcome), whenever it is produced.
        let idempotency_key = sha256_hex(format!("settlement/{}/{kind_tag}", job.job_id).as_bytes());
        let now = self.time.now();
        let entry = OutboxEntry {
            entry_id: idempotency_key.clone(),
            kind: OutboxKind::Settlement,
            payload: serde_json::json!({
                "jobId": job.job_id,
                "escrowId": job.escrow_id,
                "customerAddress": job.customer_address,
                "outcome": kind_tag,
                "exitCode": job.exit_code,
                "settledAt": now.to_rfc3339(),
            }),
            idempotency_key,
            resource_key: job.job_id.clone(),
            attempt_count: 0,
            next_attempt_at: now,
            state: OutboxState::Pending,
            lease: None,
            inserted_at: now,
        };
        match self.store.insert(entry).await {
            Ok(()) => Ok(()),
            Err(OutboxError::DuplicateKey(existing)) => {
                debug!(job_id = %job.job_id, existing, "Settlement already enqueued");
                Ok(())
            }
            Err(e) => Err(e.to_string()),
        }
    }
}

/// Metrics sink forwarding validated samples into the reporter.
pub struct ReporterSink {
    pub reporter: Arc<UsageReporter>,
}

#[async_trait]
impl MetricsSink for ReporterSink {
    async fn submit(&self, record: MetricsRecord) {
        match self
            .reporter
            .record_metrics(&record.resource_id, record.counters, record.at)
            .await
        {
            Ok(_) => {}
            Err(e) => warn!(resource_id = %record.resource_id, error = %e, "Sample rejected"),
        }
    }
}

/// Drive order/job state from chain events, deduping by event id.
///
/// Chain delivery is at-least-once with no cross-reconnect ordering, so the
/// consumer keeps a seen-set and reads `(block_height, tx_index)` only for
/// logging.
pub struct ChainDispatcher {
    lifecycle: Arc<JobLifecycleEngine>,
    seen: Mutex<HashSet<String>>,
}

impl ChainDispatcher {
    pub fn new(lifecycle: Arc<JobLifecycleEngine>) -> Self {
        Self {
            lifecycle,
            seen: Mutex::new(HashSet::new()),
        }
    }

    /// Pump chain events from the bus until it closes or shutdown fires.
    pub async fn run(
        self: Arc<Self>,
        bus: Arc<InMemoryEventBus>,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) {
        let mut subscription = bus.subscribe(EventFilter::topics(vec![EventTopic::Chain]));
        loop {
            tokio::select! {
                event = subscription.recv() => {
                    match event {
                        Some(MarketEvent::ChainEventReceived { event }) => {
                            self.handle(&event).await;
                        }
                        Some(_) => {}
                        None => return,
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    }

    async fn handle(&self, event: &ChainEvent) {
        {
            let mut seen = self
                .seen
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if !seen.insert(event.event_id.clone()) {
                debug!(event_id = %event.event_id, "Duplicate chain event dropped");
                return;
            }
        }
        debug!(
            event_type = %event.event_type,
            height = event.block_height,
            tx_index = event.tx_index,
            "Chain event"
        );

        match event.event_type.as_str() {
            "hpc_job.status_changed" => {
                let (Some(job_id), Some(status)) = (
                    event.attributes.get("job_id"),
                    event.attributes.get("status"),
                ) else {
                    warn!(event_id = %event.event_id, "Status event missing attributes");
                    return;
                };
                let outcome = match status.as_str() {
                    "queued" => self.lifecycle.acknowledge_dispatch(job_id).await,
                    "running" => self.lifecycle.report_started(job_id).await,
                    "completed" => self.lifecycle.report_completed(job_id, 0).await,
                    "failed" => self.lifecycle.report_failed(job_id, "chain status").await,
                    other => {
                        debug!(status = other, "Ignored job status");
                        return;
                    }
                };
                if let Err(e) = outcome {
                    warn!(job_id = %job_id, error = %e, "Chain-driven transition failed");
                }
            }
            "settlement.executed" => {
                info!(
                    event_id = %event.event_id,
                    height = event.block_height,
                    "Settlement executed on-chain"
                );
            }
            // Orders and bids are owned by the on-chain order book; the core
            // only observes them.
            other => debug!(event_type = other, "Chain event observed"),
        }
    }
}
