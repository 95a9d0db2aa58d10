//! The usage reporter.
//!
//! Turns raw cumulative counters into discrete, signed, billable usage
//! records and hands them to the outbox for at-least-once delivery. The
//! reporter owns the outbox; nothing else writes usage entries.
//!
//! Work for one resource is serialized under that resource's lock, the same
//! way the aggregator serializes per node and the lifecycle engine per job:
//! the read-build-enqueue-advance sequence runs as a unit, so two samples
//! for the same resource can never interleave into overlapping periods.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use gm_06_outbox::{OutboxError, OutboxStore};
use shared_bus::{EventPublisher, MarketEvent};
use shared_crypto::{to_canonical_bytes, usage_id, Ed25519KeyPair};
use shared_types::{
    CumulativeCounters, OutboxEntry, OutboxKind, OutboxState, Timestamp, UsageRecord,
};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::domain::{delta, to_usage_metrics, ReporterConfig, ReporterError, ResourceLedger};

/// One resource's serialized accounting state. `None` until the first
/// sample establishes the snapshot.
type LedgerSlot = Arc<AsyncMutex<Option<ResourceLedger>>>;

/// The usage reporter.
pub struct UsageReporter {
    /// Slot directory; the per-slot mutex is where real work serializes.
    ledgers: Mutex<HashMap<String, LedgerSlot>>,
    signer: Arc<Ed25519KeyPair>,
    store: Arc<dyn OutboxStore>,
    bus: Arc<dyn EventPublisher>,
    config: ReporterConfig,
}

impl UsageReporter {
    pub fn new(
        config: ReporterConfig,
        signer: Arc<Ed25519KeyPair>,
        store: Arc<dyn OutboxStore>,
        bus: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            ledgers: Mutex::new(HashMap::new()),
            signer,
            store,
            bus,
            config,
        }
    }

    /// Absorb one cumulative sample.
    ///
    /// The first sample for a resource establishes the snapshot and emits
    /// nothing. Later samples emit a record covering `(last, at]`, unless
    /// the elapsed period is below the minimum, in which case the sample is
    /// deferred (the snapshot does not advance, so a later sample covers the
    /// whole stretch).
    pub async fn record_metrics(
        &self,
        resource_id: &str,
        counters: CumulativeCounters,
        at: Timestamp,
    ) -> Result<Option<UsageRecord>, ReporterError> {
        let slot = self.slot(resource_id);
        // Held across build and enqueue: no other sample for this resource
        // may observe the pre-advance snapshot.
        let mut guard = slot.lock().await;

        let Some(ledger) = guard.as_mut() else {
            *guard = Some(ResourceLedger::new(at, counters));
            debug!(resource_id, "Usage snapshot established");
            return Ok(None);
        };
        if ledger.finalized {
            return Err(ReporterError::AlreadyFinal(resource_id.to_string()));
        }
        if at <= ledger.last_at {
            return Err(ReporterError::NonMonotonicTime(resource_id.to_string()));
        }
        let elapsed_ms = at.millis_since(ledger.last_at);
        if elapsed_ms < self.config.min_period_secs * 1000 {
            debug!(resource_id, elapsed_ms, "Sample below minimum period, deferred");
            return Ok(None);
        }
        if elapsed_ms > self.config.max_period_secs * 1000 {
            warn!(resource_id, elapsed_ms, "Reporting period exceeds maximum, collection gap?");
        }

        // The candidate period starts at the last absorbed sample, which
        // under this lock is exactly where the previous emission ended; a
        // start before that end would double-bill and is refused.
        let period_start = ledger.last_at;
        if let Some(emitted_end) = ledger.last_emitted_end {
            if period_start < emitted_end {
                return Err(ReporterError::Overlap(resource_id.to_string()));
            }
        }

        let counter_delta = delta(&ledger.last_counters, &counters);
        let record = self.build_record(resource_id, period_start, at, &counter_delta, false);
        self.enqueue(&record).await?;

        ledger.last_at = at;
        ledger.last_counters = counters;
        ledger.last_emitted_end = Some(at);
        Ok(Some(record))
    }

    /// Emit the final record for a resource, covering whatever remains since
    /// the last emission. At most one final record ever exists per resource.
    pub async fn finalize_resource(
        &self,
        resource_id: &str,
        at: Timestamp,
    ) -> Result<UsageRecord, ReporterError> {
        let slot = {
            let ledgers = self
                .ledgers
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            ledgers
                .get(resource_id)
                .cloned()
                .ok_or_else(|| ReporterError::NoSnapshot(resource_id.to_string()))?
        };
        let mut guard = slot.lock().await;
        let Some(ledger) = guard.as_mut() else {
            return Err(ReporterError::NoSnapshot(resource_id.to_string()));
        };
        if ledger.finalized {
            return Err(ReporterError::AlreadyFinal(resource_id.to_string()));
        }

        let period_start = ledger.last_at;
        // A final record needs a non-empty period even when it carries no
        // usage beyond the last emission.
        let period_end = if at > period_start {
            at
        } else {
            period_start.add_millis(1)
        };

        // The tail period carries no new counters: usage since the last
        // sample was never observed, so the final record closes the books
        // at zero additional usage.
        let record = self.build_record(
            resource_id,
            period_start,
            period_end,
            &CumulativeCounters::default(),
            true,
        );
        self.enqueue(&record).await?;

        ledger.finalized = true;
        ledger.last_at = period_end;
        ledger.last_emitted_end = Some(period_end);
        info!(resource_id, usage_id = %record.usage_id, "Resource finalized");
        Ok(record)
    }

    /// Fetch or create the serialization slot for a resource. The directory
    /// lock is held only for the lookup, never across awaits.
    fn slot(&self, resource_id: &str) -> LedgerSlot {
        let mut ledgers = self
            .ledgers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        ledgers
            .entry(resource_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(None)))
            .clone()
    }

    /// Build and sign a usage record. `usage_id` is a pure function of
    /// `(resource, start, end)`, so an identical period always reproduces
    /// the identical id.
    fn build_record(
        &self,
        resource_id: &str,
        period_start: Timestamp,
        period_end: Timestamp,
        counter_delta: &CumulativeCounters,
        is_final: bool,
    ) -> UsageRecord {
        let mut record = UsageRecord {
            usage_id: usage_id(
                resource_id,
                period_start.as_millis(),
                period_end.as_millis(),
            ),
            resource_id: resource_id.to_string(),
            period_start,
            period_end,
            metrics: to_usage_metrics(counter_delta),
            is_final,
            provider_signature: String::new(),
        };
        record.provider_signature = self.signer.sign_base64(&signing_bytes(&record));
        record
    }

    /// Insert the record into the outbox. A duplicate idempotency key means
    /// the identical record is already queued (or delivered); that is
    /// success, not an error.
    async fn enqueue(&self, record: &UsageRecord) -> Result<(), ReporterError> {
        let entry = OutboxEntry {
            entry_id: record.usage_id.clone(),
            kind: OutboxKind::Usage,
            payload: marketplace_payload(record),
            idempotency_key: record.usage_id.clone(),
            resource_key: record.resource_id.clone(),
            attempt_count: 0,
            next_attempt_at: record.period_end,
            state: OutboxState::Pending,
            lease: None,
            inserted_at: record.period_end,
        };
        match self.store.insert(entry).await {
            Ok(()) => {}
            Err(OutboxError::DuplicateKey(existing)) => {
                debug!(usage_id = %record.usage_id, existing, "Duplicate usage record ignored");
            }
            Err(e) => return Err(e.into()),
        }

        grid_telemetry::metrics::USAGE_RECORDS
            .with_label_values(&[if record.is_final { "true" } else { "false" }])
            .inc();
        self.bus
            .publish(MarketEvent::UsageRecorded {
                usage_id: record.usage_id.clone(),
                resource_id: record.resource_id.clone(),
                is_final: record.is_final,
            })
            .await;
        Ok(())
    }
}

/// Canonical signing bytes: the record serialized with the signature field
/// removed, keys sorted, no insignificant whitespace.
pub fn signing_bytes(record: &UsageRecord) -> Vec<u8> {
    let mut value = serde_json::to_value(record).unwrap_or_default();
    if let Some(object) = value.as_object_mut() {
        object.remove("providerSignature");
    }
    to_canonical_bytes(&value).unwrap_or_default()
}

/// The marketplace submission format.
pub fn marketplace_payload(record: &UsageRecord) -> serde_json::Value {
    serde_json::json!({
        "resource": record.resource_id,
        "period_start": record.period_start.to_rfc3339(),
        "period_end": record.period_end.to_rfc3339(),
        "usages": {
            "cpu": record.metrics.cpu_hours,
            "memory": record.metrics.mem_gb_hours,
            "gpu": record.metrics.gpu_hours,
            "storage": record.metrics.storage_gb_hours,
            "network": record.metrics.network_gb,
        },
        "is_final": record.is_final,
        "signature": record.provider_signature,
    })
}
