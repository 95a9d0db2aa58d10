//! The flusher task.
//!
//! One worker per output queue: claim the oldest due entry (per-resource
//! FIFO), deliver, ack or reschedule with jittered exponential back-off,
//! dead-letter after `max_attempts`. On shutdown every inflight claim drains
//! back to pending so a restart retries it.

use std::sync::Arc;

use rand::Rng;
use shared_bus::{EventPublisher, MarketEvent};
use shared_types::{OutboxEntry, TimeSource};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{backoff_ms, OutboxConfig, OutboxError};
use crate::ports::{DeliveryError, DeliverySink, OutboxStore};

/// The outbox flusher.
pub struct OutboxFlusher {
    store: Arc<dyn OutboxStore>,
    sink: Arc<dyn DeliverySink>,
    config: OutboxConfig,
    time: Arc<dyn TimeSource>,
    bus: Arc<dyn EventPublisher>,
}

impl OutboxFlusher {
    pub fn new(
        store: Arc<dyn OutboxStore>,
        sink: Arc<dyn DeliverySink>,
        config: OutboxConfig,
        time: Arc<dyn TimeSource>,
        bus: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            store,
            sink,
            config,
            time,
            bus,
        }
    }

    /// Claim and deliver at most one entry. Returns whether an entry was
    /// processed (so callers can drain hot queues without sleeping).
    pub async fn flush_one(&self) -> Result<bool, OutboxError> {
        let now = self.time.now();
        let lease = Uuid::new_v4().to_string();
        let Some(entry) = self.store.claim_next(now, &lease).await? else {
            return Ok(false);
        };

        let timer = grid_telemetry::metrics::FLUSH_DURATION.start_timer();
        let outcome = self.sink.deliver(&entry).await;
        timer.observe_duration();

        match outcome {
            Ok(receipt) => {
                self.store.ack(&entry.entry_id, &lease, self.time.now()).await?;
                grid_telemetry::metrics::OUTBOX_DELIVERIES
                    .with_label_values(&["acked"])
                    .inc();
                debug!(
                    entry_id = %entry.entry_id,
                    remote_id = ?receipt.remote_id,
                    attempts = entry.attempt_count + 1,
                    "Outbox entry acked"
                );
            }
            Err(DeliveryError::Permanent(reason)) => {
                warn!(entry_id = %entry.entry_id, %reason, "Permanent delivery failure");
                self.bury(&entry, &lease, &reason).await?;
            }
            Err(DeliveryError::Retriable(reason)) => {
                // attempt_count counts finished attempts; this one failed.
                let attempts_done = entry.attempt_count + 1;
                if attempts_done >= self.config.max_attempts {
                    warn!(
                        entry_id = %entry.entry_id,
                        attempts = attempts_done,
                        %reason,
                        "Retries exhausted"
                    );
                    self.bury(&entry, &lease, &reason).await?;
                } else {
                    let jitter = rand::thread_rng().gen_range(-1.0..=1.0);
                    let delay = backoff_ms(&self.config, entry.attempt_count, jitter);
                    let next = self.time.now().add_millis(delay);
                    self.store.retry(&entry.entry_id, &lease, next).await?;
                    grid_telemetry::metrics::OUTBOX_DELIVERIES
                        .with_label_values(&["retried"])
                        .inc();
                    debug!(
                        entry_id = %entry.entry_id,
                        attempts = attempts_done,
                        delay_ms = delay,
                        %reason,
                        "Outbox entry rescheduled"
                    );
                }
            }
        }
        Ok(true)
    }

    /// Run until shutdown, then drain inflight claims back to pending.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            max_attempts = self.config.max_attempts,
            poll_ms = self.config.poll_interval_ms,
            "Outbox flusher started"
        );
        let mut last_purge = self.time.now();

        loop {
            if *shutdown.borrow() {
                break;
            }
            match self.flush_one().await {
                Ok(true) => continue, // queue is hot, keep draining
                Ok(false) => {}
                Err(e) => warn!(error = %e, "Flusher store error"),
            }

            // Retention: acked entries may be purged after the window.
            let now = self.time.now();
            if now.millis_since(last_purge) >= self.config.purge_acked_after_ms {
                let cutoff = shared_types::Timestamp::from_millis(
                    now.as_millis()
                        .saturating_sub(self.config.purge_acked_after_ms),
                );
                match self.store.purge_acked(cutoff).await {
                    Ok(0) => {}
                    Ok(purged) => debug!(purged, "Purged acked outbox entries"),
                    Err(e) => warn!(error = %e, "Purge failed"),
                }
                last_purge = now;
            }

            tokio::select! {
                _ = tokio::time::sleep(std::time::Duration::from_millis(
                    self.config.poll_interval_ms,
                )) => {}
                _ = shutdown.changed() => {}
            }
        }

        match self.store.release_inflight().await {
            Ok(0) => {}
            Ok(released) => info!(released, "Drained inflight entries to pending"),
            Err(e) => warn!(error = %e, "Inflight drain failed"),
        }
        info!("Outbox flusher stopped");
    }

    async fn bury(
        &self,
        entry: &OutboxEntry,
        lease: &str,
        reason: &str,
    ) -> Result<(), OutboxError> {
        self.store.mark_dead(&entry.entry_id, lease).await?;
        grid_telemetry::metrics::OUTBOX_DELIVERIES
            .with_label_values(&["dead"])
            .inc();
        self.bus
            .publish(MarketEvent::OutboxEntryDead {
                entry_id: entry.entry_id.clone(),
                idempotency_key: entry.idempotency_key.clone(),
                attempts: entry.attempt_count + 1,
            })
            .await;
        self.bus
            .publish(MarketEvent::Alert {
                component: "outbox".into(),
                message: format!("entry {} dead after {} attempts: {reason}",
                    entry.entry_id, entry.attempt_count + 1),
            })
            .await;
        Ok(())
    }
}
