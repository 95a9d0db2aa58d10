//! The lifecycle engine.
//!
//! Owns every job exclusively. Transitions for a single job are serialized
//! under that job's mutex; the async side effects (billing, settlement,
//! provider stop) run after the lock is released, against a snapshot.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use shared_bus::{EventPublisher, MarketEvent};
use shared_types::{
    Job, JobState, PlacementConstraints, ResourceDemand, TimeSource, TransitionRecord,
    WorkloadSpec,
};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::domain::{guard, LifecycleConfig, LifecycleError};
use crate::ports::{
    BillingPort, FleetPort, PlacementProvider, ProviderGateway, SettlementKind,
};

/// A customer's job submission.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSubmission {
    pub job_id: String,
    pub offering_id: String,
    pub customer_address: String,
    pub escrow_id: String,
    pub workload: WorkloadSpec,
    pub resources: ResourceDemand,
    #[serde(default)]
    pub constraints: PlacementConstraints,
    pub max_runtime_seconds: u64,
}

/// A pending scheduling retry.
#[derive(Debug, Clone)]
struct RetryRequest {
    job_id: String,
    attempt: u32,
}

/// The job lifecycle engine.
pub struct JobLifecycleEngine {
    jobs: RwLock<HashMap<String, Arc<Mutex<Job>>>>,
    /// Append-only audit log of every applied transition.
    audit: Mutex<Vec<TransitionRecord>>,
    config: LifecycleConfig,
    time: Arc<dyn TimeSource>,
    bus: Arc<dyn EventPublisher>,
    placement: Arc<dyn PlacementProvider>,
    fleet: Arc<dyn FleetPort>,
    billing: Arc<dyn BillingPort>,
    provider: Arc<dyn ProviderGateway>,
    retry_tx: mpsc::UnboundedSender<RetryRequest>,
    retry_rx: Mutex<Option<mpsc::UnboundedReceiver<RetryRequest>>>,
}

impl JobLifecycleEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: LifecycleConfig,
        time: Arc<dyn TimeSource>,
        bus: Arc<dyn EventPublisher>,
        placement: Arc<dyn PlacementProvider>,
        fleet: Arc<dyn FleetPort>,
        billing: Arc<dyn BillingPort>,
        provider: Arc<dyn ProviderGateway>,
    ) -> Self {
        let (retry_tx, retry_rx) = mpsc::unbounded_channel();
        Self {
            jobs: RwLock::new(HashMap::new()),
            audit: Mutex::new(Vec::new()),
            config,
            time,
            bus,
            placement,
            fleet,
            billing,
            provider,
            retry_tx,
            retry_rx: Mutex::new(Some(retry_rx)),
        }
    }

    /// Accept a new job and attempt its first placement.
    pub async fn submit(&self, submission: JobSubmission) -> Result<Job, LifecycleError> {
        let job = Job {
            job_id: submission.job_id.clone(),
            offering_id: submission.offering_id,
            customer_address: submission.customer_address,
            escrow_id: submission.escrow_id,
            workload: submission.workload,
            resources: submission.resources,
            constraints: submission.constraints,
            max_runtime_seconds: submission.max_runtime_seconds,
            state: JobState::Submitted,
            decision: None,
            submitted_at: self.time.now(),
            terminal_at: None,
            exit_code: None,
        };
        {
            let mut jobs = self
                .jobs
                .write()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if jobs.contains_key(&job.job_id) {
                return Err(LifecycleError::DuplicateJob(job.job_id));
            }
            jobs.insert(job.job_id.clone(), Arc::new(Mutex::new(job.clone())));
        }
        info!(job_id = %job.job_id, nodes = job.resources.nodes, "Job submitted");

        self.try_schedule(&job.job_id, 1).await?;
        Ok(self.job(&job.job_id).unwrap_or(job))
    }

    /// One placement attempt. Retriable failures are handed to the retry
    /// queue; exhausted or permanent failures fail the job with a refund.
    pub async fn try_schedule(&self, job_id: &str, attempt: u32) -> Result<(), LifecycleError> {
        let snapshot = self
            .job(job_id)
            .ok_or_else(|| LifecycleError::UnknownJob(job_id.to_string()))?;
        if snapshot.state != JobState::Submitted {
            // Cancelled or already scheduled while queued for retry.
            debug!(job_id, state = ?snapshot.state, "Skipping placement, job moved on");
            return Ok(());
        }

        match self.placement.place(&snapshot) {
            Ok(decision) => {
                grid_telemetry::metrics::SCHEDULING_DECISIONS
                    .with_label_values(&["placed"])
                    .inc();
                let per_node = snapshot.resources.per_node();
                if let Err(reason) = self.fleet.reserve(&decision, &per_node) {
                    // The roster moved between snapshot and reservation;
                    // treat it like a failed placement attempt.
                    if attempt < self.config.max_schedule_attempts {
                        debug!(job_id, attempt, %reason, "Reservation lost, retry queued");
                        let _ = self.retry_tx.send(RetryRequest {
                            job_id: job_id.to_string(),
                            attempt: attempt + 1,
                        });
                        return Ok(());
                    }
                    warn!(job_id, attempt, %reason, "Reservation exhausted");
                    return self.fail_unplaced(job_id, &reason).await;
                }

                let applied = self.apply(job_id, JobState::Scheduled, "placement decided", |job| {
                    if job.decision.is_some() {
                        return Err(LifecycleError::DecisionExists(job.job_id.clone()));
                    }
                    job.decision = Some(decision.clone());
                    Ok(())
                });
                match applied {
                    Ok((job, record)) => {
                        self.publish_transition(&job, record).await;
                        Ok(())
                    }
                    Err(e) => {
                        // The job was cancelled between snapshot and apply.
                        self.fleet.release(&decision.node_ids, &per_node);
                        Err(e)
                    }
                }
            }
            Err(failure) => {
                grid_telemetry::metrics::SCHEDULING_DECISIONS
                    .with_label_values(&["no-placement"])
                    .inc();
                if failure.retriable && attempt < self.config.max_schedule_attempts {
                    debug!(job_id, attempt, reason = %failure.reason, "Placement retry queued");
                    let _ = self.retry_tx.send(RetryRequest {
                        job_id: job_id.to_string(),
                        attempt: attempt + 1,
                    });
                    Ok(())
                } else {
                    warn!(job_id, attempt, reason = %failure.reason, "Placement exhausted");
                    self.fail_unplaced(job_id, &failure.reason).await
                }
            }
        }
    }

    /// Provider acknowledged dispatch.
    pub async fn acknowledge_dispatch(&self, job_id: &str) -> Result<(), LifecycleError> {
        let (job, record) =
            self.apply(job_id, JobState::Queued, "provider acknowledged dispatch", |_| Ok(()))?;
        self.publish_transition(&job, record).await;
        Ok(())
    }

    /// Provider reported the first successful start.
    pub async fn report_started(&self, job_id: &str) -> Result<(), LifecycleError> {
        let (job, record) =
            self.apply(job_id, JobState::Running, "provider reported start", |_| Ok(()))?;
        self.publish_transition(&job, record).await;
        Ok(())
    }

    /// Provider reported success.
    pub async fn report_completed(
        &self,
        job_id: &str,
        exit_code: i32,
    ) -> Result<(), LifecycleError> {
        let (job, record) = self.apply(job_id, JobState::Completed, "provider reported success", |job| {
            job.exit_code = Some(exit_code);
            Ok(())
        })?;
        self.publish_transition(&job, record).await;
        self.settle_terminal(&job, SettlementKind::Completed, Some(true))
            .await;
        Ok(())
    }

    /// Provider reported failure; consumed usage still settles.
    pub async fn report_failed(&self, job_id: &str, reason: &str) -> Result<(), LifecycleError> {
        let (job, record) = self.apply(job_id, JobState::Failed, reason, |_| Ok(()))?;
        self.publish_transition(&job, record).await;
        self.settle_terminal(&job, SettlementKind::FailedPartial, Some(false))
            .await;
        Ok(())
    }

    /// Customer or admin cancellation from any non-terminal state. Running
    /// work is asked to stop; usage accrued so far is billed.
    pub async fn cancel(&self, job_id: &str, reason: &str) -> Result<(), LifecycleError> {
        let (job, record) = self.apply(job_id, JobState::Cancelled, reason, |_| Ok(()))?;
        self.publish_transition(&job, record).await;

        if matches!(job.state, JobState::Cancelled) && job.decision.is_some() {
            self.provider.stop(&job).await;
        }
        let kind = if job.decision.is_some() {
            SettlementKind::Cancelled
        } else {
            SettlementKind::Refund
        };
        self.settle_terminal(&job, kind, None).await;
        Ok(())
    }

    /// One job's current record.
    pub fn job(&self, job_id: &str) -> Option<Job> {
        self.jobs
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(job_id)
            .map(|slot| {
                slot.lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .clone()
            })
    }

    /// The append-only audit log, oldest first.
    pub fn audit_log(&self) -> Vec<TransitionRecord> {
        self.audit
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Drive queued placement retries until shutdown. Retries wait out their
    /// back-off here so the engine itself never sleeps.
    pub async fn run_retries(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut rx = self
            .retry_rx
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
            .expect("retry queue already running");
        info!("Lifecycle retry queue started");

        loop {
            tokio::select! {
                request = rx.recv() => {
                    let Some(RetryRequest { job_id, attempt }) = request else {
                        return;
                    };
                    let delay = self.config.backoff_ms(attempt);
                    tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
                    if let Err(e) = self.try_schedule(&job_id, attempt).await {
                        warn!(job_id = %job_id, error = %e, "Scheduling retry failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Lifecycle retry queue stopping");
                        return;
                    }
                }
            }
        }
    }

    /// Apply one guarded transition under the job's lock, plus an extra
    /// mutation while the lock is held. Returns the post-transition snapshot.
    fn apply(
        &self,
        job_id: &str,
        to: JobState,
        reason: &str,
        mutate: impl FnOnce(&mut Job) -> Result<(), LifecycleError>,
    ) -> Result<(Job, TransitionRecord), LifecycleError> {
        let slot = {
            let jobs = self
                .jobs
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            jobs.get(job_id)
                .cloned()
                .ok_or_else(|| LifecycleError::UnknownJob(job_id.to_string()))?
        };
        let mut job = slot.lock().unwrap_or_else(std::sync::PoisonError::into_inner);

        let now = self.time.now();
        let record = guard(job_id, job.state, to, reason, now)?;
        mutate(&mut job)?;
        job.state = to;
        if to.terminal() {
            job.terminal_at = Some(now);
        }
        let snapshot = job.clone();
        drop(job);

        grid_telemetry::metrics::JOB_TRANSITIONS
            .with_label_values(&[state_label(to)])
            .inc();
        info!(
            job_id,
            from = ?record.from,
            to = ?record.to,
            reason = %record.reason,
            "Job transition"
        );
        self.audit
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(record.clone());
        Ok((snapshot, record))
    }

    /// Announce an applied transition on the bus.
    async fn publish_transition(&self, job: &Job, record: TransitionRecord) {
        if record.to.terminal() {
            self.bus
                .publish(MarketEvent::JobFinished {
                    job_id: record.job_id.clone(),
                    state: record.to,
                    exit_code: job.exit_code,
                })
                .await;
        }
        self.bus.publish(MarketEvent::JobTransitioned { record }).await;
    }

    /// Fail a job that never placed; the escrow refunds in full.
    async fn fail_unplaced(&self, job_id: &str, reason: &str) -> Result<(), LifecycleError> {
        let (job, record) = self.apply(job_id, JobState::Failed, reason, |_| Ok(()))?;
        self.publish_transition(&job, record).await;
        if let Err(e) = self.billing.settle(&job, SettlementKind::Refund).await {
            warn!(job_id, error = %e, "Refund settlement could not be enqueued");
        }
        Ok(())
    }

    /// Billing and fleet side effects shared by the terminal transitions.
    /// Settlement failures leave the job state as-is; the outbox retries.
    async fn settle_terminal(&self, job: &Job, kind: SettlementKind, success: Option<bool>) {
        let now = self.time.now();
        if let Some(decision) = &job.decision {
            let per_node = job.resources.per_node();
            self.fleet.release(&decision.node_ids, &per_node);
            if let Some(success) = success {
                self.fleet.record_outcome(&decision.node_ids, success);
            }
            if let Err(e) = self.billing.finalize_usage(&job.job_id, now).await {
                warn!(job_id = %job.job_id, error = %e, "Final usage record failed");
            }
        }
        if let Err(e) = self.billing.settle(job, kind).await {
            warn!(job_id = %job.job_id, error = %e, "Settlement could not be enqueued");
        }
    }
}

fn state_label(state: JobState) -> &'static str {
    match state {
        JobState::Submitted => "submitted",
        JobState::Scheduled => "scheduled",
        JobState::Queued => "queued",
        JobState::Running => "running",
        JobState::Completed => "completed",
        JobState::Failed => "failed",
        JobState::Cancelled => "cancelled",
    }
}
