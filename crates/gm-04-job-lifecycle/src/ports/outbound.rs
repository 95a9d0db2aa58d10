//! # Driven Ports (Outbound SPI)
//!
//! The lifecycle engine orchestrates the scheduler, the fleet, and billing
//! through these narrow interfaces; production wiring adapts the concrete
//! subsystems onto them.

use async_trait::async_trait;
use shared_types::{Job, ResourceAmounts, SchedulingDecision, Timestamp};

/// Produces a placement for a job, or explains why none exists.
pub trait PlacementProvider: Send + Sync {
    /// Attempt a placement against the current roster view.
    fn place(&self, job: &Job) -> Result<SchedulingDecision, PlacementFailure>;
}

/// A failed placement attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacementFailure {
    /// Whether a later attempt could succeed (roster may change).
    pub retriable: bool,
    pub reason: String,
}

/// Capacity bookkeeping on the fleet.
pub trait FleetPort: Send + Sync {
    /// Reserve per-node capacity for every node in a decision;
    /// all-or-nothing.
    fn reserve(
        &self,
        decision: &SchedulingDecision,
        per_node: &ResourceAmounts,
    ) -> Result<(), String>;

    /// Release a prior reservation.
    fn release(&self, node_ids: &[String], per_node: &ResourceAmounts);

    /// Feed a finished job into per-node reliability history.
    fn record_outcome(&self, node_ids: &[String], success: bool);
}

/// What a settlement is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementKind {
    /// Full usage on success.
    Completed,
    /// Consumed usage only.
    FailedPartial,
    /// Usage accrued until cancellation.
    Cancelled,
    /// Escrow refund when a job never placed.
    Refund,
}

/// Billing side effects of terminal transitions.
#[async_trait]
pub trait BillingPort: Send + Sync {
    /// Emit the final usage record for a job's resource.
    async fn finalize_usage(&self, resource_id: &str, at: Timestamp) -> Result<(), String>;

    /// Enqueue a settlement for delivery to the chain.
    async fn settle(&self, job: &Job, kind: SettlementKind) -> Result<(), String>;
}

/// Commands toward the provider running the workload.
#[async_trait]
pub trait ProviderGateway: Send + Sync {
    /// Ask the provider to stop any running work for a job.
    async fn stop(&self, job: &Job);
}

/// Gateway that does nothing, for tests and partial wiring.
#[derive(Debug, Default)]
pub struct NullProviderGateway;

#[async_trait]
impl ProviderGateway for NullProviderGateway {
    async fn stop(&self, _job: &Job) {}
}
