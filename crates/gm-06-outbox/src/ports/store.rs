//! # The Store Port
//!
//! The outbox is the only persistent structure the core owns. Claims use
//! compare-and-set semantics on the entry state (`pending -> inflight` with
//! a lease token), so an entry is ever owned by at most one flusher.

use async_trait::async_trait;
use shared_types::{OutboxEntry, Timestamp};

use crate::domain::OutboxError;

/// Entry counts by state, for gauges and shutdown logging.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OutboxCounts {
    pub pending: usize,
    pub inflight: usize,
    pub acked: usize,
    pub dead: usize,
}

/// Durable storage for outbox entries.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Insert a new pending entry. The idempotency key is unique across the
    /// outbox lifetime; a duplicate returns the existing entry's id.
    async fn insert(&self, entry: OutboxEntry) -> Result<(), OutboxError>;

    /// Claim the next due entry: the oldest `pending` whose
    /// `next_attempt_at` has passed, skipping resources that already have an
    /// entry inflight (per-resource FIFO). Transitions it to `inflight`
    /// under `lease`.
    async fn claim_next(
        &self,
        now: Timestamp,
        lease: &str,
    ) -> Result<Option<OutboxEntry>, OutboxError>;

    /// Terminal success for an inflight entry claimed under `lease`.
    async fn ack(&self, entry_id: &str, lease: &str, at: Timestamp) -> Result<(), OutboxError>;

    /// Return an inflight entry to `pending` with an incremented attempt
    /// count and the given next-attempt time.
    async fn retry(
        &self,
        entry_id: &str,
        lease: &str,
        next_attempt_at: Timestamp,
    ) -> Result<(), OutboxError>;

    /// Terminal failure: the entry is kept for investigation, never retried.
    async fn mark_dead(&self, entry_id: &str, lease: &str) -> Result<(), OutboxError>;

    /// Return every inflight entry to `pending` (shutdown drain / startup
    /// recovery). Returns how many were released.
    async fn release_inflight(&self) -> Result<usize, OutboxError>;

    /// Drop acked entries older than `cutoff`. Dead entries are never purged.
    async fn purge_acked(&self, cutoff: Timestamp) -> Result<usize, OutboxError>;

    /// Fetch one entry.
    async fn get(&self, entry_id: &str) -> Result<Option<OutboxEntry>, OutboxError>;

    /// Look up an entry by idempotency key.
    async fn find_by_key(&self, idempotency_key: &str)
        -> Result<Option<OutboxEntry>, OutboxError>;

    /// Counts by state.
    async fn counts(&self) -> Result<OutboxCounts, OutboxError>;
}
