//! In-memory store, for tests and ephemeral deployments.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use shared_types::{OutboxEntry, OutboxState, Timestamp};

use crate::domain::OutboxError;
use crate::ports::{OutboxCounts, OutboxStore};

/// Entries in a map plus insertion order, mimicking the journal's FIFO.
#[derive(Default, Debug)]
pub struct InMemoryOutboxStore {
    inner: Mutex<Inner>,
}

#[derive(Default, Debug)]
struct Inner {
    entries: HashMap<String, OutboxEntry>,
    /// Insertion order of entry ids.
    order: Vec<String>,
    /// Acked timestamps for purge decisions.
    acked_at: HashMap<String, Timestamp>,
}

impl InMemoryOutboxStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load an entry verbatim, preserving its state (journal replay).
    pub(crate) fn load(&self, entry: OutboxEntry, acked_at: Option<Timestamp>) {
        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if !inner.entries.contains_key(&entry.entry_id) {
            inner.order.push(entry.entry_id.clone());
        }
        if let Some(at) = acked_at {
            inner.acked_at.insert(entry.entry_id.clone(), at);
        }
        inner.entries.insert(entry.entry_id.clone(), entry);
    }

    /// Every entry in insertion order, with ack times (journal compaction).
    pub(crate) fn dump(&self) -> Vec<(OutboxEntry, Option<Timestamp>)> {
        let inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        inner
            .order
            .iter()
            .filter_map(|id| {
                inner
                    .entries
                    .get(id)
                    .map(|e| (e.clone(), inner.acked_at.get(id).copied()))
            })
            .collect()
    }
}

#[async_trait]
impl OutboxStore for InMemoryOutboxStore {
    async fn insert(&self, entry: OutboxEntry) -> Result<(), OutboxError> {
        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(existing) = inner
            .entries
            .values()
            .find(|e| e.idempotency_key == entry.idempotency_key)
        {
            return Err(OutboxError::DuplicateKey(existing.entry_id.clone()));
        }
        inner.order.push(entry.entry_id.clone());
        inner.entries.insert(entry.entry_id.clone(), entry);
        Ok(())
    }

    async fn claim_next(
        &self,
        now: Timestamp,
        lease: &str,
    ) -> Result<Option<OutboxEntry>, OutboxError> {
        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);

        // Resources with an inflight entry keep their queue blocked so
        // per-resource delivery stays in insertion order.
        let busy: Vec<String> = inner
            .entries
            .values()
            .filter(|e| e.state == OutboxState::Inflight)
            .map(|e| e.resource_key.clone())
            .collect();

        let candidate = inner
            .order
            .iter()
            .filter_map(|id| inner.entries.get(id))
            .find(|e| {
                e.state == OutboxState::Pending
                    && e.next_attempt_at <= now
                    && !busy.contains(&e.resource_key)
            })
            .map(|e| e.entry_id.clone());

        let Some(entry_id) = candidate else {
            return Ok(None);
        };
        let entry = inner
            .entries
            .get_mut(&entry_id)
            .expect("claimed id came from the map");
        entry.state = OutboxState::Inflight;
        entry.lease = Some(lease.to_string());
        Ok(Some(entry.clone()))
    }

    async fn ack(&self, entry_id: &str, lease: &str, at: Timestamp) -> Result<(), OutboxError> {
        let mut guard = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let inner = &mut *guard;
        let entry = take_inflight(&mut inner.entries, entry_id, lease)?;
        entry.state = OutboxState::Acked;
        entry.lease = None;
        inner.acked_at.insert(entry_id.to_string(), at);
        Ok(())
    }

    async fn retry(
        &self,
        entry_id: &str,
        lease: &str,
        next_attempt_at: Timestamp,
    ) -> Result<(), OutboxError> {
        let mut guard = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let inner = &mut *guard;
        let entry = take_inflight(&mut inner.entries, entry_id, lease)?;
        entry.state = OutboxState::Pending;
        entry.lease = None;
        entry.attempt_count += 1;
        entry.next_attempt_at = next_attempt_at;
        Ok(())
    }

    async fn mark_dead(&self, entry_id: &str, lease: &str) -> Result<(), OutboxError> {
        let mut guard = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let inner = &mut *guard;
        let entry = take_inflight(&mut inner.entries, entry_id, lease)?;
        entry.state = OutboxState::Dead;
        entry.lease = None;
        entry.attempt_count += 1;
        Ok(())
    }

    async fn release_inflight(&self) -> Result<usize, OutboxError> {
        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut released = 0;
        for entry in inner.entries.values_mut() {
            if entry.state == OutboxState::Inflight {
                entry.state = OutboxState::Pending;
                entry.lease = None;
                released += 1;
            }
        }
        Ok(released)
    }

    async fn purge_acked(&self, cutoff: Timestamp) -> Result<usize, OutboxError> {
        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let stale: Vec<String> = inner
            .acked_at
            .iter()
            .filter(|(_, at)| **at <= cutoff)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &stale {
            inner.entries.remove(id);
            inner.acked_at.remove(id);
            inner.order.retain(|o| o != id);
        }
        Ok(stale.len())
    }

    async fn get(&self, entry_id: &str) -> Result<Option<OutboxEntry>, OutboxError> {
        let inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(inner.entries.get(entry_id).cloned())
    }

    async fn find_by_key(
        &self,
        idempotency_key: &str,
    ) -> Result<Option<OutboxEntry>, OutboxError> {
        let inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(inner
            .entries
            .values()
            .find(|e| e.idempotency_key == idempotency_key)
            .cloned())
    }

    async fn counts(&self) -> Result<OutboxCounts, OutboxError> {
        let inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut counts = OutboxCounts::default();
        for entry in inner.entries.values() {
            match entry.state {
                OutboxState::Pending => counts.pending += 1,
                OutboxState::Inflight => counts.inflight += 1,
                OutboxState::Acked => counts.acked += 1,
                OutboxState::Dead => counts.dead += 1,
            }
        }
        Ok(counts)
    }
}

/// Fetch an inflight entry, checking the lease.
fn take_inflight<'a>(
    entries: &'a mut HashMap<String, OutboxEntry>,
    entry_id: &str,
    lease: &str,
) -> Result<&'a mut OutboxEntry, OutboxError> {
    let entry = entries
        .get_mut(entry_id)
        .ok_or_else(|| OutboxError::UnknownEntry(entry_id.to_string()))?;
    if entry.state != OutboxState::Inflight {
        return Err(OutboxError::WrongState {
            entry_id: entry_id.to_string(),
            state: state_name(entry.state),
            expected: "inflight",
        });
    }
    if entry.lease.as_deref() != Some(lease) {
        return Err(OutboxError::LeaseMismatch(entry_id.to_string()));
    }
    Ok(entry)
}

pub(crate) fn state_name(state: OutboxState) -> &'static str {
    match state {
        OutboxState::Pending => "pending",
        OutboxState::Inflight => "inflight",
        OutboxState::Acked => "acked",
        OutboxState::Dead => "dead",
    }
}
