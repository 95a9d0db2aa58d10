//! File-backed store: an append-only JSON-lines journal.
//!
//! Every mutation appends one line carrying the entry's full state; replay
//! is last-wins by entry id. The journal is held under an exclusive `fs2`
//! lock so two processes never share one outbox. On open, surviving
//! `inflight` entries revert to `pending` (their flusher is gone) and the
//! journal is compacted.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use shared_types::{OutboxEntry, OutboxState, Timestamp};
use tracing::{info, warn};

use crate::domain::OutboxError;
use crate::ports::{OutboxCounts, OutboxStore};

use super::memory::InMemoryOutboxStore;

/// One journal line: the entry's state after a mutation.
#[derive(Debug, Serialize, Deserialize)]
struct JournalLine {
    entry: OutboxEntry,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    acked_at: Option<Timestamp>,
}

/// Durable outbox store over a JSON-lines journal file.
#[derive(Debug)]
pub struct FileOutboxStore {
    mem: InMemoryOutboxStore,
    journal: Mutex<File>,
    path: PathBuf,
}

impl FileOutboxStore {
    /// Open (or create) the journal at `path`, replay it, recover inflight
    /// entries, and compact.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, OutboxError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .map_err(io_err)?;
        file.try_lock_exclusive()
            .map_err(|e| OutboxError::Io(format!("journal already locked: {e}")))?;

        let mem = InMemoryOutboxStore::new();
        let mut lines = 0usize;
        {
            let reader = BufReader::new(&file);
            for line in reader.lines() {
                let line = line.map_err(io_err)?;
                if line.trim().is_empty() {
                    continue;
                }
                let parsed: JournalLine = serde_json::from_str(&line)
                    .map_err(|e| OutboxError::Corrupt(format!("line {}: {e}", lines + 1)))?;
                mem.load(parsed.entry, parsed.acked_at);
                lines += 1;
            }
        }

        let store = Self {
            mem,
            journal: Mutex::new(file),
            path,
        };

        // Whatever was inflight when the last process died is ours again.
        let mut released = 0usize;
        for (mut entry, acked_at) in store.mem.dump() {
            if entry.state == OutboxState::Inflight {
                entry.state = OutboxState::Pending;
                entry.lease = None;
                store.mem.load(entry, acked_at);
                released += 1;
            }
        }
        if released > 0 {
            warn!(released, "Recovered inflight outbox entries to pending");
        }
        store.compact()?;
        info!(path = %store.path.display(), lines, released, "Outbox journal opened");
        Ok(store)
    }

    /// Append one line for the entry's current state.
    async fn append(&self, entry_id: &str, acked_at: Option<Timestamp>) -> Result<(), OutboxError> {
        let Some(entry) = self.mem.get(entry_id).await? else {
            return Ok(()); // purged
        };
        let line = serde_json::to_string(&JournalLine { entry, acked_at })
            .map_err(|e| OutboxError::Io(e.to_string()))?;
        let mut journal = self
            .journal
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        writeln!(journal, "{line}").map_err(io_err)?;
        journal.sync_data().map_err(io_err)?;
        Ok(())
    }

    /// Rewrite the journal from current state; truncates replay history.
    fn compact(&self) -> Result<(), OutboxError> {
        let dump = self.mem.dump();
        let tmp = self.path.with_extension("journal.tmp");
        {
            let mut out = File::create(&tmp).map_err(io_err)?;
            for (entry, acked_at) in dump {
                let line = serde_json::to_string(&JournalLine { entry, acked_at })
                    .map_err(|e| OutboxError::Io(e.to_string()))?;
                writeln!(out, "{line}").map_err(io_err)?;
            }
            out.sync_data().map_err(io_err)?;
        }

        let mut journal = self
            .journal
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        std::fs::rename(&tmp, &self.path).map_err(io_err)?;
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .open(&self.path)
            .map_err(io_err)?;
        file.try_lock_exclusive()
            .map_err(|e| OutboxError::Io(format!("relock failed: {e}")))?;
        *journal = file;
        Ok(())
    }
}

#[async_trait]
impl OutboxStore for FileOutboxStore {
    async fn insert(&self, entry: OutboxEntry) -> Result<(), OutboxError> {
        let entry_id = entry.entry_id.clone();
        self.mem.insert(entry).await?;
        self.append(&entry_id, None).await
    }

    async fn claim_next(
        &self,
        now: Timestamp,
        lease: &str,
    ) -> Result<Option<OutboxEntry>, OutboxError> {
        let claimed = self.mem.claim_next(now, lease).await?;
        if let Some(entry) = &claimed {
            self.append(&entry.entry_id, None).await?;
        }
        Ok(claimed)
    }

    async fn ack(&self, entry_id: &str, lease: &str, at: Timestamp) -> Result<(), OutboxError> {
        self.mem.ack(entry_id, lease, at).await?;
        self.append(entry_id, Some(at)).await
    }

    async fn retry(
        &self,
        entry_id: &str,
        lease: &str,
        next_attempt_at: Timestamp,
    ) -> Result<(), OutboxError> {
        self.mem.retry(entry_id, lease, next_attempt_at).await?;
        self.append(entry_id, None).await
    }

    async fn mark_dead(&self, entry_id: &str, lease: &str) -> Result<(), OutboxError> {
        self.mem.mark_dead(entry_id, lease).await?;
        self.append(entry_id, None).await
    }

    async fn release_inflight(&self) -> Result<usize, OutboxError> {
        let released = self.mem.release_inflight().await?;
        if released > 0 {
            self.compact()?;
        }
        Ok(released)
    }

    async fn purge_acked(&self, cutoff: Timestamp) -> Result<usize, OutboxError> {
        let purged = self.mem.purge_acked(cutoff).await?;
        if purged > 0 {
            self.compact()?;
        }
        Ok(purged)
    }

    async fn get(&self, entry_id: &str) -> Result<Option<OutboxEntry>, OutboxError> {
        self.mem.get(entry_id).await
    }

    async fn find_by_key(
        &self,
        idempotency_key: &str,
    ) -> Result<Option<OutboxEntry>, OutboxError> {
        self.mem.find_by_key(idempotency_key).await
    }

    async fn counts(&self) -> Result<OutboxCounts, OutboxError> {
        self.mem.counts().await
    }
}

fn io_err(e: std::io::Error) -> OutboxError {
    OutboxError::Io(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::entry;

    #[tokio::test]
    async fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outbox.journal");

        {
            let store = FileOutboxStore::open(&path).unwrap();
            store.insert(entry("e1", "r1", "k1", 0)).await.unwrap();
            store.insert(entry("e2", "r2", "k2", 0)).await.unwrap();
            store.claim_next(Timestamp::from_millis(1), "l1").await.unwrap();
            store.ack("e1", "l1", Timestamp::from_millis(2)).await.unwrap();
        }

        let store = FileOutboxStore::open(&path).unwrap();
        assert_eq!(
            store.get("e1").await.unwrap().unwrap().state,
            OutboxState::Acked
        );
        assert_eq!(
            store.get("e2").await.unwrap().unwrap().state,
            OutboxState::Pending
        );
    }

    #[tokio::test]
    async fn test_inflight_recovers_to_pending_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outbox.journal");

        {
            let store = FileOutboxStore::open(&path).unwrap();
            store.insert(entry("e1", "r1", "k1", 0)).await.unwrap();
            let claimed = store
                .claim_next(Timestamp::from_millis(1), "l1")
                .await
                .unwrap()
                .unwrap();
            assert_eq!(claimed.state, OutboxState::Inflight);
            // Flusher dies here without acking.
        }

        let store = FileOutboxStore::open(&path).unwrap();
        let recovered = store.get("e1").await.unwrap().unwrap();
        assert_eq!(recovered.state, OutboxState::Pending);
        assert!(recovered.lease.is_none());

        // And it is claimable again.
        assert!(store
            .claim_next(Timestamp::from_millis(1), "l2")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_duplicate_key_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outbox.journal");

        {
            let store = FileOutboxStore::open(&path).unwrap();
            store.insert(entry("e1", "r1", "k1", 0)).await.unwrap();
        }
        let store = FileOutboxStore::open(&path).unwrap();
        let err = store.insert(entry("e9", "r9", "k1", 0)).await.unwrap_err();
        assert_eq!(err, OutboxError::DuplicateKey("e1".into()));
    }

    #[test]
    fn test_second_open_fails_while_locked() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outbox.journal");

        let _store = FileOutboxStore::open(&path).unwrap();
        let err = FileOutboxStore::open(&path).unwrap_err();
        assert!(matches!(err, OutboxError::Io(_)));
    }
}
