//! Builders shared by the outbox tests.

use shared_types::{OutboxEntry, OutboxKind, OutboxState, Timestamp};

pub fn entry(entry_id: &str, resource: &str, key: &str, due_ms: u64) -> OutboxEntry {
    OutboxEntry {
        entry_id: entry_id.into(),
        kind: OutboxKind::Usage,
        payload: serde_json::json!({ "resource": resource }),
        idempotency_key: key.into(),
        resource_key: resource.into(),
        attempt_count: 0,
        next_attempt_at: Timestamp::from_millis(due_ms),
        state: OutboxState::Pending,
        lease: None,
        inserted_at: Timestamp::from_millis(due_ms),
    }
}
