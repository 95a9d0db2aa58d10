//! # Deterministic Identifiers
//!
//! Idempotency keys over `(entity, action, time-bucket)` and the
//! deterministic usage id. Both are pure functions: two requests in the same
//! bucket with the same entity and action produce the same key, and the
//! usage id of a `(resource, start, end)` triple never changes.

use crate::hashing::sha256_hex;
use uuid::Uuid;

/// Default idempotency bucket: one hour.
pub const DEFAULT_BUCKET_SECS: u64 = 3600;

/// Namespace for deterministic usage ids (UUIDv5).
pub const USAGE_ID_NAMESPACE: Uuid = Uuid::from_bytes([
    0x9e, 0x2f, 0x41, 0x7c, 0x6b, 0x5d, 0x4a, 0x8e, 0x93, 0x1a, 0x70, 0x24, 0xd6, 0x0b, 0x58,
    0x11,
]);

/// Derive an idempotency key: `hash(entity || "/" || action || "/" ||
/// floor(timestamp_secs / bucket))`, hex-encoded.
pub fn idempotency_key(entity: &str, action: &str, timestamp_secs: u64, bucket_secs: u64) -> String {
    let bucket = if bucket_secs == 0 {
        timestamp_secs
    } else {
        timestamp_secs / bucket_secs
    };
    let preimage = format!("{entity}/{action}/{bucket}");
    sha256_hex(preimage.as_bytes())
}

/// Derive an idempotency key with the default one-hour bucket.
pub fn hourly_idempotency_key(entity: &str, action: &str, timestamp_secs: u64) -> String {
    idempotency_key(entity, action, timestamp_secs, DEFAULT_BUCKET_SECS)
}

/// Deterministic usage id over `(resource_id, period_start_ms, period_end_ms)`.
///
/// A pure function of the triple, giving natural idempotency: re-deriving for
/// the same period always yields the same id.
pub fn usage_id(resource_id: &str, period_start_ms: u64, period_end_ms: u64) -> String {
    let name = format!("{resource_id}/{period_start_ms}/{period_end_ms}");
    Uuid::new_v5(&USAGE_ID_NAMESPACE, name.as_bytes()).to_string()
}
