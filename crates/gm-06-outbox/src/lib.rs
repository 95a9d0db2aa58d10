//! # Durable Outbox
//!
//! Append-only store of pending outbound records with at-least-once
//! delivery. Entries move `pending -> inflight -> acked | dead`; claims use
//! compare-and-set with lease tokens so an entry ever belongs to one
//! flusher, and entries for the same resource flush in insertion order.
//!
//! The journal-backed store survives restarts: entries inflight at a crash
//! come back `pending` and are retried. Acked entries may be purged after
//! the retention window; dead entries are kept for investigation.

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;
#[cfg(test)]
mod test_support;

pub use adapters::{FileOutboxStore, HttpDeliverySink, InMemoryOutboxStore, MarketplaceConfig};
pub use domain::{backoff_ms, OutboxConfig, OutboxError};
pub use ports::{DeliveryError, DeliveryReceipt, DeliverySink, OutboxCounts, OutboxStore};
pub use service::OutboxFlusher;
