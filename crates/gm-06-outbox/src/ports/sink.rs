//! # The Delivery Port
//!
//! Where flushed entries go. The production sink is the marketplace HTTP
//! API; tests script their own.

use async_trait::async_trait;
use shared_types::OutboxEntry;

/// Successful delivery; the remote may assign its own id (and returns the
/// original one for idempotent duplicates).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub remote_id: Option<String>,
}

/// A failed delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// Worth retrying: timeouts, 5xx, connection failures.
    Retriable(String),
    /// Never worth retrying: the remote rejected the payload itself.
    Permanent(String),
}

impl std::fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryError::Retriable(msg) => write!(f, "retriable: {msg}"),
            DeliveryError::Permanent(msg) => write!(f, "permanent: {msg}"),
        }
    }
}

/// Delivers one entry to its destination.
#[async_trait]
pub trait DeliverySink: Send + Sync {
    async fn deliver(&self, entry: &OutboxEntry) -> Result<DeliveryReceipt, DeliveryError>;
}
