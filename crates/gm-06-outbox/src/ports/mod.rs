//! Ports of the outbox.

pub mod sink;
pub mod store;

pub use sink::{DeliveryError, DeliveryReceipt, DeliverySink};
pub use store::{OutboxCounts, OutboxStore};
