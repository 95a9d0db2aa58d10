//! # Chain Event Client
//!
//! Maintains a persistent subscription to the consensus-layer JSON-RPC
//! event stream: one subscription query per canonical event type, frames
//! parsed into [`shared_types::ChainEvent`]s with stable reproducible ids,
//! synchronous dispatch to registered subscribers, and exponential-back-off
//! reconnection with re-subscription on resume.
//!
//! Delivery is at-least-once across the client's lifetime; there is no
//! ordering guarantee across reconnects. Subscribers dedupe by `event_id`
//! and order by `(block_height, tx_index)` when order matters.

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

pub use adapters::TungsteniteConnector;
pub use domain::{canonical_for, event_id, parse_frame, EventClientConfig, MAPPINGS};
pub use ports::{EventSocket, SocketConnector, SocketError};
pub use service::{ChainEventClient, ConnectionState, EventHandler};
