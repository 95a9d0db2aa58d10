//! Aggregator error types.

use shared_types::{Classified, ErrorClass};
use thiserror::Error;

/// Errors from roster operations and telemetry ingestion.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AggregatorError {
    /// Node has never registered.
    #[error("unknown node: {0}")]
    UnknownNode(String),

    /// Cluster has never been recorded.
    #[error("unknown cluster: {0}")]
    UnknownCluster(String),

    /// Cluster exists but is not accepting nodes.
    #[error("cluster not active: {0}")]
    ClusterNotActive(String),

    /// Provider does not own the cluster it is registering into.
    #[error("provider {provider} does not own cluster {cluster}")]
    ProviderMismatch { provider: String, cluster: String },

    /// Node already registered under a different public key.
    #[error("node {0} already registered with a different key")]
    KeyMismatch(String),

    /// Node was deregistered; its id is burned.
    #[error("node {0} is deregistered")]
    NodeDeregistered(String),

    /// Heartbeat names a cluster other than the registered one.
    #[error("heartbeat cluster {got} does not match registered cluster {registered}")]
    ClusterMismatch { got: String, registered: String },

    /// Signature did not verify under the registered key.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// Sequence number at or below the last accepted one.
    #[error("sequence replay: got {got}, last accepted {last}")]
    SequenceReplay { got: u64, last: u64 },

    /// Timestamp too far in the future.
    #[error("timestamp skew: {skew_ms}ms ahead of local clock")]
    TimestampSkew { skew_ms: u64 },

    /// Not enough free capacity on a node to honor a reservation.
    #[error("insufficient capacity on node {0}")]
    InsufficientCapacity(String),

    /// Stored key bytes no longer parse; roster entry is corrupt.
    #[error("corrupt key material for node {0}")]
    CorruptKey(String),
}

impl Classified for AggregatorError {
    fn class(&self) -> ErrorClass {
        match self {
            AggregatorError::SequenceReplay { .. } => ErrorClass::StateConflict,
            AggregatorError::ProviderMismatch { .. } => ErrorClass::Policy,
            AggregatorError::CorruptKey(_) => ErrorClass::Fatal,
            _ => ErrorClass::Validation,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AggregatorError::UnknownNode(_) => "unknown-node",
            AggregatorError::UnknownCluster(_) => "unknown-cluster",
            AggregatorError::ClusterNotActive(_) => "cluster-not-active",
            AggregatorError::ProviderMismatch { .. } => "provider-mismatch",
            AggregatorError::KeyMismatch(_) => "key-mismatch",
            AggregatorError::NodeDeregistered(_) => "node-deregistered",
            AggregatorError::ClusterMismatch { .. } => "cluster-mismatch",
            AggregatorError::InvalidSignature(_) => "invalid-signature",
            AggregatorError::SequenceReplay { .. } => "sequence-replay",
            AggregatorError::TimestampSkew { .. } => "timestamp-skew",
            AggregatorError::InsufficientCapacity(_) => "insufficient-capacity",
            AggregatorError::CorruptKey(_) => "corrupt-key",
        }
    }
}
