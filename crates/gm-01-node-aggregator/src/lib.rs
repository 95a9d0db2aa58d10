//! # Node Aggregator
//!
//! The surface through which provider-controlled node agents join the fleet
//! and publish telemetry: registration, signed heartbeats with strict
//! per-node sequence ordering, periodic metric batches, and terminal
//! deregistration. The aggregator owns the node roster and cluster directory
//! exclusively; the monitor, scheduler, and lifecycle engine work with
//! snapshots and the narrow mutation methods on [`NodeAggregator`].
//!
//! ## Concurrency
//!
//! - Roster map behind a reader-writer lock; reads dominate.
//! - Per-node mutex serializes the sequence check and capacity accounting.
//! - Cluster counters are atomics, untouched by the roster lock.

pub mod domain;
pub mod ports;
pub mod service;

pub use domain::{AggregatorConfig, AggregatorError};
pub use ports::{MetricsSink, NullMetricsSink};
pub use service::{BatchOutcome, NodeAggregator, RegisterNodeRequest};
