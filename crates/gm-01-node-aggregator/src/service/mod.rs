//! Service layer of the node aggregator.

pub mod core;

pub use core::{BatchOutcome, NodeAggregator, RegisterNodeRequest};
