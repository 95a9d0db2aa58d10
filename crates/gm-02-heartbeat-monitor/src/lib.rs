//! # Heartbeat Monitor
//!
//! Converts "time since last heartbeat" into a categorical health status:
//! healthy nodes go `stale`, then `offline`, and are finally deregistered
//! after an hour of silence. The classification itself is pure
//! ([`domain::classifier`]); a single sweep task applies it through the
//! aggregator and announces transitions on the bus.

pub mod domain;
pub mod service;

pub use domain::{classify, next_state, MonitorConfig};
pub use service::{HeartbeatMonitor, SweepReport};
