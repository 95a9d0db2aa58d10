//! # Usage Reporter
//!
//! Aggregates raw cumulative counters into time-bounded, signed usage
//! records and delivers them at-least-once through the outbox.
//!
//! Key properties:
//! - `usage_id` is a deterministic function of `(resource, start, end)`, so
//!   re-submitting an identical record is a no-op.
//! - Periods for one resource never overlap, and at most one final record
//!   exists per resource.
//! - Cumulative counters are monotone; an apparent decrease is treated as a
//!   fresh epoch after an agent restart, counted from zero.

pub mod domain;
pub mod service;

pub use domain::{ReporterConfig, ReporterError};
pub use service::{marketplace_payload, signing_bytes, UsageReporter};
