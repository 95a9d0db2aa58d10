//! The reporter service.

pub mod reporter;

pub use reporter::{marketplace_payload, signing_bytes, UsageReporter};
