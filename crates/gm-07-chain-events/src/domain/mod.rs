//! Frame parsing, mapping, and reconnect policy.

pub mod config;
pub mod mapping;
pub mod parse;

pub use config::EventClientConfig;
pub use mapping::{canonical_for, subscription_query, EventMapping, MAPPINGS};
pub use parse::{event_id, parse_frame};
