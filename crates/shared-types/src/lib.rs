//! # Shared Types Crate
//!
//! Cross-subsystem domain entities, the error taxonomy, and the injected
//! time source.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: every type that crosses a subsystem boundary
//!   is defined here.
//! - **Exclusive Ownership**: the aggregator owns the node roster, the
//!   lifecycle engine owns job state, the reporter owns the outbox; everyone
//!   else works with snapshots of these entities.
//! - **Injected Time**: no component reads the wall clock directly; all take
//!   a [`time::TimeSource`].

pub mod entities;
pub mod errors;
pub mod time;

pub use entities::*;
pub use errors::{Classified, ErrorClass};
pub use time::{FixedTimeSource, SystemTimeSource, TimeSource, Timestamp};
