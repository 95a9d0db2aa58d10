//! The lifecycle engine service.

pub mod engine;

pub use engine::{JobLifecycleEngine, JobSubmission};
