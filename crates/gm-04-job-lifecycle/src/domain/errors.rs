//! Lifecycle error types.

use shared_types::{Classified, ErrorClass, JobState};
use thiserror::Error;

/// Errors from the job state machine and its orchestration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LifecycleError {
    /// The requested transition is not an edge of the state graph.
    #[error("invalid transition: {from:?} -> {to:?}")]
    InvalidTransition { from: JobState, to: JobState },

    /// No job with this id.
    #[error("unknown job: {0}")]
    UnknownJob(String),

    /// A job with this id already exists.
    #[error("duplicate job: {0}")]
    DuplicateJob(String),

    /// The job is terminal; only settlement fields may change.
    #[error("job {0} is terminal")]
    TerminalJob(String),

    /// A decision is already recorded and is never rewritten.
    #[error("job {0} already has a scheduling decision")]
    DecisionExists(String),

    /// Placement failed and may be retried.
    #[error("placement failed: {0}")]
    PlacementFailed(String),

    /// Capacity reservation failed after a decision was produced.
    #[error("reservation failed: {0}")]
    ReservationFailed(String),
}

impl Classified for LifecycleError {
    fn class(&self) -> ErrorClass {
        match self {
            LifecycleError::InvalidTransition { .. } => ErrorClass::Validation,
            LifecycleError::UnknownJob(_) => ErrorClass::Validation,
            LifecycleError::DuplicateJob(_) => ErrorClass::StateConflict,
            LifecycleError::TerminalJob(_) => ErrorClass::StateConflict,
            LifecycleError::DecisionExists(_) => ErrorClass::StateConflict,
            LifecycleError::PlacementFailed(_) => ErrorClass::Transient,
            LifecycleError::ReservationFailed(_) => ErrorClass::Transient,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            LifecycleError::InvalidTransition { .. } => "invalid-transition",
            LifecycleError::UnknownJob(_) => "unknown-job",
            LifecycleError::DuplicateJob(_) => "duplicate-job",
            LifecycleError::TerminalJob(_) => "terminal-job",
            LifecycleError::DecisionExists(_) => "decision-exists",
            LifecycleError::PlacementFailed(_) => "placement-failed",
            LifecycleError::ReservationFailed(_) => "reservation-failed",
        }
    }
}
