//! Reporter error types.

use gm_06_outbox::OutboxError;
use shared_types::{Classified, ErrorClass};
use thiserror::Error;

/// Errors from usage accounting.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReporterError {
    /// The sample is not newer than the previous one.
    #[error("non-monotonic sample time for resource {0}")]
    NonMonotonicTime(String),

    /// The candidate period would overlap an already-emitted record.
    #[error("overlapping period for resource {0}")]
    Overlap(String),

    /// The resource already carries its final record.
    #[error("resource {0} is finalized")]
    AlreadyFinal(String),

    /// No snapshot exists yet for the resource.
    #[error("no snapshot for resource {0}")]
    NoSnapshot(String),

    /// The outbox rejected the record.
    #[error(transparent)]
    Store(#[from] OutboxError),
}

impl Classified for ReporterError {
    fn class(&self) -> ErrorClass {
        match self {
            ReporterError::NonMonotonicTime(_) => ErrorClass::Validation,
            ReporterError::Overlap(_) => ErrorClass::StateConflict,
            ReporterError::AlreadyFinal(_) => ErrorClass::StateConflict,
            ReporterError::NoSnapshot(_) => ErrorClass::Validation,
            ReporterError::Store(e) => e.class(),
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ReporterError::NonMonotonicTime(_) => "non-monotonic-time",
            ReporterError::Overlap(_) => "overlapping-period",
            ReporterError::AlreadyFinal(_) => "already-final",
            ReporterError::NoSnapshot(_) => "no-snapshot",
            ReporterError::Store(e) => e.code(),
        }
    }
}
