//! Outbox error types.

use shared_types::{Classified, ErrorClass};
use thiserror::Error;

/// Errors from outbox storage and delivery bookkeeping.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OutboxError {
    /// The idempotency key already exists; carries the existing entry id.
    #[error("duplicate idempotency key, existing entry {0}")]
    DuplicateKey(String),

    /// No entry with this id.
    #[error("unknown entry: {0}")]
    UnknownEntry(String),

    /// The lease presented does not match the current claim.
    #[error("lease mismatch for entry {0}")]
    LeaseMismatch(String),

    /// The entry is not in the state the operation requires.
    #[error("entry {entry_id} is {state}, expected {expected}")]
    WrongState {
        entry_id: String,
        state: &'static str,
        expected: &'static str,
    },

    /// Journal I/O failed.
    #[error("outbox store i/o: {0}")]
    Io(String),

    /// Journal contents failed to parse.
    #[error("outbox journal corrupt: {0}")]
    Corrupt(String),
}

impl Classified for OutboxError {
    fn class(&self) -> ErrorClass {
        match self {
            OutboxError::DuplicateKey(_) => ErrorClass::StateConflict,
            OutboxError::UnknownEntry(_) => ErrorClass::Validation,
            OutboxError::LeaseMismatch(_) => ErrorClass::StateConflict,
            OutboxError::WrongState { .. } => ErrorClass::StateConflict,
            OutboxError::Io(_) => ErrorClass::Transient,
            OutboxError::Corrupt(_) => ErrorClass::Fatal,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            OutboxError::DuplicateKey(_) => "duplicate-key",
            OutboxError::UnknownEntry(_) => "unknown-entry",
            OutboxError::LeaseMismatch(_) => "lease-mismatch",
            OutboxError::WrongState { .. } => "wrong-state",
            OutboxError::Io(_) => "store-io",
            OutboxError::Corrupt(_) => "journal-corrupt",
        }
    }
}
