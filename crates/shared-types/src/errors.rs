//! # Error Taxonomy
//!
//! Every error surfaced across a subsystem boundary carries a class from the
//! shared taxonomy so the HTTP layer (and operators) can translate it
//! uniformly:
//!
//! - **Validation** - caller data violates a constraint; never retried.
//! - **Transient** - infrastructure hiccup; retried with back-off.
//! - **StateConflict** - idempotent duplicate or replay; answered with the
//!   existing record, never duplicated effects.
//! - **Policy** - caller not authorized or over quota; audited.
//! - **Fatal** - broken invariant or corruption; the affected subsystem halts.

use serde::{Deserialize, Serialize};

/// Classification of an error for propagation and HTTP translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorClass {
    Validation,
    Transient,
    StateConflict,
    Policy,
    Fatal,
}

/// Implemented by every cross-boundary error type.
pub trait Classified {
    /// Taxonomy class of this error.
    fn class(&self) -> ErrorClass;

    /// Stable machine-readable code for 4xx response bodies.
    fn code(&self) -> &'static str;
}
