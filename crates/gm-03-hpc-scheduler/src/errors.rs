//! Scheduler outcomes.

use thiserror::Error;

/// Why no placement could be produced. The caller may requeue and retry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScheduleError {
    /// No cluster survived the region/state/availability filter.
    #[error("no placement: no eligible cluster ({0})")]
    NoEligibleCluster(String),

    /// Clusters survived but none had enough nodes satisfying the demand
    /// and locality constraint.
    #[error("no placement: no candidate node set ({0})")]
    NoCandidateSet(String),

    /// The job demand itself is impossible (zero nodes requested).
    #[error("invalid demand: {0}")]
    InvalidDemand(String),
}
