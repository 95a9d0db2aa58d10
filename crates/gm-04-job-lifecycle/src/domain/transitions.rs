//! The job state graph.
//!
//! ```text
//! submitted ──► scheduled ──► queued ──► running ──► completed
//!      │            │            │          │
//!      └──► failed ◄┴────────────┴──────────┴──► cancelled
//! ```
//!
//! Every applied transition produces one audit record; the records for a job
//! always form a path through this graph.

use shared_types::{JobState, Timestamp, TransitionRecord};

use super::errors::LifecycleError;

/// Whether `from -> to` is an edge of the graph.
pub fn is_allowed(from: JobState, to: JobState) -> bool {
    use JobState::*;
    matches!(
        (from, to),
        (Submitted, Scheduled)
            | (Scheduled, Queued)
            | (Queued, Running)
            | (Running, Completed)
            | (Submitted | Scheduled | Queued | Running, Failed)
            | (Submitted | Scheduled | Queued | Running, Cancelled)
    )
}

/// Guard a transition, producing its audit record when legal.
pub fn guard(
    job_id: &str,
    from: JobState,
    to: JobState,
    reason: &str,
    at: Timestamp,
) -> Result<TransitionRecord, LifecycleError> {
    if !is_allowed(from, to) {
        return Err(LifecycleError::InvalidTransition { from, to });
    }
    Ok(TransitionRecord {
        job_id: job_id.to_string(),
        from,
        to,
        reason: reason.to_string(),
        timestamp: at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_edges() {
        use JobState::*;
        assert!(is_allowed(Submitted, Scheduled));
        assert!(is_allowed(Scheduled, Queued));
        assert!(is_allowed(Queued, Running));
        assert!(is_allowed(Running, Completed));
    }

    #[test]
    fn test_every_nonterminal_can_fail_or_cancel() {
        use JobState::*;
        for from in [Submitted, Scheduled, Queued, Running] {
            assert!(is_allowed(from, Failed), "{from:?} -> Failed");
            assert!(is_allowed(from, Cancelled), "{from:?} -> Cancelled");
        }
    }

    #[test]
    fn test_illegal_edges() {
        use JobState::*;
        assert!(!is_allowed(Submitted, Queued)); // skips scheduled
        assert!(!is_allowed(Submitted, Running));
        assert!(!is_allowed(Scheduled, Completed));
        assert!(!is_allowed(Completed, Running)); // terminal never leaves
        assert!(!is_allowed(Failed, Submitted));
        assert!(!is_allowed(Cancelled, Cancelled));
        assert!(!is_allowed(Running, Running));
    }

    #[test]
    fn test_guard_produces_audit_record() {
        let record = guard(
            "j1",
            JobState::Queued,
            JobState::Running,
            "provider start report",
            Timestamp::from_secs(42),
        )
        .unwrap();
        assert_eq!(record.job_id, "j1");
        assert_eq!(record.from, JobState::Queued);
        assert_eq!(record.to, JobState::Running);
        assert_eq!(record.timestamp.as_secs(), 42);
    }

    #[test]
    fn test_guard_rejects_illegal() {
        let err = guard(
            "j1",
            JobState::Completed,
            JobState::Running,
            "x",
            Timestamp::from_secs(0),
        )
        .unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidTransition { .. }));
    }
}
