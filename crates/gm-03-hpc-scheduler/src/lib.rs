//! # HPC Scheduler
//!
//! Placement for batch jobs: filter clusters and nodes against the job's
//! demand and constraints, group candidates by locality, score by a weighted
//! blend of softmax-smoothed capacity headroom, recent latency, and
//! historical reliability, and break ties by hashing `(job_id, node_ids)`.
//!
//! The scheduler holds no mutable state: [`schedule`] is a pure function of
//! the job and the roster view it is handed. Decisions are recorded in the
//! job by the lifecycle engine so a rerun never re-places a scheduled job.

mod candidates;
mod config;
mod errors;
mod schedule;
mod scoring;
#[cfg(test)]
mod test_support;

pub use config::SchedulerWeights;
pub use errors::ScheduleError;
pub use schedule::schedule;
pub use scoring::{headroom, latency_score, softmax, tie_break_seed};
