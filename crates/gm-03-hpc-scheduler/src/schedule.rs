//! The placement function.

use shared_types::{ClusterRecord, Job, NodeRecord, SchedulingDecision, Timestamp};

use crate::candidates::{eligible_clusters, eligible_nodes, locality_buckets};
use crate::config::SchedulerWeights;
use crate::errors::ScheduleError;
use crate::scoring::{headroom, node_score, softmax, tie_break_seed};

/// Pick a cluster and node set for a job.
///
/// A pure function of its inputs: the same job against the same roster view
/// always yields the same decision, with ties broken by hashing
/// `(job_id, node_ids)` rather than any ambient state.
pub fn schedule(
    job: &Job,
    nodes: &[NodeRecord],
    clusters: &[ClusterRecord],
    weights: &SchedulerWeights,
    now: Timestamp,
) -> Result<SchedulingDecision, ScheduleError> {
    let wanted = job.resources.nodes as usize;
    if wanted == 0 {
        return Err(ScheduleError::InvalidDemand(
            "job demands zero nodes".into(),
        ));
    }

    let cluster_pool = eligible_clusters(job, clusters);
    if cluster_pool.is_empty() {
        return Err(ScheduleError::NoEligibleCluster(format!(
            "{} clusters known, none active in-region with {} available nodes",
            clusters.len(),
            wanted
        )));
    }

    let mut best: Option<Candidate> = None;
    for cluster in &cluster_pool {
        let eligible = eligible_nodes(job, &cluster.cluster_id, nodes);
        if eligible.len() < wanted {
            continue;
        }

        // Capacity shares are smoothed within the cluster, not per bucket,
        // so bucket choice does not distort relative headroom.
        let headrooms: Vec<f64> = eligible.iter().map(|n| headroom(n)).collect();
        let shares = softmax(&headrooms);
        let scored: Vec<(&NodeRecord, f64)> = eligible
            .iter()
            .zip(shares)
            .map(|(node, share)| (*node, node_score(node, share, weights)))
            .collect();

        for (_, bucket) in locality_buckets(job.constraints.locality, eligible.clone()) {
            if bucket.len() < wanted {
                continue;
            }
            let mut ranked: Vec<&(&NodeRecord, f64)> = scored
                .iter()
                .filter(|(node, _)| bucket.iter().any(|b| b.node_id == node.node_id))
                .collect();
            // Deterministic: score first, node id as the stable fallback.
            ranked.sort_by(|a, b| {
                b.1.partial_cmp(&a.1)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.0.node_id.cmp(&b.0.node_id))
            });

            let selected: Vec<String> = ranked[..wanted]
                .iter()
                .map(|(node, _)| node.node_id.clone())
                .collect();
            let score =
                ranked[..wanted].iter().map(|(_, s)| s).sum::<f64>() / wanted as f64;
            let seed = tie_break_seed(&job.job_id, &selected);

            let candidate = Candidate {
                cluster_id: cluster.cluster_id.clone(),
                node_ids: selected,
                score,
                seed,
            };
            if candidate.beats(best.as_ref()) {
                best = Some(candidate);
            }
        }
    }

    let Some(winner) = best else {
        return Err(ScheduleError::NoCandidateSet(format!(
            "{} eligible clusters, none with {} nodes satisfying capacity and locality",
            cluster_pool.len(),
            wanted
        )));
    };

    Ok(SchedulingDecision {
        job_id: job.job_id.clone(),
        cluster_id: winner.cluster_id,
        node_ids: winner.node_ids,
        score: winner.score,
        decided_at: now,
        tie_breaker_seed: winner.seed,
    })
}

struct Candidate {
    cluster_id: String,
    node_ids: Vec<String>,
    score: f64,
    seed: String,
}

impl Candidate {
    /// Strictly better score wins; equal scores fall to the digest.
    fn beats(&self, current: Option<&Candidate>) -> bool {
        match current {
            None => true,
            Some(other) => {
                if (self.score - other.score).abs() > 1e-9 {
                    self.score > other.score
                } else {
                    self.seed < other.seed
                }
            }
        }
    }
}
