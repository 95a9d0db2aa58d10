//! Candidate filtering and locality grouping.

use std::collections::BTreeMap;

use shared_types::{
    ClusterRecord, ClusterState, Job, LocalityConstraint, NodeRecord, NodeState,
};

/// Clusters eligible to host the job: active, inside the region allow-list,
/// with at least the demanded number of available nodes.
pub fn eligible_clusters<'a>(job: &Job, clusters: &'a [ClusterRecord]) -> Vec<&'a ClusterRecord> {
    clusters
        .iter()
        .filter(|c| c.state == ClusterState::Active)
        .filter(|c| {
            job.constraints.regions.is_empty() || job.constraints.regions.contains(&c.region)
        })
        .filter(|c| c.available_nodes >= job.resources.nodes)
        .collect()
}

/// Nodes inside one cluster eligible for the job: active, carrying the
/// required GPU model, with enough free capacity for the per-node demand.
pub fn eligible_nodes<'a>(job: &Job, cluster_id: &str, nodes: &'a [NodeRecord]) -> Vec<&'a NodeRecord> {
    let per_node = job.resources.per_node();
    nodes
        .iter()
        .filter(|n| n.cluster_id == cluster_id)
        .filter(|n| n.state == NodeState::Active)
        .filter(|n| {
            job.constraints.gpu_type.is_empty() || n.capacity.gpu_type == job.constraints.gpu_type
        })
        .filter(|n| n.capacity.available.covers(&per_node))
        .collect()
}

/// Group eligible nodes into locality buckets per the job's constraint.
///
/// `SameRack` uses the exact `(zone, rack)` pair; `SameZone` widens the
/// bucket to the zone; `None` is one bucket per cluster. BTreeMap keeps
/// bucket iteration deterministic.
pub fn locality_buckets<'a>(
    constraint: LocalityConstraint,
    nodes: Vec<&'a NodeRecord>,
) -> BTreeMap<String, Vec<&'a NodeRecord>> {
    let mut buckets: BTreeMap<String, Vec<&NodeRecord>> = BTreeMap::new();
    for node in nodes {
        let key = match constraint {
            LocalityConstraint::None => String::new(),
            LocalityConstraint::SameZone => node.locality.zone.clone(),
            LocalityConstraint::SameRack => {
                format!("{}/{}", node.locality.zone, node.locality.rack)
            }
        };
        buckets.entry(key).or_default().push(node);
    }
    buckets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{cluster, demand_job, node};
    use shared_types::PlacementConstraints;

    #[test]
    fn test_cluster_filter_region_and_availability() {
        let mut job = demand_job(2, 2, 4);
        job.constraints = PlacementConstraints {
            regions: vec!["eu-west".into()],
            ..Default::default()
        };
        let clusters = vec![
            cluster("c1", "eu-west", ClusterState::Active, 4),
            cluster("c2", "us-east", ClusterState::Active, 4), // wrong region
            cluster("c3", "eu-west", ClusterState::Draining, 4), // not active
            cluster("c4", "eu-west", ClusterState::Active, 1), // too few nodes
        ];
        let eligible = eligible_clusters(&job, &clusters);
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].cluster_id, "c1");
    }

    #[test]
    fn test_node_filter_capacity_and_gpu() {
        let mut job = demand_job(1, 4, 8);
        job.constraints.gpu_type = "a100".into();

        let mut gpu_node = node("n1", "c1", 8, 16);
        gpu_node.capacity.gpu_type = "a100".into();
        let mut wrong_gpu = node("n2", "c1", 8, 16);
        wrong_gpu.capacity.gpu_type = "h100".into();
        let mut small = node("n3", "c1", 2, 4);
        small.capacity.gpu_type = "a100".into();
        let nodes = vec![gpu_node, wrong_gpu, small, node("n4", "c2", 8, 16)];

        let eligible = eligible_nodes(&job, "c1", &nodes);
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].node_id, "n1");
    }

    #[test]
    fn test_rack_buckets_are_exact() {
        let mut a = node("n1", "c1", 8, 16);
        a.locality.zone = "z1".into();
        a.locality.rack = "r1".into();
        let mut b = node("n2", "c1", 8, 16);
        b.locality.zone = "z1".into();
        b.locality.rack = "r1".into();
        let mut c = node("n3", "c1", 8, 16);
        c.locality.zone = "z1".into();
        c.locality.rack = "r2".into();

        let nodes = vec![&a, &b, &c];
        let racks = locality_buckets(LocalityConstraint::SameRack, nodes.clone());
        assert_eq!(racks.len(), 2);
        assert_eq!(racks["z1/r1"].len(), 2);

        let zones = locality_buckets(LocalityConstraint::SameZone, nodes.clone());
        assert_eq!(zones.len(), 1);
        assert_eq!(zones["z1"].len(), 3);

        let any = locality_buckets(LocalityConstraint::None, nodes);
        assert_eq!(any.len(), 1);
    }
}
