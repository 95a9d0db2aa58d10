//! Builders shared by the scheduler's tests.

use shared_types::{
    ClusterRecord, ClusterState, Job, JobState, NodeCapacity, NodeLocality, NodeRecord, NodeState,
    PlacementConstraints, ResourceAmounts, ResourceDemand, Timestamp, WorkloadSpec,
};

pub fn cluster(id: &str, region: &str, state: ClusterState, available: u64) -> ClusterRecord {
    ClusterRecord {
        cluster_id: id.into(),
        provider_address: "p1".into(),
        region: region.into(),
        state,
        total_nodes: available,
        available_nodes: available,
    }
}

pub fn node(id: &str, cluster_id: &str, cpu: u64, mem: u64) -> NodeRecord {
    NodeRecord {
        node_id: id.into(),
        cluster_id: cluster_id.into(),
        provider_address: "p1".into(),
        public_key: [0u8; 32],
        hostname: format!("{id}.example"),
        capacity: NodeCapacity::unused(
            ResourceAmounts {
                cpu_cores: cpu,
                memory_gb: mem,
                gpus: 0,
                storage_gb: 50,
            },
            "",
        ),
        locality: NodeLocality {
            region: "eu-west".into(),
            datacenter: "dc1".into(),
            zone: "z1".into(),
            rack: "r1".into(),
        },
        state: NodeState::Active,
        last_sequence: 1,
        last_heartbeat_at: Timestamp::from_secs(999),
        recent_latency_ms: 50.0,
        reliability: 0.5,
    }
}

pub fn demand_job(nodes: u64, cpu_per_node: u64, mem_per_node: u64) -> Job {
    Job {
        job_id: "job-1".into(),
        offering_id: "offer-1".into(),
        customer_address: "cust-1".into(),
        escrow_id: "escrow-1".into(),
        workload: WorkloadSpec {
            image: "registry/batch:1".into(),
            command: "run".into(),
            args: Vec::new(),
            env: Default::default(),
        },
        resources: ResourceDemand {
            nodes,
            cpu_per_node,
            mem_gb_per_node: mem_per_node,
            gpus_per_node: 0,
            storage_gb_per_node: 0,
        },
        constraints: PlacementConstraints::default(),
        max_runtime_seconds: 3_600,
        state: JobState::Submitted,
        decision: None,
        submitted_at: Timestamp::from_secs(1_000),
        terminal_at: None,
        exit_code: None,
    }
}
