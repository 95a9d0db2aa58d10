//! Shared builders for the integration flows.

use std::sync::Arc;

use gm_01_node_aggregator::{
    AggregatorConfig, NodeAggregator, NullMetricsSink, RegisterNodeRequest,
};
use shared_bus::InMemoryEventBus;
use shared_crypto::{to_canonical_bytes, Ed25519KeyPair};
use shared_types::{
    ClusterRecord, ClusterState, FixedTimeSource, Heartbeat, NodeLocality, NodeMetrics,
    ResourceAmounts, TimeSource,
};

/// An aggregator with one active cluster, on a controllable clock.
pub struct Fleet {
    pub aggregator: Arc<NodeAggregator>,
    pub bus: Arc<InMemoryEventBus>,
    pub time: FixedTimeSource,
    pub node_key: Ed25519KeyPair,
}

impl Fleet {
    pub fn new() -> Self {
        let time = FixedTimeSource::at_secs(10_000);
        let bus = Arc::new(InMemoryEventBus::new());
        let aggregator = Arc::new(NodeAggregator::new(
            AggregatorConfig::default(),
            Arc::new(time.clone()),
            bus.clone(),
            Arc::new(NullMetricsSink),
        ));
        aggregator.record_cluster(ClusterRecord {
            cluster_id: "c1".into(),
            provider_address: "provider-1".into(),
            region: "eu-west".into(),
            state: ClusterState::Active,
            total_nodes: 0,
            available_nodes: 0,
        });
        Self {
            aggregator,
            bus,
            time,
            node_key: Ed25519KeyPair::from_seed([42u8; 32]),
        }
    }

    /// Register a node with the shared test key and the given vCPU count.
    pub async fn register(&self, node_id: &str, cpu_cores: u64) {
        self.aggregator
            .register_node(RegisterNodeRequest {
                node_id: node_id.into(),
                cluster_id: "c1".into(),
                provider_address: "provider-1".into(),
                public_key: *self.node_key.public_key().as_bytes(),
                hostname: format!("{node_id}.example"),
                capacity: ResourceAmounts {
                    cpu_cores,
                    memory_gb: cpu_cores * 4,
                    gpus: 0,
                    storage_gb: 50,
                },
                gpu_type: String::new(),
                locality: NodeLocality {
                    region: "eu-west".into(),
                    datacenter: "dc1".into(),
                    zone: "z1".into(),
                    rack: "r1".into(),
                },
            })
            .await
            .expect("registration");
    }

    /// Submit a correctly signed heartbeat at the current test time.
    pub async fn beat(&self, node_id: &str, sequence: u64) -> Result<(), String> {
        let mut hb = Heartbeat {
            node_id: node_id.into(),
            cluster_id: "c1".into(),
            sequence,
            timestamp: self.time.now(),
            metrics: NodeMetrics {
                cpu_util: 0.3,
                mem_util: 0.2,
                load1m: 1.0,
                gpu_util: 0.0,
                slurm_state: "idle".into(),
            },
            signature: String::new(),
        };
        let body = to_canonical_bytes(&hb.body()).expect("canonical body");
        hb.signature = self.node_key.sign_base64(&body);
        self.aggregator
            .submit_heartbeat(hb)
            .await
            .map_err(|e| e.to_string())
    }
}

impl Default for Fleet {
    fn default() -> Self {
        Self::new()
    }
}
