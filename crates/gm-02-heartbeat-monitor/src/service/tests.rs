use std::sync::Arc;

use gm_01_node_aggregator::{
    AggregatorConfig, NodeAggregator, NullMetricsSink, RegisterNodeRequest,
};
use shared_bus::{EventFilter, EventTopic, InMemoryEventBus, MarketEvent};
use shared_crypto::{to_canonical_bytes, Ed25519KeyPair};
use shared_types::{
    ClusterRecord, ClusterState, FixedTimeSource, Heartbeat, NodeLocality, NodeMetrics, NodeState,
    ResourceAmounts, TimeSource,
};

use crate::domain::MonitorConfig;
use crate::service::HeartbeatMonitor;

struct Fixture {
    aggregator: Arc<NodeAggregator>,
    monitor: HeartbeatMonitor,
    bus: Arc<InMemoryEventBus>,
    time: FixedTimeSource,
    keypair: Ed25519KeyPair,
}

fn fixture() -> Fixture {
    let time = FixedTimeSource::at_secs(1_000);
    let bus = Arc::new(InMemoryEventBus::new());
    let aggregator = Arc::new(NodeAggregator::new(
        AggregatorConfig::default(),
        Arc::new(time.clone()),
        bus.clone(),
        Arc::new(NullMetricsSink),
    ));
    aggregator.record_cluster(ClusterRecord {
        cluster_id: "c1".into(),
        provider_address: "p1".into(),
        region: "eu-west".into(),
        state: ClusterState::Active,
        total_nodes: 0,
        available_nodes: 0,
    });
    let monitor = HeartbeatMonitor::new(
        aggregator.clone(),
        bus.clone(),
        MonitorConfig::default(),
        Arc::new(time.clone()),
    );
    Fixture {
        aggregator,
        monitor,
        bus,
        time,
        keypair: Ed25519KeyPair::generate(),
    }
}

impl Fixture {
    async fn register(&self, node_id: &str) {
        self.aggregator
            .register_node(RegisterNodeRequest {
                node_id: node_id.into(),
                cluster_id: "c1".into(),
                provider_address: "p1".into(),
                public_key: *self.keypair.public_key().as_bytes(),
                hostname: "host".into(),
                capacity: ResourceAmounts {
                    cpu_cores: 4,
                    memory_gb: 8,
                    gpus: 0,
                    storage_gb: 10,
                },
                gpu_type: String::new(),
                locality: NodeLocality::default(),
            })
            .await
            .unwrap();
    }

    async fn beat(&self, node_id: &str, sequence: u64) {
        let mut hb = Heartbeat {
            node_id: node_id.into(),
            cluster_id: "c1".into(),
            sequence,
            timestamp: self.time.now(),
            metrics: NodeMetrics {
                cpu_util: 0.1,
                mem_util: 0.1,
                load1m: 0.5,
                gpu_util: 0.0,
                slurm_state: String::new(),
            },
            signature: String::new(),
        };
        let body = to_canonical_bytes(&hb.body()).unwrap();
        hb.signature = self.keypair.sign_base64(&body);
        self.aggregator.submit_heartbeat(hb).await.unwrap();
    }

    fn state(&self, node_id: &str) -> NodeState {
        self.aggregator.node(node_id).unwrap().state
    }
}

#[tokio::test]
async fn test_silence_walks_through_stale_and_offline() {
    let f = fixture();
    f.register("n1").await;
    f.beat("n1", 1).await;
    assert_eq!(f.state("n1"), NodeState::Active);

    // 35s of silence: stale.
    f.time.advance_secs(35);
    let report = f.monitor.sweep().await;
    assert_eq!(report.transitions, 1);
    assert_eq!(f.state("n1"), NodeState::Stale);

    // 130s total: offline.
    f.time.advance_secs(95);
    f.monitor.sweep().await;
    assert_eq!(f.state("n1"), NodeState::Offline);

    // Past the deregistration threshold: gone for good.
    f.time.advance_secs(3_600);
    let report = f.monitor.sweep().await;
    assert_eq!(report.deregistered, 1);
    assert_eq!(f.state("n1"), NodeState::Deregistered);
}

#[tokio::test]
async fn test_heartbeat_recovers_node_before_sweep() {
    let f = fixture();
    f.register("n1").await;
    f.beat("n1", 1).await;

    f.time.advance_secs(35);
    f.monitor.sweep().await;
    assert_eq!(f.state("n1"), NodeState::Stale);

    // A fresh beat brings it straight back to active.
    f.beat("n1", 2).await;
    assert_eq!(f.state("n1"), NodeState::Active);

    // The sweep sees a quiet, healthy node and does nothing.
    let report = f.monitor.sweep().await;
    assert_eq!(report.transitions, 0);
    assert_eq!(f.state("n1"), NodeState::Active);
}

#[tokio::test]
async fn test_transitions_are_published() {
    let f = fixture();
    let mut sub = f
        .bus
        .subscribe(EventFilter::topics(vec![EventTopic::HealthMonitor]));

    f.register("n1").await;
    f.beat("n1", 1).await;
    f.time.advance_secs(35);
    f.monitor.sweep().await;

    let event = tokio::time::timeout(std::time::Duration::from_millis(100), sub.recv())
        .await
        .expect("timeout")
        .expect("event");
    match event {
        MarketEvent::NodeHealthChanged {
            node_id,
            from,
            to,
            silent_for_ms,
            ..
        } => {
            assert_eq!(node_id, "n1");
            assert_eq!(from, NodeState::Active);
            assert_eq!(to, NodeState::Stale);
            assert!(silent_for_ms >= 35_000);
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn test_offline_node_leaves_cluster_availability() {
    let f = fixture();
    f.register("n1").await;
    f.beat("n1", 1).await;
    assert_eq!(f.aggregator.cluster("c1").unwrap().available_nodes, 1);

    f.time.advance_secs(130);
    f.monitor.sweep().await;
    assert_eq!(f.state("n1"), NodeState::Offline);
    assert_eq!(f.aggregator.cluster("c1").unwrap().available_nodes, 0);

    f.beat("n1", 2).await;
    assert_eq!(f.aggregator.cluster("c1").unwrap().available_nodes, 1);
}

#[tokio::test]
async fn test_run_honors_shutdown() {
    let f = fixture();
    f.register("n1").await;
    f.beat("n1", 1).await;

    let monitor = HeartbeatMonitor::new(
        f.aggregator.clone(),
        f.bus.clone(),
        MonitorConfig::for_testing(),
        Arc::new(f.time.clone()),
    );
    let (tx, rx) = tokio::sync::watch::channel(false);
    let handle = tokio::spawn(async move { monitor.run(rx).await });

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    tx.send(true).unwrap();
    tokio::time::timeout(std::time::Duration::from_secs(1), handle)
        .await
        .expect("monitor did not stop")
        .unwrap();
}
