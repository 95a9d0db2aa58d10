use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use gm_02_heartbeat_monitor::{HeartbeatMonitor, MonitorConfig};
use gm_03_hpc_scheduler::SchedulerWeights;
use gm_04_job_lifecycle::{JobLifecycleEngine, LifecycleConfig, NullProviderGateway};
use gm_05_usage_reporter::UsageReporter;
use gm_06_outbox::{
    DeliveryError, DeliveryReceipt, DeliverySink, FileOutboxStore, InMemoryOutboxStore,
    OutboxConfig, OutboxFlusher, OutboxStore,
};
use gm_07_chain_events::{
    ChainEventClient, EventClientConfig, EventSocket, SocketConnector, SocketError,
};
use market_runtime::wiring::{BillingAdapter, FleetAdapter, SchedulerAdapter};
use shared_bus::InMemoryEventBus;
use shared_crypto::Ed25519KeyPair;
use shared_types::{
    CumulativeCounters, FixedTimeSource, JobState, NodeState, OutboxState, PlacementConstraints,
    ResourceDemand, TimeSource, Timestamp, WorkloadSpec,
};

use super::fixtures::Fleet;

// =============================================================================
// SCENARIO 1: REGISTER, BEAT, OBSERVE
// =============================================================================

#[tokio::test]
async fn register_beat_observe() {
    let fleet = Fleet::new();
    let monitor = HeartbeatMonitor::new(
        fleet.aggregator.clone(),
        fleet.bus.clone(),
        MonitorConfig::default(),
        Arc::new(fleet.time.clone()),
    );

    fleet.register("n1", 4).await;
    for sequence in 1..=5u64 {
        fleet.time.advance_secs(1);
        fleet.beat("n1", sequence).await.unwrap();
    }
    assert_eq!(fleet.aggregator.node("n1").unwrap().state, NodeState::Active);

    // 35 seconds after the last beat: stale.
    fleet.time.advance_secs(35);
    monitor.sweep().await;
    assert_eq!(fleet.aggregator.node("n1").unwrap().state, NodeState::Stale);

    // 130 seconds after the last beat: offline.
    fleet.time.advance_secs(95);
    monitor.sweep().await;
    assert_eq!(fleet.aggregator.node("n1").unwrap().state, NodeState::Offline);
}

// =============================================================================
// SCENARIO 2: REPLAY REJECTION
// =============================================================================

#[tokio::test]
async fn replay_rejection() {
    let fleet = Fleet::new();
    fleet.register("n1", 4).await;
    for sequence in 1..=5u64 {
        fleet.time.advance_secs(1);
        fleet.beat("n1", sequence).await.unwrap();
    }

    let err = fleet.beat("n1", 3).await.unwrap_err();
    assert!(err.contains("sequence replay"), "got: {err}");
    assert_eq!(fleet.aggregator.node("n1").unwrap().last_sequence, 5);
}

// =============================================================================
// SCENARIO 3: SCHEDULE + DISPATCH
// =============================================================================

#[tokio::test]
async fn schedule_and_dispatch() {
    let fleet = Fleet::new();
    for (i, node_id) in ["n1", "n2", "n3", "n4"].iter().enumerate() {
        fleet.register(node_id, 2).await; // 2 vCPU each
        fleet.time.advance_secs(1);
        fleet.beat(node_id, (i + 1) as u64).await.unwrap();
    }

    let store: Arc<dyn OutboxStore> = Arc::new(InMemoryOutboxStore::new());
    let reporter = Arc::new(UsageReporter::new(
        gm_05_usage_reporter::ReporterConfig::for_testing(),
        Arc::new(Ed25519KeyPair::from_seed([9u8; 32])),
        store.clone(),
        fleet.bus.clone(),
    ));
    let engine = Arc::new(JobLifecycleEngine::new(
        LifecycleConfig::for_testing(),
        Arc::new(fleet.time.clone()),
        fleet.bus.clone(),
        Arc::new(SchedulerAdapter {
            aggregator: fleet.aggregator.clone(),
            weights: SchedulerWeights::default(),
            time: Arc::new(fleet.time.clone()),
        }),
        Arc::new(FleetAdapter {
            aggregator: fleet.aggregator.clone(),
        }),
        Arc::new(BillingAdapter {
            reporter,
            store,
            time: Arc::new(fleet.time.clone()),
        }),
        Arc::new(NullProviderGateway),
    ));

    let job = engine
        .submit(gm_04_job_lifecycle::JobSubmission {
            job_id: "j1".into(),
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
                nodes: 2,
                cpu_per_node: 2,
                mem_gb_per_node: 4,
                gpus_per_node: 0,
                storage_gb_per_node: 0,
            },
            constraints: PlacementConstraints::default(),
            max_runtime_seconds: 600,
        })
        .await
        .unwrap();

    assert_eq!(job.state, JobState::Scheduled);
    let decision = job.decision.expect("decision recorded");
    assert_eq!(decision.cluster_id, "c1");
    assert_eq!(decision.node_ids.len(), 2);

    // Remaining capacity recorded: selected nodes are fully reserved.
    for node_id in &decision.node_ids {
        let node = fleet.aggregator.node(node_id).unwrap();
        assert_eq!(node.capacity.available.cpu_cores, 0, "{node_id}");
    }
    let untouched: Vec<String> = ["n1", "n2", "n3", "n4"]
        .iter()
        .map(|s| s.to_string())
        .filter(|id| !decision.node_ids.contains(id))
        .collect();
    for node_id in &untouched {
        let node = fleet.aggregator.node(node_id).unwrap();
        assert_eq!(node.capacity.available.cpu_cores, 2, "{node_id}");
    }

    // Dispatch acknowledgment moves the job along.
    engine.acknowledge_dispatch("j1").await.unwrap();
    assert_eq!(engine.job("j1").unwrap().state, JobState::Queued);
}

// =============================================================================
// SCENARIO 4: USAGE DEDUPE
// =============================================================================

/// Marketplace double: counts logical inserts by idempotency key and can
/// fail the first call.
struct CountingMarketplace {
    inserted: Mutex<HashSet<String>>,
    deliveries: AtomicUsize,
    fail_first: AtomicUsize,
}

impl CountingMarketplace {
    fn new(failures: usize) -> Arc<Self> {
        Arc::new(Self {
            inserted: Mutex::new(HashSet::new()),
            deliveries: AtomicUsize::new(0),
            fail_first: AtomicUsize::new(failures),
        })
    }
}

#[async_trait]
impl DeliverySink for CountingMarketplace {
    async fn deliver(
        &self,
        entry: &shared_types::OutboxEntry,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        self.deliveries.fetch_add(1, Ordering::SeqCst);
        if self.fail_first.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
            n.checked_sub(1)
        })
        .is_ok()
        {
            return Err(DeliveryError::Retriable("flaky".into()));
        }
        // Duplicate submissions return the original id with a 200.
        self.inserted
            .lock()
            .unwrap()
            .insert(entry.idempotency_key.clone());
        Ok(DeliveryReceipt {
            remote_id: Some(entry.idempotency_key.clone()),
        })
    }
}

#[tokio::test]
async fn usage_dedupe() {
    let time = FixedTimeSource::at_secs(36_000); // 10:00
    let bus = Arc::new(InMemoryEventBus::new());
    let store = Arc::new(InMemoryOutboxStore::new());
    let reporter = UsageReporter::new(
        gm_05_usage_reporter::ReporterConfig::default(),
        Arc::new(Ed25519KeyPair::from_seed([3u8; 32])),
        store.clone(),
        bus.clone(),
    );

    let counters = |cpu: f64| CumulativeCounters {
        cpu_core_seconds: cpu,
        ..Default::default()
    };
    reporter
        .record_metrics("r1", counters(0.0), Timestamp::from_secs(36_000))
        .await
        .unwrap();
    let record = reporter
        .record_metrics("r1", counters(3_600.0), Timestamp::from_secs(39_600)) // 11:00
        .await
        .unwrap()
        .unwrap();

    // The id is a pure function of the triple.
    assert_eq!(
        record.usage_id,
        shared_crypto::usage_id("r1", 36_000_000, 39_600_000)
    );

    // A retried identical submission is a no-op: the reporter refuses to
    // double-insert the same idempotency key.
    let duplicate = store
        .insert(shared_types::OutboxEntry {
            entry_id: "retry".into(),
            kind: shared_types::OutboxKind::Usage,
            payload: serde_json::json!({}),
            idempotency_key: record.usage_id.clone(),
            resource_key: "r1".into(),
            attempt_count: 0,
            next_attempt_at: Timestamp::from_secs(39_600),
            state: OutboxState::Pending,
            lease: None,
            inserted_at: Timestamp::from_secs(39_600),
        })
        .await;
    assert!(matches!(
        duplicate,
        Err(gm_06_outbox::OutboxError::DuplicateKey(_))
    ));

    // Flusher: first delivery fails, the retry acks. One logical insert.
    let marketplace = CountingMarketplace::new(1);
    let flusher = OutboxFlusher::new(
        store.clone(),
        marketplace.clone(),
        OutboxConfig::for_testing(),
        Arc::new(time.clone()),
        bus,
    );
    time.set_millis(39_600_000);
    assert!(flusher.flush_one().await.unwrap()); // fails, rescheduled
    time.advance_millis(100);
    assert!(flusher.flush_one().await.unwrap()); // second try acks

    assert_eq!(marketplace.deliveries.load(Ordering::SeqCst), 2);
    assert_eq!(marketplace.inserted.lock().unwrap().len(), 1);
    assert_eq!(
        store.get(&record.usage_id).await.unwrap().unwrap().state,
        OutboxState::Acked
    );
}

// =============================================================================
// SCENARIO 5: OUTBOX RECOVERY
// =============================================================================

#[tokio::test]
async fn outbox_recovery_across_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("outbox.journal");
    let time = FixedTimeSource::at_secs(1_000);

    let entry = shared_types::OutboxEntry {
        entry_id: "e1".into(),
        kind: shared_types::OutboxKind::Settlement,
        payload: serde_json::json!({ "jobId": "j1" }),
        idempotency_key: "k1".into(),
        resource_key: "j1".into(),
        attempt_count: 0,
        next_attempt_at: time.now(),
        state: OutboxState::Pending,
        lease: None,
        inserted_at: time.now(),
    };

    // First process claims the entry and dies mid-flight.
    {
        let store = FileOutboxStore::open(&path).unwrap();
        store.insert(entry).await.unwrap();
        let claimed = store
            .claim_next(time.now(), "doomed-lease")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(claimed.state, OutboxState::Inflight);
    }

    // Restart: the entry is pending again and delivery succeeds.
    let store: Arc<dyn OutboxStore> = Arc::new(FileOutboxStore::open(&path).unwrap());
    assert_eq!(
        store.get("e1").await.unwrap().unwrap().state,
        OutboxState::Pending
    );

    let marketplace = CountingMarketplace::new(0);
    let flusher = OutboxFlusher::new(
        store.clone(),
        marketplace.clone(),
        OutboxConfig::for_testing(),
        Arc::new(time.clone()),
        Arc::new(InMemoryEventBus::new()),
    );
    assert!(flusher.flush_one().await.unwrap());
    assert_eq!(
        store.get("e1").await.unwrap().unwrap().state,
        OutboxState::Acked
    );
    assert_eq!(marketplace.inserted.lock().unwrap().len(), 1);
}

// =============================================================================
// SCENARIO 6: CHAIN RECONNECT
// =============================================================================

/// Connector handing out scripted connections, then failing further dials.
struct ScriptedConnector {
    connections: Mutex<Vec<Vec<String>>>,
    sent: Arc<Mutex<Vec<String>>>,
    dials: AtomicUsize,
}

impl ScriptedConnector {
    fn new(connections: Vec<Vec<String>>) -> Arc<Self> {
        Arc::new(Self {
            connections: Mutex::new(connections),
            sent: Arc::new(Mutex::new(Vec::new())),
            dials: AtomicUsize::new(0),
        })
    }
}

struct ScriptedSocket {
    incoming: Vec<String>,
    sent: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl EventSocket for ScriptedSocket {
    async fn send(&mut self, text: String) -> Result<(), SocketError> {
        self.sent.lock().unwrap().push(text);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, SocketError>> {
        if self.incoming.is_empty() {
            return None; // socket drops after its scripted frames
        }
        Some(Ok(self.incoming.remove(0)))
    }
}

#[async_trait]
impl SocketConnector for ScriptedConnector {
    async fn connect(&self, _url: &str) -> Result<Box<dyn EventSocket>, SocketError> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        let mut connections = self.connections.lock().unwrap();
        if connections.is_empty() {
            return Err(SocketError::ConnectFailed("exhausted".into()));
        }
        Ok(Box::new(ScriptedSocket {
            incoming: connections.remove(0),
            sent: self.sent.clone(),
        }))
    }
}

fn order_frame() -> String {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": 0,
        "result": {
            "data": {
                "type": "tendermint/event/Tx",
                "value": {
                    "TxResult": {
                        "height": "12",
                        "tx": "b3JkZXItdHg=",
                        "result": {
                            "events": [{
                                "type": "message",
                                "attributes": [
                                    { "key": "action", "value": "CreateOrder" },
                                    { "key": "order_id", "value": "o-1" }
                                ]
                            }]
                        }
                    }
                }
            }
        }
    })
    .to_string()
}

#[tokio::test]
async fn chain_reconnect_and_dedupe() {
    // Two connections serving the *same* frame: at-least-once across the
    // reconnect, deduped by event id on the consumer side.
    let connector = ScriptedConnector::new(vec![vec![order_frame()], vec![order_frame()]]);

    let client = Arc::new(ChainEventClient::new(
        EventClientConfig {
            ws_endpoint: "ws://test".into(),
            reconnect_base_ms: 1,
            reconnect_max_ms: 50,
            max_reconnect_attempts: 0,
            auto_reconnect: true,
        },
        connector.clone(),
        Arc::new(FixedTimeSource::at_secs(1_000)),
    ));

    let raw: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let deduped: Arc<Mutex<HashSet<String>>> = Arc::new(Mutex::new(HashSet::new()));
    {
        let raw = raw.clone();
        let deduped = deduped.clone();
        client.on_event(Box::new(move |event| {
            raw.lock().unwrap().push(event.event_id.clone());
            deduped.lock().unwrap().insert(event.event_id.clone());
        }));
    }

    let (tx, rx) = tokio::sync::watch::channel(false);
    let run_client = client.clone();
    let handle = tokio::spawn(async move { run_client.run(rx).await });

    tokio::time::timeout(std::time::Duration::from_secs(2), async {
        loop {
            if raw.lock().unwrap().len() >= 2 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("reconnect never redelivered the frame");
    tx.send(true).unwrap();
    let _ = handle.await;

    // Reconnected and re-subscribed to every configured event type.
    assert!(connector.dials.load(Ordering::SeqCst) >= 2);
    assert_eq!(connector.sent.lock().unwrap().len(), 10);
    assert!(client.reconnect_attempts() >= 1);

    // Same event twice on the wire, once after dedupe.
    assert_eq!(raw.lock().unwrap().len(), 2);
    assert_eq!(raw.lock().unwrap()[0], raw.lock().unwrap()[1]);
    assert_eq!(deduped.lock().unwrap().len(), 1);
}
