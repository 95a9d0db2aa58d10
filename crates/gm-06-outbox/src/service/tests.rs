use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use shared_bus::{EventFilter, EventTopic, InMemoryEventBus, MarketEvent};
use shared_types::{FixedTimeSource, OutboxEntry, OutboxState, Timestamp};

use crate::adapters::InMemoryOutboxStore;
use crate::domain::OutboxConfig;
use crate::ports::{DeliveryError, DeliveryReceipt, DeliverySink, OutboxStore};
use crate::service::OutboxFlusher;
use crate::test_support::entry;

/// Sink that pops scripted outcomes, repeating the last.
struct ScriptedSink {
    outcomes: Mutex<Vec<Result<DeliveryReceipt, DeliveryError>>>,
    delivered: Mutex<Vec<String>>,
}

impl ScriptedSink {
    fn new(outcomes: Vec<Result<DeliveryReceipt, DeliveryError>>) -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(outcomes),
            delivered: Mutex::new(Vec::new()),
        })
    }

    fn delivered(&self) -> Vec<String> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeliverySink for ScriptedSink {
    async fn deliver(&self, entry: &OutboxEntry) -> Result<DeliveryReceipt, DeliveryError> {
        self.delivered.lock().unwrap().push(entry.entry_id.clone());
        let mut outcomes = self.outcomes.lock().unwrap();
        if outcomes.len() > 1 {
            outcomes.remove(0)
        } else {
            outcomes[0].clone()
        }
    }
}

fn ok() -> Result<DeliveryReceipt, DeliveryError> {
    Ok(DeliveryReceipt {
        remote_id: Some("remote-1".into()),
    })
}

fn retriable() -> Result<DeliveryReceipt, DeliveryError> {
    Err(DeliveryError::Retriable("503".into()))
}

struct Fixture {
    store: Arc<InMemoryOutboxStore>,
    flusher: OutboxFlusher,
    time: FixedTimeSource,
    bus: Arc<InMemoryEventBus>,
}

fn fixture(sink: Arc<ScriptedSink>, config: OutboxConfig) -> Fixture {
    let store = Arc::new(InMemoryOutboxStore::new());
    let time = FixedTimeSource::at_millis(1_000);
    let bus = Arc::new(InMemoryEventBus::new());
    let flusher = OutboxFlusher::new(
        store.clone(),
        sink,
        config,
        Arc::new(time.clone()),
        bus.clone(),
    );
    Fixture {
        store,
        flusher,
        time,
        bus,
    }
}

#[tokio::test]
async fn test_successful_delivery_acks() {
    let sink = ScriptedSink::new(vec![ok()]);
    let f = fixture(sink.clone(), OutboxConfig::for_testing());
    f.store.insert(entry("e1", "r1", "k1", 0)).await.unwrap();

    assert!(f.flusher.flush_one().await.unwrap());
    assert_eq!(
        f.store.get("e1").await.unwrap().unwrap().state,
        OutboxState::Acked
    );
    assert_eq!(sink.delivered(), ["e1"]);

    // Queue empty now.
    assert!(!f.flusher.flush_one().await.unwrap());
}

#[tokio::test]
async fn test_retriable_failure_reschedules_with_backoff() {
    let sink = ScriptedSink::new(vec![retriable(), ok()]);
    let config = OutboxConfig {
        base_backoff_ms: 1_000,
        max_backoff_ms: 60_000,
        jitter_pct: 0,
        ..OutboxConfig::for_testing()
    };
    let f = fixture(sink.clone(), config);
    f.store.insert(entry("e1", "r1", "k1", 0)).await.unwrap();

    assert!(f.flusher.flush_one().await.unwrap());
    let after = f.store.get("e1").await.unwrap().unwrap();
    assert_eq!(after.state, OutboxState::Pending);
    assert_eq!(after.attempt_count, 1);
    assert_eq!(after.next_attempt_at, Timestamp::from_millis(2_000));

    // Not due yet.
    assert!(!f.flusher.flush_one().await.unwrap());

    f.time.set_millis(2_000);
    assert!(f.flusher.flush_one().await.unwrap());
    assert_eq!(
        f.store.get("e1").await.unwrap().unwrap().state,
        OutboxState::Acked
    );
}

#[tokio::test]
async fn test_exhausted_retries_dead_letter_and_alert() {
    let sink = ScriptedSink::new(vec![retriable()]);
    let f = fixture(sink.clone(), OutboxConfig::for_testing()); // max_attempts = 3
    let mut sub = f.bus.subscribe(EventFilter::topics(vec![EventTopic::Billing]));
    f.store.insert(entry("e1", "r1", "k1", 0)).await.unwrap();

    for round in 1..=3 {
        f.time.advance_millis(100);
        assert!(f.flusher.flush_one().await.unwrap(), "round {round}");
    }
    let after = f.store.get("e1").await.unwrap().unwrap();
    assert_eq!(after.state, OutboxState::Dead);

    // Within one additional tick nothing retries.
    f.time.advance_millis(1_000);
    assert!(!f.flusher.flush_one().await.unwrap());
    assert_eq!(sink.delivered().len(), 3);

    let event = tokio::time::timeout(std::time::Duration::from_millis(100), sub.recv())
        .await
        .expect("timeout")
        .expect("event");
    match event {
        MarketEvent::OutboxEntryDead {
            entry_id, attempts, ..
        } => {
            assert_eq!(entry_id, "e1");
            assert_eq!(attempts, 3);
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn test_permanent_failure_dead_letters_immediately() {
    let sink = ScriptedSink::new(vec![Err(DeliveryError::Permanent("400".into()))]);
    let f = fixture(sink.clone(), OutboxConfig::for_testing());
    f.store.insert(entry("e1", "r1", "k1", 0)).await.unwrap();

    assert!(f.flusher.flush_one().await.unwrap());
    assert_eq!(
        f.store.get("e1").await.unwrap().unwrap().state,
        OutboxState::Dead
    );
    assert_eq!(sink.delivered().len(), 1);
}

#[tokio::test]
async fn test_per_resource_insertion_order() {
    let sink = ScriptedSink::new(vec![ok()]);
    let f = fixture(sink.clone(), OutboxConfig::for_testing());
    f.store.insert(entry("e1", "r1", "k1", 0)).await.unwrap();
    f.store.insert(entry("e2", "r1", "k2", 0)).await.unwrap();
    f.store.insert(entry("e3", "r1", "k3", 0)).await.unwrap();

    while f.flusher.flush_one().await.unwrap() {}
    assert_eq!(sink.delivered(), ["e1", "e2", "e3"]);
}

#[tokio::test]
async fn test_run_drains_inflight_on_shutdown() {
    let sink = ScriptedSink::new(vec![ok()]);
    let f = fixture(sink, OutboxConfig::for_testing());
    f.store.insert(entry("e1", "r1", "k1", 0)).await.unwrap();

    // Claim manually so an inflight entry exists when run() exits.
    f.store
        .claim_next(Timestamp::from_millis(2_000), "stray-lease")
        .await
        .unwrap()
        .unwrap();

    let (tx, rx) = tokio::sync::watch::channel(false);
    tx.send(true).unwrap();
    f.flusher.run(rx).await;

    assert_eq!(
        f.store.get("e1").await.unwrap().unwrap().state,
        OutboxState::Pending
    );
}
