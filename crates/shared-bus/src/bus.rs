//! The in-process event bus.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::events::{EventFilter, EventTopic, MarketEvent};
use crate::subscription::Subscription;
use crate::DEFAULT_CHANNEL_CAPACITY;

/// Trait for publishing events to the bus.
///
/// Subsystems hold this instead of the concrete bus so tests can swap in
/// their own fan-out.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an event.
    ///
    /// # Returns
    ///
    /// The number of live subscriber channels the event was handed to
    /// (including ones whose filters will discard it).
    async fn publish(&self, event: MarketEvent) -> usize;

    /// Total events published over the bus lifetime.
    fn events_published(&self) -> u64;
}

/// How many subscriptions currently listen to each topic.
///
/// Shared between the bus and its subscriptions; a subscription registers
/// its topics on creation and unregisters them when dropped, so publishers
/// can see at a glance whether anyone cares about a topic.
#[derive(Debug, Default)]
pub(crate) struct TopicListeners {
    counts: [AtomicUsize; EventTopic::ALL.len()],
}

impl TopicListeners {
    pub(crate) fn register(&self, topics: &[EventTopic]) {
        for topic in topics {
            self.counts[topic.index()].fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn unregister(&self, topics: &[EventTopic]) {
        for topic in topics {
            let count = &self.counts[topic.index()];
            let _ = count.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                n.checked_sub(1)
            });
        }
    }

    pub(crate) fn listening(&self, topic: EventTopic) -> usize {
        self.counts[topic.index()].load(Ordering::Relaxed)
    }
}

/// Single-process bus over a tokio broadcast channel.
///
/// Fan-out is best-effort within the process: slow subscribers lag and drop
/// the oldest events rather than blocking publishers. Anything that must
/// survive a restart goes through the outbox, not this bus.
pub struct InMemoryEventBus {
    sender: broadcast::Sender<MarketEvent>,
    listeners: Arc<TopicListeners>,
    published: AtomicU64,
}

impl InMemoryEventBus {
    /// Bus with the default per-subscriber buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Bus with an explicit per-subscriber buffer.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            listeners: Arc::new(TopicListeners::default()),
            published: AtomicU64::new(0),
        }
    }

    /// Open a subscription for the filter's topics (all topics when the
    /// filter is empty).
    #[must_use]
    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        let topics: Vec<EventTopic> = if filter.topics.is_empty() {
            EventTopic::ALL.to_vec()
        } else {
            filter.topics.clone()
        };
        self.listeners.register(&topics);
        debug!(?topics, "Subscription opened");
        Subscription::new(
            self.sender.subscribe(),
            filter,
            self.listeners.clone(),
            topics,
        )
    }

    /// Live subscriber channels.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Subscriptions currently interested in a topic.
    #[must_use]
    pub fn listeners_for(&self, topic: EventTopic) -> usize {
        self.listeners.listening(topic)
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventBus {
    async fn publish(&self, event: MarketEvent) -> usize {
        let topic = event.topic();
        self.published.fetch_add(1, Ordering::Relaxed);

        let interested = self.listeners.listening(topic);
        if interested == 0 {
            // Legal but worth a trace: the event evaporates.
            trace!(?topic, source = event.source_component(), "Event has no listeners");
        }
        // send() only errors when no receiver exists at all.
        self.sender.send(event).unwrap_or(0)
    }

    fn events_published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}
