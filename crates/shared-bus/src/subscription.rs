//! Subscription handles.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::broadcast;
use tracing::debug;

use crate::bus::TopicListeners;
use crate::events::{EventFilter, EventTopic, MarketEvent};

/// Errors from subscription operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// The event bus was closed.
    #[error("Event bus closed")]
    Closed,
}

/// A live subscription.
///
/// Receives every event published to the bus and discards the ones outside
/// its filter. A subscription that falls behind the channel buffer loses
/// the oldest events; the loss is counted in [`Subscription::lagged`], not
/// surfaced as an error, because bus delivery is best-effort by design.
/// Dropping the handle unregisters its topics from the bus accounting.
pub struct Subscription {
    receiver: broadcast::Receiver<MarketEvent>,
    filter: EventFilter,
    listeners: Arc<TopicListeners>,
    /// Topics this subscription registered (resolved from the filter).
    topics: Vec<EventTopic>,
    /// Events lost to channel lag so far.
    lagged: u64,
}

impl Subscription {
    pub(crate) fn new(
        receiver: broadcast::Receiver<MarketEvent>,
        filter: EventFilter,
        listeners: Arc<TopicListeners>,
        topics: Vec<EventTopic>,
    ) -> Self {
        Self {
            receiver,
            filter,
            listeners,
            topics,
            lagged: 0,
        }
    }

    /// Wait for the next event passing the filter; `None` once the bus is
    /// gone.
    pub async fn recv(&mut self) -> Option<MarketEvent> {
        use broadcast::error::RecvError;
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => {} // outside the filter
                Err(RecvError::Lagged(lost)) => {
                    self.lagged += lost;
                    debug!(lost, total = self.lagged, "Subscription lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant: `Ok(None)` when nothing is buffered.
    pub fn try_recv(&mut self) -> Result<Option<MarketEvent>, SubscriptionError> {
        use broadcast::error::TryRecvError;
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.filter.matches(&event) => return Ok(Some(event)),
                Ok(_) => {}
                Err(TryRecvError::Empty) => return Ok(None),
                Err(TryRecvError::Lagged(lost)) => {
                    self.lagged += lost;
                }
                Err(TryRecvError::Closed) => return Err(SubscriptionError::Closed),
            }
        }
    }

    /// Events this subscription lost to channel lag.
    #[must_use]
    pub fn lagged(&self) -> u64 {
        self.lagged
    }

    /// The filter this subscription was opened with.
    #[must_use]
    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.listeners.unregister(&self.topics);
        debug!(topics = ?self.topics, "Subscription closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{EventPublisher, InMemoryEventBus};
    use std::time::Duration;
    use tokio::time::timeout;

    fn alert(message: &str) -> MarketEvent {
        MarketEvent::Alert {
            component: "test".into(),
            message: message.into(),
        }
    }

    #[tokio::test]
    async fn test_recv_in_publish_order() {
        let bus = InMemoryEventBus::new();
        let mut sub = bus.subscribe(EventFilter::all());

        bus.publish(alert("one")).await;
        bus.publish(alert("two")).await;

        for expected in ["one", "two"] {
            let event = timeout(Duration::from_millis(100), sub.recv())
                .await
                .expect("timeout")
                .expect("event");
            match event {
                MarketEvent::Alert { message, .. } => assert_eq!(message, expected),
                other => panic!("unexpected event: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_recv_none_after_bus_drop() {
        let bus = InMemoryEventBus::new();
        let mut sub = bus.subscribe(EventFilter::all());
        drop(bus);
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_try_recv_states() {
        let bus = InMemoryEventBus::new();
        let mut sub = bus.subscribe(EventFilter::all());

        assert!(matches!(sub.try_recv(), Ok(None)));
        bus.publish(alert("buffered")).await;
        assert!(matches!(sub.try_recv(), Ok(Some(_))));
        drop(bus);
        assert!(matches!(sub.try_recv(), Err(SubscriptionError::Closed)));
    }

    #[tokio::test]
    async fn test_lag_is_counted_not_fatal() {
        let bus = InMemoryEventBus::with_capacity(2);
        let mut sub = bus.subscribe(EventFilter::all());

        for i in 0..5 {
            bus.publish(alert(&format!("event-{i}"))).await;
        }

        // The oldest events fell off the buffer; what remains still arrives
        // and the loss is visible on the handle.
        let mut received = 0;
        while let Ok(Some(_)) = sub.try_recv() {
            received += 1;
        }
        assert_eq!(received, 2);
        assert_eq!(sub.lagged(), 3);
    }

    #[tokio::test]
    async fn test_filter_accessor() {
        let bus = InMemoryEventBus::new();
        let sub = bus.subscribe(EventFilter::topics(vec![EventTopic::Chain]));
        assert_eq!(sub.filter().topics, vec![EventTopic::Chain]);
    }
}
