//! The subscription client.
//!
//! Connection state machine:
//!
//! ```text
//! disconnected -> connecting -> connected -> reconnecting -> connecting ...
//! ```
//!
//! On connect the client sends one subscription frame per configured event
//! type; on close it re-dials after `base * 2^attempt` (capped) unless
//! disposed, and re-subscribes on resume. Parsed events are dispatched to
//! every registered subscriber synchronously; delivery is at-least-once
//! across the client's lifetime and subscribers dedupe by `event_id`.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use shared_types::{ChainEvent, TimeSource};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::domain::{parse_frame, subscription_query, EventClientConfig, MAPPINGS};
use crate::ports::{EventSocket, SocketConnector};

/// Connection state, for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// A registered event consumer. Handlers run inline on the read loop; a
/// blocking handler blocks only that one dispatch, so consumers must not do
/// long work here.
pub type EventHandler = Box<dyn Fn(&ChainEvent) + Send + Sync>;

/// The chain event client.
pub struct ChainEventClient {
    config: EventClientConfig,
    connector: Arc<dyn SocketConnector>,
    time: Arc<dyn TimeSource>,
    handlers: Mutex<Vec<EventHandler>>,
    state: Mutex<ConnectionState>,
    disposed: AtomicBool,
    reconnect_attempts: AtomicU32,
}

impl ChainEventClient {
    pub fn new(
        config: EventClientConfig,
        connector: Arc<dyn SocketConnector>,
        time: Arc<dyn TimeSource>,
    ) -> Self {
        Self {
            config,
            connector,
            time,
            handlers: Mutex::new(Vec::new()),
            state: Mutex::new(ConnectionState::Disconnected),
            disposed: AtomicBool::new(false),
            reconnect_attempts: AtomicU32::new(0),
        }
    }

    /// Register a subscriber for every canonical event.
    pub fn on_event(&self, handler: EventHandler) {
        self.handlers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(handler);
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Total reconnect attempts so far.
    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts.load(Ordering::Relaxed)
    }

    /// Tear the client down: no further dials, handlers cleared. A disposed
    /// client never connects again; build a new one instead.
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
        self.handlers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clear();
        self.set_state(ConnectionState::Disconnected);
    }

    /// Run the subscription until disposed, shutdown, or retries exhausted.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(endpoint = %self.config.ws_endpoint, "Chain event client starting");
        let mut attempt: u32 = 0;

        loop {
            if self.disposed.load(Ordering::SeqCst) || *shutdown.borrow() {
                break;
            }
            self.set_state(if attempt == 0 {
                ConnectionState::Connecting
            } else {
                ConnectionState::Reconnecting
            });

            match self.connector.connect(&self.config.ws_endpoint).await {
                Ok(mut socket) => {
                    if let Err(e) = self.subscribe_all(socket.as_mut()).await {
                        warn!(error = %e, "Subscription send failed");
                    } else {
                        self.set_state(ConnectionState::Connected);
                        grid_telemetry::metrics::CHAIN_CONNECTED.set(1.0);
                        attempt = 0;
                        self.read_loop(socket.as_mut(), &mut shutdown).await;
                        grid_telemetry::metrics::CHAIN_CONNECTED.set(0.0);
                    }
                }
                Err(e) => {
                    debug!(error = %e, "Dial failed");
                }
            }

            if self.disposed.load(Ordering::SeqCst) || *shutdown.borrow() {
                break;
            }
            if !self.config.auto_reconnect {
                info!("Socket closed and auto-reconnect is off");
                break;
            }
            attempt += 1;
            self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
            grid_telemetry::metrics::CHAIN_RECONNECTS.inc();
            if self.config.max_reconnect_attempts != 0
                && attempt > self.config.max_reconnect_attempts
            {
                warn!(attempt, "Reconnect attempts exhausted");
                break;
            }

            let delay = self.config.reconnect_delay_ms(attempt);
            debug!(attempt, delay_ms = delay, "Reconnecting after back-off");
            tokio::select! {
                _ = tokio::time::sleep(std::time::Duration::from_millis(delay)) => {}
                _ = shutdown.changed() => {}
            }
        }

        self.set_state(ConnectionState::Disconnected);
        info!("Chain event client stopped");
    }

    /// One subscription request per configured event type.
    async fn subscribe_all(
        &self,
        socket: &mut dyn EventSocket,
    ) -> Result<(), crate::ports::SocketError> {
        for (id, mapping) in MAPPINGS.iter().enumerate() {
            let request = serde_json::json!({
                "jsonrpc": "2.0",
                "method": "subscribe",
                "id": id + 1,
                "params": { "query": subscription_query(mapping) },
            });
            socket.send(request.to_string()).await?;
        }
        debug!(queries = MAPPINGS.len(), "Subscriptions sent");
        Ok(())
    }

    /// Pump frames until the socket drops or shutdown fires.
    async fn read_loop(
        &self,
        socket: &mut dyn EventSocket,
        shutdown: &mut watch::Receiver<bool>,
    ) {
        loop {
            let frame = tokio::select! {
                frame = socket.recv() => frame,
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                    continue;
                }
            };
            match frame {
                Some(Ok(text)) => {
                    let events = parse_frame(&text, self.time.now());
                    for event in &events {
                        self.dispatch(event);
                    }
                }
                Some(Err(e)) => {
                    warn!(error = %e, "Socket error, reconnect pending");
                    return;
                }
                None => {
                    debug!("Socket closed by peer");
                    return;
                }
            }
        }
    }

    /// Synchronous fan-out to every registered handler.
    fn dispatch(&self, event: &ChainEvent) {
        grid_telemetry::metrics::CHAIN_EVENTS_DISPATCHED.inc();
        let handlers = self
            .handlers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        debug!(
            event_id = %event.event_id,
            event_type = %event.event_type,
            height = event.block_height,
            receivers = handlers.len(),
            "Chain event dispatched"
        );
        for handler in handlers.iter() {
            handler(event);
        }
    }

    fn set_state(&self, state: ConnectionState) {
        *self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = state;
    }
}
