//! Construction and task supervision.
//!
//! One `MarketCore` value owns every subsystem; it is built at startup and
//! passed explicitly, never stored in a global. Each long-running task gets
//! the shared shutdown watch channel and must drain within the grace period.

use std::sync::Arc;

use gm_01_node_aggregator::{AggregatorConfig, NodeAggregator};
use gm_02_heartbeat_monitor::{HeartbeatMonitor, MonitorConfig};
use gm_03_hpc_scheduler::SchedulerWeights;
use gm_04_job_lifecycle::{JobLifecycleEngine, LifecycleConfig, NullProviderGateway};
use gm_05_usage_reporter::{ReporterConfig, UsageReporter};
use gm_06_outbox::{
    FileOutboxStore, HttpDeliverySink, MarketplaceConfig, OutboxConfig, OutboxFlusher,
    OutboxStore,
};
use gm_07_chain_events::{ChainEventClient, EventClientConfig, TungsteniteConnector};
use gm_08_api_gateway::{build_router, AppState};
use shared_bus::{EventPublisher, InMemoryEventBus, MarketEvent};
use shared_types::{SystemTimeSource, TimeSource};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::MarketConfig;
use crate::wiring::{
    BillingAdapter, ChainDispatcher, FleetAdapter, ReporterSink, SchedulerAdapter,
};

/// Startup failures beyond configuration. Exit code 2.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("outbox store: {0}")]
    Store(String),
    #[error("http listener: {0}")]
    Listener(String),
}

/// Every subsystem, wired.
pub struct MarketCore {
    pub config: MarketConfig,
    pub bus: Arc<InMemoryEventBus>,
    pub aggregator: Arc<NodeAggregator>,
    pub monitor: Arc<HeartbeatMonitor>,
    pub lifecycle: Arc<JobLifecycleEngine>,
    pub reporter: Arc<UsageReporter>,
    pub outbox: Arc<dyn OutboxStore>,
    pub flusher: Arc<OutboxFlusher>,
    pub chain_client: Arc<ChainEventClient>,
    pub dispatcher: Arc<ChainDispatcher>,
    pub gateway_state: Arc<AppState>,
}

impl MarketCore {
    /// Wire everything from configuration. The outbox journal is the only
    /// persistent dependency; if it cannot open, startup is irrecoverable.
    pub fn build(config: MarketConfig) -> Result<Self, StartupError> {
        let time: Arc<dyn TimeSource> = Arc::new(SystemTimeSource);
        let bus = Arc::new(InMemoryEventBus::new());
        let provider_keypair = Arc::new(config.provider_keypair());
        let provider_public = provider_keypair.public_key();

        let outbox: Arc<dyn OutboxStore> = Arc::new(
            FileOutboxStore::open(&config.outbox_path)
                .map_err(|e| StartupError::Store(e.to_string()))?,
        );

        let reporter = Arc::new(UsageReporter::new(
            ReporterConfig {
                min_period_secs: config.reporter.min_period_sec,
                max_period_secs: config.reporter.max_period_sec,
            },
            provider_keypair,
            outbox.clone(),
            bus.clone(),
        ));

        let aggregator = Arc::new(NodeAggregator::new(
            AggregatorConfig::default(),
            time.clone(),
            bus.clone(),
            Arc::new(ReporterSink {
                reporter: reporter.clone(),
            }),
        ));

        let monitor = Arc::new(HeartbeatMonitor::new(
            aggregator.clone(),
            bus.clone(),
            MonitorConfig {
                stale_ms: config.stale_threshold_sec * 1000,
                offline_ms: config.offline_threshold_sec * 1000,
                dereg_ms: config.dereg_threshold_sec * 1000,
                check_interval_ms: (config.stale_threshold_sec * 1000 / 3).max(1),
            },
            time.clone(),
        ));

        let lifecycle = Arc::new(JobLifecycleEngine::new(
            LifecycleConfig::default(),
            time.clone(),
            bus.clone(),
            Arc::new(SchedulerAdapter {
                aggregator: aggregator.clone(),
                weights: SchedulerWeights {
                    capacity: config.scheduler_weights.capacity,
                    latency: config.scheduler_weights.latency,
                    reliability: config.scheduler_weights.reliability,
                },
                time: time.clone(),
            }),
            Arc::new(FleetAdapter {
                aggregator: aggregator.clone(),
            }),
            Arc::new(BillingAdapter {
                reporter: reporter.clone(),
                store: outbox.clone(),
                time: time.clone(),
            }),
            Arc::new(NullProviderGateway),
        ));

        let sink = HttpDeliverySink::new(MarketplaceConfig {
            base_url: config.marketplace_url.clone(),
            request_timeout_ms: 10_000,
        })
        .map_err(StartupError::Store)?;
        let flusher = Arc::new(OutboxFlusher::new(
            outbox.clone(),
            Arc::new(sink),
            OutboxConfig {
                max_attempts: config.outbox.max_attempts,
                base_backoff_ms: config.outbox.base_backoff_ms,
                max_backoff_ms: config.outbox.max_backoff_ms,
                jitter_pct: config.outbox.jitter_pct,
                ..OutboxConfig::default()
            },
            time.clone(),
            bus.clone(),
        ));

        let chain_client = Arc::new(ChainEventClient::new(
            EventClientConfig {
                ws_endpoint: config.ws_endpoint.clone(),
                reconnect_base_ms: config.event_client.reconnect_base_ms,
                reconnect_max_ms: config.event_client.reconnect_max_ms,
                max_reconnect_attempts: config.event_client.max_reconnect_attempts,
                auto_reconnect: config.event_client.auto_reconnect,
            },
            Arc::new(TungsteniteConnector),
            time.clone(),
        ));

        // Parsed chain events fan out over the bus; the dispatcher advances
        // jobs from them.
        {
            let bus = bus.clone();
            chain_client.on_event(Box::new(move |event| {
                let bus = bus.clone();
                let event = event.clone();
                tokio::spawn(async move {
                    bus.publish(MarketEvent::ChainEventReceived { event }).await;
                });
            }));
        }
        let dispatcher = Arc::new(ChainDispatcher::new(lifecycle.clone()));

        let gateway_state = Arc::new(AppState {
            aggregator: aggregator.clone(),
            lifecycle: lifecycle.clone(),
            provider_key: provider_public,
        });

        Ok(Self {
            config,
            bus,
            aggregator,
            monitor,
            lifecycle,
            reporter,
            outbox,
            flusher,
            chain_client,
            dispatcher,
            gateway_state,
        })
    }

    /// Spawn every long-running task. Returns the handles to await on
    /// shutdown.
    pub async fn spawn_tasks(
        &self,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Vec<JoinHandle<()>>, StartupError> {
        let mut handles = Vec::new();

        // HTTP server.
        let router = build_router(self.gateway_state.clone());
        let listener = tokio::net::TcpListener::bind(&self.config.listen_addr)
            .await
            .map_err(|e| StartupError::Listener(e.to_string()))?;
        info!(addr = %self.config.listen_addr, "Gateway listening");
        let mut http_shutdown = shutdown.clone();
        handles.push(tokio::spawn(async move {
            let serve = axum::serve(listener, router).with_graceful_shutdown(async move {
                // In-flight requests complete; the listener stops accepting.
                let _ = http_shutdown.wait_for(|stop| *stop).await;
            });
            if let Err(e) = serve.await {
                error!(error = %e, "Gateway exited");
            }
        }));

        // Monitor sweep.
        let monitor = self.monitor.clone();
        let monitor_shutdown = shutdown.clone();
        handles.push(tokio::spawn(async move {
            monitor.run(monitor_shutdown).await;
        }));

        // Outbox flusher.
        let flusher = self.flusher.clone();
        let flusher_shutdown = shutdown.clone();
        handles.push(tokio::spawn(async move {
            flusher.run(flusher_shutdown).await;
        }));

        // Chain event client.
        let chain_client = self.chain_client.clone();
        let chain_shutdown = shutdown.clone();
        handles.push(tokio::spawn(async move {
            chain_client.run(chain_shutdown).await;
        }));

        // Chain event dispatcher.
        let dispatcher = self.dispatcher.clone();
        let dispatcher_bus = self.bus.clone();
        let dispatcher_shutdown = shutdown.clone();
        handles.push(tokio::spawn(async move {
            dispatcher.run(dispatcher_bus, dispatcher_shutdown).await;
        }));

        // Lifecycle retry queue.
        let lifecycle = self.lifecycle.clone();
        let retry_shutdown = shutdown;
        handles.push(tokio::spawn(async move {
            lifecycle.run_retries(retry_shutdown).await;
        }));

        Ok(handles)
    }
}

/// Wait for every task within the grace period. Returns false when the
/// deadline passed with tasks still running.
pub async fn drain(handles: Vec<JoinHandle<()>>, grace_secs: u64) -> bool {
    let deadline = std::time::Duration::from_secs(grace_secs);
    match tokio::time::timeout(deadline, async {
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Task join failed during drain");
            }
        }
    })
    .await
    {
        Ok(()) => true,
        Err(_) => {
            error!(grace_secs, "Shutdown grace period exceeded");
            false
        }
    }
}
