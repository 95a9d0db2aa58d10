//! The sweep task.
//!
//! A single task visits every node at `check_interval`, classifies it from a
//! read snapshot of `last_heartbeat_at`, and pushes transitions back through
//! the aggregator. A heartbeat racing the sweep wins: the aggregator skips a
//! transition whose observed beat is no longer current, and the next sweep
//! re-evaluates.

use std::sync::Arc;
use std::time::Duration;

use gm_01_node_aggregator::NodeAggregator;
use shared_bus::{EventPublisher, MarketEvent};
use shared_types::{NodeState, TimeSource};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::domain::{next_state, MonitorConfig};

/// Summary of one sweep pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub visited: usize,
    pub transitions: usize,
    pub deregistered: usize,
}

/// The heartbeat monitor.
pub struct HeartbeatMonitor {
    aggregator: Arc<NodeAggregator>,
    bus: Arc<dyn EventPublisher>,
    config: MonitorConfig,
    time: Arc<dyn TimeSource>,
}

impl HeartbeatMonitor {
    pub fn new(
        aggregator: Arc<NodeAggregator>,
        bus: Arc<dyn EventPublisher>,
        config: MonitorConfig,
        time: Arc<dyn TimeSource>,
    ) -> Self {
        Self {
            aggregator,
            bus,
            config,
            time,
        }
    }

    /// Visit every node once and apply due transitions.
    pub async fn sweep(&self) -> SweepReport {
        let timer = grid_telemetry::metrics::SWEEP_DURATION.start_timer();
        let now = self.time.now();
        let mut report = SweepReport::default();

        for record in self.aggregator.roster_snapshot() {
            report.visited += 1;
            let silent_ms = now.millis_since(record.last_heartbeat_at);
            let Some(target) = next_state(record.state, silent_ms, &self.config) else {
                continue;
            };

            if target == NodeState::Deregistered {
                if let Err(e) = self
                    .aggregator
                    .deregister(&record.node_id, "heartbeat timeout")
                    .await
                {
                    warn!(node_id = %record.node_id, error = %e, "Deregistration failed");
                    continue;
                }
                grid_telemetry::metrics::HEALTH_TRANSITIONS
                    .with_label_values(&["deregistered"])
                    .inc();
                report.deregistered += 1;
                continue;
            }

            match self
                .aggregator
                .apply_health_state(&record.node_id, target, record.last_heartbeat_at)
            {
                Ok(Some((from, to))) => {
                    info!(
                        node_id = %record.node_id,
                        from = ?from,
                        to = ?to,
                        silent_ms,
                        "Node health transition"
                    );
                    grid_telemetry::metrics::HEALTH_TRANSITIONS
                        .with_label_values(&[state_label(to)])
                        .inc();
                    self.bus
                        .publish(MarketEvent::NodeHealthChanged {
                            node_id: record.node_id.clone(),
                            from,
                            to,
                            silent_for_ms: silent_ms,
                            at: now,
                        })
                        .await;
                    report.transitions += 1;
                }
                Ok(None) => {
                    // Raced a fresh heartbeat; the node recovered on its own.
                    debug!(node_id = %record.node_id, "Transition skipped, beat raced the sweep");
                }
                Err(e) => warn!(node_id = %record.node_id, error = %e, "Transition failed"),
            }
        }

        timer.observe_duration();
        report
    }

    /// Run sweeps until shutdown. The in-flight sweep always completes
    /// before exit so no node is left mid-transition.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(Duration::from_millis(self.config.check_interval_ms));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(interval_ms = self.config.check_interval_ms, "Heartbeat monitor started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.sweep().await;
                    if report.transitions > 0 || report.deregistered > 0 {
                        debug!(?report, "Sweep complete");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Heartbeat monitor stopping");
                        return;
                    }
                }
            }
        }
    }
}

fn state_label(state: NodeState) -> &'static str {
    match state {
        NodeState::Pending => "pending",
        NodeState::Active => "active",
        NodeState::Stale => "stale",
        NodeState::Draining => "draining",
        NodeState::Offline => "offline",
        NodeState::Deregistered => "deregistered",
    }
}
