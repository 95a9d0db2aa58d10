//! Prometheus metrics for GridMarket subsystems.
//!
//! All metrics follow the naming convention: `gm_<subsystem>_<metric>_<unit>`
//!
//! ## Metric Types
//!
//! - **Counter**: Monotonically increasing value (e.g., heartbeats_accepted_total)
//! - **Gauge**: Value that can go up or down (e.g., roster_nodes)
//! - **Histogram**: Distribution of values (e.g., flush_duration_seconds)

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, Counter, CounterVec, Encoder, Gauge, GaugeVec, Histogram, Opts,
    Registry, TextEncoder,
};

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // NODE AGGREGATOR
    // =========================================================================

    /// Total heartbeats accepted
    pub static ref HEARTBEATS_ACCEPTED: Counter = Counter::new(
        "gm_aggregator_heartbeats_accepted_total",
        "Total heartbeats that passed signature and sequence checks"
    ).expect("metric creation failed");

    /// Total submissions rejected, by reason
    pub static ref SUBMISSIONS_REJECTED: CounterVec = CounterVec::new(
        Opts::new(
            "gm_aggregator_submissions_rejected_total",
            "Total node submissions rejected"
        ),
        &["reason"]  // bad-signature, replay, unknown-node, deregistered
    ).expect("metric creation failed");

    /// Nodes currently in the roster, by state
    pub static ref ROSTER_NODES: GaugeVec = GaugeVec::new(
        Opts::new("gm_aggregator_roster_nodes", "Nodes in the roster by state"),
        &["state"]
    ).expect("metric creation failed");

    // =========================================================================
    // HEARTBEAT MONITOR
    // =========================================================================

    /// Health transitions, by target state
    pub static ref HEALTH_TRANSITIONS: CounterVec = CounterVec::new(
        Opts::new(
            "gm_monitor_health_transitions_total",
            "Health state transitions applied by the monitor"
        ),
        &["to"]
    ).expect("metric creation failed");

    /// Duration of a full monitor sweep
    pub static ref SWEEP_DURATION: Histogram = Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "gm_monitor_sweep_duration_seconds",
            "Time spent visiting every node in one sweep"
        ).buckets(exponential_buckets(0.0001, 2.0, 12).unwrap())
    ).expect("metric creation failed");

    // =========================================================================
    // SCHEDULER / LIFECYCLE
    // =========================================================================

    /// Scheduling outcomes
    pub static ref SCHEDULING_DECISIONS: CounterVec = CounterVec::new(
        Opts::new("gm_scheduler_decisions_total", "Placement attempts"),
        &["outcome"]  // placed, no-placement
    ).expect("metric creation failed");

    /// Job transitions, by target state
    pub static ref JOB_TRANSITIONS: CounterVec = CounterVec::new(
        Opts::new("gm_lifecycle_job_transitions_total", "Job state transitions"),
        &["to"]
    ).expect("metric creation failed");

    // =========================================================================
    // USAGE REPORTER / OUTBOX
    // =========================================================================

    /// Usage records emitted
    pub static ref USAGE_RECORDS: CounterVec = CounterVec::new(
        Opts::new("gm_reporter_usage_records_total", "Usage records emitted"),
        &["final"]  // true/false
    ).expect("metric creation failed");

    /// Outbox entries by state
    pub static ref OUTBOX_ENTRIES: GaugeVec = GaugeVec::new(
        Opts::new("gm_outbox_entries", "Outbox entries by state"),
        &["state"]
    ).expect("metric creation failed");

    /// Outbox delivery attempts
    pub static ref OUTBOX_DELIVERIES: CounterVec = CounterVec::new(
        Opts::new("gm_outbox_deliveries_total", "Outbox delivery attempts"),
        &["outcome"]  // acked, retried, dead
    ).expect("metric creation failed");

    /// Duration of a single delivery attempt
    pub static ref FLUSH_DURATION: Histogram = Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "gm_outbox_flush_duration_seconds",
            "Time spent delivering one outbox entry"
        ).buckets(exponential_buckets(0.001, 2.0, 15).unwrap())
    ).expect("metric creation failed");

    // =========================================================================
    // CHAIN EVENT CLIENT
    // =========================================================================

    /// Chain events dispatched to subscribers
    pub static ref CHAIN_EVENTS_DISPATCHED: Counter = Counter::new(
        "gm_chain_events_dispatched_total",
        "Canonical chain events dispatched to subscribers"
    ).expect("metric creation failed");

    /// Reconnect attempts of the chain client
    pub static ref CHAIN_RECONNECTS: Counter = Counter::new(
        "gm_chain_reconnects_total",
        "Websocket reconnect attempts"
    ).expect("metric creation failed");

    /// Current connection state (1 = connected)
    pub static ref CHAIN_CONNECTED: Gauge = Gauge::new(
        "gm_chain_connected",
        "Whether the chain event subscription is currently connected"
    ).expect("metric creation failed");
}

/// Handle proving metrics were registered.
pub struct MetricsHandle {
    _registered: bool,
}

/// Register all metrics with the global registry.
///
/// Idempotent per process: call once from the runtime during startup.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(HEARTBEATS_ACCEPTED.clone()),
        Box::new(SUBMISSIONS_REJECTED.clone()),
        Box::new(ROSTER_NODES.clone()),
        Box::new(HEALTH_TRANSITIONS.clone()),
        Box::new(SWEEP_DURATION.clone()),
        Box::new(SCHEDULING_DECISIONS.clone()),
        Box::new(JOB_TRANSITIONS.clone()),
        Box::new(USAGE_RECORDS.clone()),
        Box::new(OUTBOX_ENTRIES.clone()),
        Box::new(OUTBOX_DELIVERIES.clone()),
        Box::new(FLUSH_DURATION.clone()),
        Box::new(CHAIN_EVENTS_DISPATCHED.clone()),
        Box::new(CHAIN_RECONNECTS.clone()),
        Box::new(CHAIN_CONNECTED.clone()),
    ];

    for collector in collectors {
        REGISTRY
            .register(collector)
            .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    }

    Ok(MetricsHandle { _registered: true })
}

/// Encode all registered metrics in the Prometheus text format.
pub fn gather() -> Result<String, TelemetryError> {
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}
