//! # Market Events
//!
//! Defines all event types that flow through the shared bus: heartbeat
//! acceptance, health transitions, job lifecycle transitions, outbox alerts,
//! and parsed chain events.

use serde::{Deserialize, Serialize};
use shared_types::{
    ChainEvent, Heartbeat, JobState, NodeState, Timestamp, TransitionRecord,
};

/// All events that can be published to the event bus.
///
/// Subsystems never call each other directly for notifications; everything
/// fan-out-shaped goes through these events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MarketEvent {
    // =========================================================================
    // NODE AGGREGATOR
    // =========================================================================
    /// A heartbeat passed signature and sequence checks and was applied.
    HeartbeatAccepted {
        /// The accepted heartbeat.
        heartbeat: Heartbeat,
    },

    /// A node was registered into the roster.
    NodeRegistered {
        node_id: String,
        cluster_id: String,
    },

    /// A node was explicitly deregistered (terminal).
    NodeDeregistered {
        node_id: String,
        reason: String,
    },

    // =========================================================================
    // HEARTBEAT MONITOR
    // =========================================================================
    /// The monitor moved a node between health states.
    NodeHealthChanged {
        node_id: String,
        from: NodeState,
        to: NodeState,
        /// Time since the last accepted heartbeat when classified.
        silent_for_ms: u64,
        at: Timestamp,
    },

    // =========================================================================
    // JOB LIFECYCLE
    // =========================================================================
    /// A job moved through its state machine; `record` is the audit line.
    JobTransitioned {
        record: TransitionRecord,
    },

    /// A job reached a terminal state.
    JobFinished {
        job_id: String,
        state: JobState,
        exit_code: Option<i32>,
    },

    // =========================================================================
    // USAGE REPORTER / OUTBOX
    // =========================================================================
    /// A usage record was emitted and enqueued for delivery.
    UsageRecorded {
        usage_id: String,
        resource_id: String,
        is_final: bool,
    },

    /// An outbox entry exhausted its retries and was dead-lettered.
    OutboxEntryDead {
        entry_id: String,
        idempotency_key: String,
        attempts: u32,
    },

    // =========================================================================
    // CHAIN EVENT CLIENT
    // =========================================================================
    /// A canonical chain event parsed from the consensus stream.
    ///
    /// Delivered at least once; consumers dedupe by `event.event_id`.
    ChainEventReceived {
        event: ChainEvent,
    },

    // =========================================================================
    // CRITICAL ALERTS
    // =========================================================================
    /// Critical condition requiring operator attention.
    Alert {
        component: String,
        message: String,
    },
}

/// Coarse-grained topics for subscription filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTopic {
    Aggregator,
    HealthMonitor,
    JobLifecycle,
    Billing,
    Chain,
    Alerts,
}

impl EventTopic {
    /// Every topic, in a fixed order usable as an index space.
    pub const ALL: [EventTopic; 6] = [
        EventTopic::Aggregator,
        EventTopic::HealthMonitor,
        EventTopic::JobLifecycle,
        EventTopic::Billing,
        EventTopic::Chain,
        EventTopic::Alerts,
    ];

    /// Position of this topic in [`EventTopic::ALL`].
    pub fn index(self) -> usize {
        match self {
            EventTopic::Aggregator => 0,
            EventTopic::HealthMonitor => 1,
            EventTopic::JobLifecycle => 2,
            EventTopic::Billing => 3,
            EventTopic::Chain => 4,
            EventTopic::Alerts => 5,
        }
    }
}

impl MarketEvent {
    /// Get the topic for this event (for filtering).
    #[must_use]
    pub fn topic(&self) -> EventTopic {
        match self {
            Self::HeartbeatAccepted { .. }
            | Self::NodeRegistered { .. }
            | Self::NodeDeregistered { .. } => EventTopic::Aggregator,
            Self::NodeHealthChanged { .. } => EventTopic::HealthMonitor,
            Self::JobTransitioned { .. } | Self::JobFinished { .. } => EventTopic::JobLifecycle,
            Self::UsageRecorded { .. } | Self::OutboxEntryDead { .. } => EventTopic::Billing,
            Self::ChainEventReceived { .. } => EventTopic::Chain,
            Self::Alert { .. } => EventTopic::Alerts,
        }
    }

    /// Name of the component that emits this event, for logging.
    #[must_use]
    pub fn source_component(&self) -> &'static str {
        match self.topic() {
            EventTopic::Aggregator => "node-aggregator",
            EventTopic::HealthMonitor => "heartbeat-monitor",
            EventTopic::JobLifecycle => "job-lifecycle",
            EventTopic::Billing => "usage-reporter",
            EventTopic::Chain => "chain-events",
            EventTopic::Alerts => "alerts",
        }
    }
}

/// Filter for event subscriptions.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Topics to receive; empty means all topics.
    pub topics: Vec<EventTopic>,
}

impl EventFilter {
    /// Match every event.
    #[must_use]
    pub fn all() -> Self {
        Self { topics: Vec::new() }
    }

    /// Match only the given topics.
    #[must_use]
    pub fn topics(topics: Vec<EventTopic>) -> Self {
        Self { topics }
    }

    /// Whether an event passes this filter.
    #[must_use]
    pub fn matches(&self, event: &MarketEvent) -> bool {
        self.topics.is_empty() || self.topics.contains(&event.topic())
    }
}
