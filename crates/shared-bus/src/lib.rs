//! # Shared Bus - Event Bus for Inter-Subsystem Communication
//!
//! All fan-out notifications between subsystems go over this bus: the
//! aggregator announces accepted heartbeats, the monitor announces health
//! transitions, the lifecycle engine announces job transitions, and the
//! chain client announces parsed chain events.
//!
//! ```text
//! ┌──────────────┐                    ┌──────────────┐
//! │ Subsystem A  │                    │ Subsystem B  │
//! │              │    publish()       │              │
//! │              │ ──────┐            │              │
//! └──────────────┘       │            └──────────────┘
//!                        ▼                    ↑
//!                  ┌──────────────┐          │
//!                  │  Event Bus   │          │
//!                  │              │ ─────────┘
//!                  └──────────────┘  subscribe()
//! ```
//!
//! Delivery is best-effort within the process: slow subscribers lag rather
//! than block publishers, and the loss is counted on the subscription
//! handle. Anything that must survive a restart goes through the outbox
//! instead. The bus keeps per-topic listener counts so publishers can tell
//! when a topic has no audience.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod bus;
pub mod events;
pub mod subscription;

// Re-export main types
pub use bus::{EventPublisher, InMemoryEventBus};
pub use events::{EventFilter, EventTopic, MarketEvent};
pub use subscription::{Subscription, SubscriptionError};

/// Maximum events to buffer per subscriber before the oldest are dropped.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;
