//! The static event-type map.
//!
//! Exactly one on-chain schema version is active at a time, so the map is a
//! fixed table: canonical type on one side, the raw message action and its
//! subscription query on the other.

/// One canonical event type and its chain-side query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventMapping {
    /// Canonical type, e.g. `order.created`.
    pub canonical: &'static str,
    /// Raw message action on the chain, e.g. `CreateOrder`.
    pub raw_action: &'static str,
}

/// The active schema's mappings.
pub const MAPPINGS: &[EventMapping] = &[
    EventMapping {
        canonical: "order.created",
        raw_action: "CreateOrder",
    },
    EventMapping {
        canonical: "bid.created",
        raw_action: "CreateBid",
    },
    EventMapping {
        canonical: "allocation.status_changed",
        raw_action: "UpdateAllocationStatus",
    },
    EventMapping {
        canonical: "settlement.executed",
        raw_action: "ExecuteSettlement",
    },
    EventMapping {
        canonical: "hpc_job.status_changed",
        raw_action: "UpdateHPCJobStatus",
    },
];

/// Canonical type for a raw action, if the schema knows it.
pub fn canonical_for(raw_action: &str) -> Option<&'static str> {
    MAPPINGS
        .iter()
        .find(|m| m.raw_action == raw_action)
        .map(|m| m.canonical)
}

/// The subscription envelope for one mapping.
pub fn subscription_query(mapping: &EventMapping) -> String {
    format!("tm.event='Tx' AND message.action='{}'", mapping.raw_action)
}
