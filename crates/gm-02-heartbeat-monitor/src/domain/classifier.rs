//! Health classification rules.
//!
//! Pure functions over "time since last heartbeat"; the sweep task applies
//! the results through the aggregator.

use shared_types::NodeState;

use super::config::MonitorConfig;

/// The health target for a node silent for `silent_ms`.
pub fn classify(silent_ms: u64, config: &MonitorConfig) -> NodeState {
    if silent_ms > config.dereg_ms {
        NodeState::Deregistered
    } else if silent_ms > config.offline_ms {
        NodeState::Offline
    } else if silent_ms > config.stale_ms {
        NodeState::Stale
    } else {
        NodeState::Active
    }
}

/// The transition the sweep should apply to a node, if any.
///
/// - Terminal nodes never move.
/// - `Draining` is an operator state; the monitor only takes it to
///   `Deregistered` once the deregistration threshold passes.
/// - `Pending` nodes are activated by their first heartbeat, not by the
///   sweep; the sweep only times them out.
pub fn next_state(current: NodeState, silent_ms: u64, config: &MonitorConfig) -> Option<NodeState> {
    if current.terminal() {
        return None;
    }
    let target = classify(silent_ms, config);
    if target == current {
        return None;
    }
    match (current, target) {
        (NodeState::Draining, NodeState::Deregistered) => Some(NodeState::Deregistered),
        (NodeState::Draining, _) => None,
        (NodeState::Pending, NodeState::Active) => None,
        _ => Some(target),
    }
}
