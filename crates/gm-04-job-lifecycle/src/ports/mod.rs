//! Ports of the lifecycle engine.

pub mod outbound;

pub use outbound::{
    BillingPort, FleetPort, NullProviderGateway, PlacementFailure, PlacementProvider,
    ProviderGateway, SettlementKind,
};
