//! The subscription client service.

pub mod client;

pub use client::{ChainEventClient, ConnectionState, EventHandler};
