//! Socket adapters.

pub mod ws;

pub use ws::TungsteniteConnector;
