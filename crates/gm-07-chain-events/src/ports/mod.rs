//! Ports of the event client.

pub mod socket;

pub use socket::{EventSocket, SocketConnector, SocketError};
