//! # The Socket Port
//!
//! Abstracts the websocket so the connection state machine is testable with
//! scripted sockets. The production adapter wraps tokio-tungstenite.

use async_trait::async_trait;
use thiserror::Error;

/// Socket-level failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SocketError {
    /// Dialing the endpoint failed.
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    /// The established connection broke.
    #[error("connection lost: {0}")]
    ConnectionLost(String),
}

/// One established text-frame connection.
#[async_trait]
pub trait EventSocket: Send {
    /// Send one text frame.
    async fn send(&mut self, text: String) -> Result<(), SocketError>;

    /// Receive the next text frame. `None` means the peer closed cleanly.
    async fn recv(&mut self) -> Option<Result<String, SocketError>>;
}

/// Dials new connections.
#[async_trait]
pub trait SocketConnector: Send + Sync {
    /// Open a connection to `url`.
    async fn connect(&self, url: &str) -> Result<Box<dyn EventSocket>, SocketError>;
}
