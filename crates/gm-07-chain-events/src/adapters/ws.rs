//! tokio-tungstenite socket adapter.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::ports::{EventSocket, SocketConnector, SocketError};

/// Production connector over tokio-tungstenite.
#[derive(Debug, Default)]
pub struct TungsteniteConnector;

/// One live websocket connection.
pub struct TungsteniteSocket {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl SocketConnector for TungsteniteConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn EventSocket>, SocketError> {
        let (stream, _response) = connect_async(url)
            .await
            .map_err(|e| SocketError::ConnectFailed(e.to_string()))?;
        Ok(Box::new(TungsteniteSocket { stream }))
    }
}

#[async_trait]
impl EventSocket for TungsteniteSocket {
    async fn send(&mut self, text: String) -> Result<(), SocketError> {
        self.stream
            .send(Message::text(text))
            .await
            .map_err(|e| SocketError::ConnectionLost(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, SocketError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.to_string())),
                Ok(Message::Ping(payload)) => {
                    // Keepalive handled inline; a failed pong is a drop.
                    if let Err(e) = self.stream.send(Message::Pong(payload)).await {
                        return Some(Err(SocketError::ConnectionLost(e.to_string())));
                    }
                }
                Ok(Message::Close(_)) => return None,
                Ok(_) => continue, // binary/pong frames carry nothing for us
                Err(e) => return Some(Err(SocketError::ConnectionLost(e.to_string()))),
            }
        }
    }
}
