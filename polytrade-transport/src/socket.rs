//! Connector seam: abstracts the actual websocket handshake so the
//! reconnect driver can be exercised against a mock in tests, the same way
//! the workspace precedent's `Transport` trait is implemented once for real
//! use and once as `MockTransport` for tests.

use futures::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("socket is not open")]
    NotOpen,
    #[error("io: {0}")]
    Io(String),
    #[error("connection timed out")]
    Timeout,
}

/// A live, already-established duplex connection. Implemented once over
/// `tokio-tungstenite` for real use; mocked in tests.
pub trait Socket: Send {
    fn send(&mut self, msg: Message) -> BoxFuture<'_, Result<(), TransportError>>;
    fn recv(&mut self) -> BoxFuture<'_, Option<Result<Message, TransportError>>>;
}

/// Performs the handshake. Swappable so tests don't need a real socket.
pub trait Connector: Send + Sync + 'static {
    fn connect(&self, url: String) -> BoxFuture<'static, Result<Box<dyn Socket>, TransportError>>;
}

struct TungsteniteSocket(
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
);

impl Socket for TungsteniteSocket {
    fn send(&mut self, msg: Message) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            self.0
                .send(msg)
                .await
                .map_err(|e| TransportError::Io(e.to_string()))
        })
    }

    fn recv(&mut self) -> BoxFuture<'_, Option<Result<Message, TransportError>>> {
        Box::pin(async move {
            self.0
                .next()
                .await
                .map(|r| r.map_err(|e| TransportError::Io(e.to_string())))
        })
    }
}

/// Default connector: dials a real websocket endpoint over TLS-or-plain TCP.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

impl Connector for WsConnector {
    fn connect(&self, url: String) -> BoxFuture<'static, Result<Box<dyn Socket>, TransportError>> {
        Box::pin(async move {
            let (stream, _response) = tokio_tungstenite::connect_async(&url)
                .await
                .map_err(|e| TransportError::Io(e.to_string()))?;
            Ok(Box::new(TungsteniteSocket(stream)) as Box<dyn Socket>)
        })
    }
}
