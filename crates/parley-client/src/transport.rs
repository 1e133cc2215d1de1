//! WebSocket transport.
//!
//! Implements [`Connector`] over `tokio-tungstenite`. This is a thin layer
//! that moves binary messages; framing and protocol logic live above it.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::trace;

use crate::connection::{Connector, LinkRx, LinkTx, TransportError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Build the chat socket URL for a room-scoped connection.
///
/// The access token travels as a query parameter because browser WebSocket
/// clients cannot set headers, and the server keeps one handshake path for
/// all clients.
#[must_use]
pub fn connect_url(base: &str, room_id: u64, access_token: &str) -> String {
    format!("{base}?room={room_id}&token={access_token}")
}

/// [`Connector`] backed by `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

/// Sending half of a WebSocket link.
pub struct WsTx {
    sink: SplitSink<WsStream, Message>,
}

/// Receiving half of a WebSocket link.
pub struct WsRx {
    stream: SplitStream<WsStream>,
}

#[async_trait]
impl Connector for WsConnector {
    type Tx = WsTx;
    type Rx = WsRx;

    async fn dial(&self, url: &str) -> Result<(Self::Tx, Self::Rx), TransportError> {
        let (stream, _response) = connect_async(url)
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        let (sink, stream) = stream.split();
        Ok((WsTx { sink }, WsRx { stream }))
    }
}

#[async_trait]
impl LinkTx for WsTx {
    async fn send(&mut self, bytes: Vec<u8>) -> Result<(), TransportError> {
        self.sink
            .send(Message::Binary(bytes))
            .await
            .map_err(|e| TransportError::Stream(e.to_string()))
    }

    async fn close(&mut self, code: u16, reason: String) -> Result<(), TransportError> {
        let frame = CloseFrame { code: CloseCode::from(code), reason: reason.into() };
        self.sink
            .send(Message::Close(Some(frame)))
            .await
            .map_err(|e| TransportError::Stream(e.to_string()))
    }
}

#[async_trait]
impl LinkRx for WsRx {
    async fn recv(&mut self) -> Option<Result<Vec<u8>, TransportError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Binary(bytes)) => return Some(Ok(bytes)),
                // Keepalives are handled by tungstenite; text has no place
                // in this protocol
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Text(_) | Message::Frame(_)) => {
                    trace!("skipping non-binary message");
                },
                Ok(Message::Close(frame)) => {
                    trace!(?frame, "close frame received");
                    return None;
                },
                Err(e) => return Some(Err(TransportError::Stream(e.to_string()))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_carries_room_and_token() {
        let url = connect_url("wss://chat.example.com/ws", 7, "tok123");
        assert_eq!(url, "wss://chat.example.com/ws?room=7&token=tok123");
    }
}
