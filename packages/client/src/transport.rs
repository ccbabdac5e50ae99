//! Transport to a room hub.
//!
//! A `Connector` turns a room id and token into a `TransportLink`: a pair of
//! channels backed by a background task that owns the socket. Dropping the
//! link closes the socket.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use guildrelay_shared::credential::subprotocol_header;
use tokio::{net::TcpStream, sync::mpsc};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{
        self, Message,
        client::IntoClientRequest,
        http::{HeaderValue, header::SEC_WEBSOCKET_PROTOCOL},
    },
};

use crate::error::ClientError;

/// Something that happened on an open transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A text frame from the hub
    Text(String),
    /// The peer closed the connection
    Closed,
    /// The connection broke
    Failed(String),
}

/// Channels to an open transport
#[derive(Debug)]
pub struct TransportLink {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<TransportEvent>,
}

#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, room_id: i64, token: &str) -> Result<TransportLink, ClientError>;
}

/// Build the stream URL of a room from the relay's base URL.
///
/// `http`/`https` bases are mapped to `ws`/`wss`.
pub fn stream_url(base_url: &str, room_id: i64) -> String {
    let base = base_url.trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        base.to_string()
    };
    format!("{}/rooms/{}/stream", base, room_id)
}

/// Connects with tokio-tungstenite, carrying the token in the subprotocol list.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    base_url: String,
}

impl WebSocketConnector {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, room_id: i64, token: &str) -> Result<TransportLink, ClientError> {
        let url = stream_url(&self.base_url, room_id);
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| ClientError::Connection(e.to_string()))?;
        let protocol = HeaderValue::from_str(&subprotocol_header(token))
            .map_err(|e| ClientError::Connection(e.to_string()))?;
        request
            .headers_mut()
            .insert(SEC_WEBSOCKET_PROTOCOL, protocol);

        let (socket, _) = connect_async(request).await.map_err(|e| match e {
            tungstenite::Error::Http(response) => ClientError::Rejected(response.status().as_u16()),
            other => ClientError::Connection(other.to_string()),
        })?;
        tracing::debug!("Connected to {}", url);

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        tokio::spawn(pump(socket, outbound_rx, inbound_tx));

        Ok(TransportLink {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}

/// Move frames between the socket and the link until either side ends
async fn pump(
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mut outbound: mpsc::UnboundedReceiver<String>,
    inbound: mpsc::UnboundedSender<TransportEvent>,
) {
    let (mut write, mut read) = socket.split();

    loop {
        tokio::select! {
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if inbound.send(TransportEvent::Text(text.to_string())).is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    inbound.send(TransportEvent::Closed).ok();
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!("WebSocket read error: {}", e);
                    inbound.send(TransportEvent::Failed(e.to_string())).ok();
                    break;
                }
            },
            text = outbound.recv() => match text {
                Some(text) => {
                    if let Err(e) = write.send(Message::Text(text.into())).await {
                        tracing::warn!("WebSocket write error: {}", e);
                        inbound.send(TransportEvent::Failed(e.to_string())).ok();
                        break;
                    }
                }
                // The link was dropped
                None => {
                    write.close().await.ok();
                    break;
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_url_maps_http_schemes() {
        // テスト項目: http / https のベース URL が ws / wss に変換される
        // given (前提条件):
        let plain = "http://127.0.0.1:8080";
        let secure = "https://relay.example.com/";

        // when (操作):
        let plain_url = stream_url(plain, 42);
        let secure_url = stream_url(secure, 7);

        // then (期待する結果):
        assert_eq!(plain_url, "ws://127.0.0.1:8080/rooms/42/stream");
        assert_eq!(secure_url, "wss://relay.example.com/rooms/7/stream");
    }

    #[test]
    fn test_stream_url_keeps_ws_scheme() {
        // テスト項目: ws のベース URL はそのまま使われる
        // given (前提条件):
        let base = "ws://localhost:3000";

        // when (操作):
        let url = stream_url(base, 1);

        // then (期待する結果):
        assert_eq!(url, "ws://localhost:3000/rooms/1/stream");
    }
}
