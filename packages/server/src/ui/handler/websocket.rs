//! WebSocket connection handlers.

use std::sync::Arc;

use axum::{
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade, rejection::WebSocketUpgradeRejection},
    },
    http::{
        HeaderMap, StatusCode,
        header::{AUTHORIZATION, SEC_WEBSOCKET_PROTOCOL},
    },
    response::{IntoResponse, Response},
};
use futures_util::{sink::SinkExt, stream::StreamExt};
use guildrelay_shared::credential::{parse_bearer_header, parse_protocol_header};
use tokio::sync::mpsc;

use crate::{
    domain::{ConnectionId, Credential, RoomId},
    ui::state::AppState,
    usecase::{AcceptError, AcceptedConnection},
};

/// Credential carried by the upgrade request, and the subprotocol name to
/// echo when it came from `Sec-WebSocket-Protocol`.
pub(crate) fn extract_credential(headers: &HeaderMap) -> (Option<Credential>, Option<&'static str>) {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_bearer_header)
        .and_then(|token| Credential::new(token).ok());
    if bearer.is_some() {
        return (bearer, None);
    }

    match headers
        .get(SEC_WEBSOCKET_PROTOCOL)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_protocol_header)
    {
        Some(parsed) => (Credential::new(parsed.token).ok(), Some(parsed.protocol)),
        None => (None, None),
    }
}

/// `GET /rooms/{room_id}/stream`
///
/// Every check runs before the upgrade: bad room id → 400, not an upgrade
/// request → 426, unknown credential → 401, not a member → 403.
pub async fn websocket_handler(
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let room_id = match RoomId::try_from(room_id.as_str()) {
        Ok(room_id) => room_id,
        Err(e) => {
            tracing::warn!("rejecting stream request: {}", e);
            return (StatusCode::BAD_REQUEST, "Invalid room").into_response();
        }
    };

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => {
            tracing::warn!("rejecting non-upgrade request for room {}: {}", room_id, rejection);
            return (StatusCode::UPGRADE_REQUIRED, "Upgrade required").into_response();
        }
    };

    let (credential, protocol) = extract_credential(&headers);
    let accepted = match state
        .accept_connection_usecase
        .execute(credential, room_id)
        .await
    {
        Ok(accepted) => accepted,
        Err(AcceptError::Unauthorized) => {
            return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
        }
        Err(AcceptError::Forbidden) => {
            return (StatusCode::FORBIDDEN, "Forbidden").into_response();
        }
        Err(AcceptError::HubUnavailable) => {
            return (StatusCode::SERVICE_UNAVAILABLE, "Room unavailable").into_response();
        }
    };

    tracing::info!(
        "{} ({}) authorized for room {}",
        accepted.identity.display_name,
        accepted.identity.id,
        room_id
    );

    let ws = match protocol {
        Some(protocol) => ws.protocols([protocol]),
        None => ws,
    };
    let outbound_buffer = state.outbound_buffer.max(1);
    ws.on_upgrade(move |socket| handle_socket(socket, accepted, outbound_buffer))
        .into_response()
}

/// Spawns a task that forwards the hub's frames for this socket to the
/// WebSocket sink. Ends when the hub drops the queue (eviction) or the
/// socket stops accepting writes.
fn pusher_loop(
    mut rx: mpsc::Receiver<String>,
    mut sender: futures_util::stream::SplitSink<WebSocket, Message>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if sender.send(Message::Text(payload.into())).await.is_err() {
                break;
            }
        }
        let _ = sender.close().await;
    })
}

async fn handle_socket(socket: WebSocket, accepted: AcceptedConnection, outbound_buffer: usize) {
    let AcceptedConnection { identity, hub } = accepted;
    let connection_id = ConnectionId::generate();
    let room_id = hub.room_id();

    let (tx, rx) = mpsc::channel(outbound_buffer);
    if let Err(e) = hub.register(connection_id, identity, tx) {
        tracing::warn!("dropping socket {}: {}", connection_id, e);
        return;
    }

    let (sender, mut receiver) = socket.split();
    let mut push_task = pusher_loop(rx, sender);

    let inbound_hub = hub.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            let msg = match msg {
                Ok(msg) => msg,
                Err(e) => {
                    tracing::debug!("socket {} errored: {}", connection_id, e);
                    break;
                }
            };

            match msg {
                Message::Text(text) => {
                    if inbound_hub.inbound(connection_id, text.to_string()).is_err() {
                        break;
                    }
                }
                Message::Close(_) => break,
                // binary / ping / pong
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut push_task => recv_task.abort(),
        _ = &mut recv_task => push_task.abort(),
    }

    hub.unregister(connection_id);
    tracing::debug!("socket {} on room {} closed", connection_id, room_id);
}
