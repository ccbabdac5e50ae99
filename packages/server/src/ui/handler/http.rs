//! HTTP API endpoint handlers.

use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::{IntoResponse, Response},
};
use guildrelay_shared::{credential::parse_bearer_header, protocol::GuildMessage};

use crate::{
    domain::{ChatMessage, Credential, RoomId},
    infrastructure::dto::{
        conversion::injected_message,
        http::{
            BroadcastRequest, BroadcastResponse, HealthResponse, HistoryQuery, HistoryResponse,
            RoomStatusResponse,
        },
    },
    ui::state::AppState,
    usecase::HistoryError,
};

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_bearer_header)
}

/// Health check endpoint
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Debug endpoint: live connections of a room (0 when it has no hub)
pub async fn room_status(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
) -> Result<Json<RoomStatusResponse>, StatusCode> {
    let room_id = RoomId::try_from(room_id.as_str()).map_err(|_| StatusCode::BAD_REQUEST)?;
    let live_connections = match state.registry.existing(room_id).await {
        Some(hub) => hub
            .live_count()
            .await
            .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?,
        None => 0,
    };
    Ok(Json(RoomStatusResponse {
        room_id: room_id.value(),
        live_connections,
    }))
}

/// `GET /rooms/{room_id}/messages?before_id=<id>`
pub async fn history_page(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
    Query(query): Query<HistoryQuery>,
    headers: HeaderMap,
) -> Result<Json<HistoryResponse>, (StatusCode, &'static str)> {
    let room_id = RoomId::try_from(room_id.as_str())
        .map_err(|_| (StatusCode::BAD_REQUEST, "Invalid room"))?;
    let credential = bearer_token(&headers).and_then(|token| Credential::new(token).ok());

    let messages = state
        .fetch_history_usecase
        .execute(credential, room_id, query.before_id)
        .await
        .map_err(|e| match e {
            HistoryError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized"),
            HistoryError::Forbidden => (StatusCode::FORBIDDEN, "Forbidden"),
            HistoryError::InvalidCursor(_) => (StatusCode::BAD_REQUEST, "Invalid before_id"),
            HistoryError::HubUnavailable | HistoryError::Storage(_) => {
                tracing::warn!("history page for room {} failed: {}", room_id, e);
                (StatusCode::SERVICE_UNAVAILABLE, "History unavailable")
            }
        })?;

    Ok(Json(HistoryResponse {
        room_id: room_id.value(),
        messages: messages.into_iter().map(GuildMessage::from).collect(),
    }))
}

/// `POST /internal/broadcast`
///
/// Requires the configured internal token; with none configured every
/// request is rejected. Elements that are not valid persisted messages are
/// skipped; only a body without a `messages` array is rejected.
pub async fn internal_broadcast(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(expected) = state.internal_token.as_deref() else {
        tracing::warn!("rejecting internal broadcast: no internal token configured");
        return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
    };
    if bearer_token(&headers).as_deref() != Some(expected) {
        tracing::warn!("rejecting internal broadcast with wrong token");
        return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
    }

    let request: BroadcastRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!("invalid internal broadcast payload: {}", e);
            return (StatusCode::BAD_REQUEST, "Invalid payload").into_response();
        }
    };

    let total = request.messages.len();
    let messages: Vec<ChatMessage> = request
        .messages
        .into_iter()
        .filter_map(injected_message)
        .collect();
    let invalid = total - messages.len();

    let summary = state.broadcast_external_usecase.execute(messages).await;
    Json(BroadcastResponse {
        delivered: summary.delivered,
        skipped: summary.skipped + invalid,
    })
    .into_response()
}
