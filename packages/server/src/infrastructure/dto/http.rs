//! HTTP API DTOs.

use guildrelay_shared::protocol::GuildMessage;
use serde::{Deserialize, Serialize};

/// A message injected by a trusted collaborator. It is already persisted,
/// so `id` is required.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InjectedMessage {
    pub id: i64,
    pub guild_id: i64,
    pub server: String,
    pub sender: String,
    pub message: String,
    #[serde(default)]
    pub transliterated_message: Option<String>,
    pub timestamp: i64,
}

/// `POST /internal/broadcast` body
#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastRequest {
    pub messages: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BroadcastResponse {
    pub delivered: usize,
    pub skipped: usize,
}

/// `GET /rooms/{room_id}/messages` query
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub before_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryResponse {
    pub room_id: i64,
    pub messages: Vec<GuildMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomStatusResponse {
    pub room_id: i64,
    pub live_connections: usize,
}
