//! WebSocket wire frames exchanged between relay clients and room hubs.
//!
//! Both directions are JSON text frames tagged by a `type` field.

use serde::{Deserialize, Serialize};

/// `server` value stamped on messages sent through the web relay.
pub const WEB_ORIGIN: &str = "Web";

/// Frame sent from a client to its room hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Post a chat message to a room
    Message {
        #[serde(rename = "roomId", alias = "guildId")]
        room_id: i64,
        message: String,
    },
}

impl ClientFrame {
    /// Build a chat message frame for `room_id`
    pub fn message(room_id: i64, body: impl Into<String>) -> Self {
        Self::Message {
            room_id,
            message: body.into(),
        }
    }
}

/// Frame sent from a room hub to its clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// A persisted chat message
    GuildMessage(GuildMessage),
    /// Any frame type this build does not understand
    #[serde(other)]
    Unknown,
}

/// A chat message as it travels over the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildMessage {
    /// Assigned by persistence; absent for messages not yet stored
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub guild_id: i64,
    pub server: String,
    pub sender: String,
    pub message: String,
    #[serde(default)]
    pub transliterated_message: Option<String>,
    /// Unix timestamp (milliseconds)
    #[serde(default)]
    pub timestamp: i64,
}

impl GuildMessage {
    /// Serialize as an outbound `guild_message` frame
    pub fn to_frame_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&ServerFrame::GuildMessage(self.clone()))
    }
}
