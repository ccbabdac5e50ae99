//! Domain entities.

use guildrelay_shared::protocol::WEB_ORIGIN;

use super::value_object::{IdentityId, MessageBody, MessageId, RoomId, Timestamp};

/// A chat message in a room.
///
/// `id` is `None` until persistence assigns one; once set it is the only
/// deduplication key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: Option<MessageId>,
    pub room_id: RoomId,
    pub origin_server: String,
    pub sender: IdentityId,
    pub body: MessageBody,
    pub transliterated_body: Option<String>,
    pub sent_at: Timestamp,
}

impl ChatMessage {
    /// A not-yet-persisted message posted through the web relay
    pub fn from_web(room_id: RoomId, sender: IdentityId, body: MessageBody, sent_at: Timestamp) -> Self {
        Self {
            id: None,
            room_id,
            origin_server: WEB_ORIGIN.to_string(),
            sender,
            body,
            transliterated_body: None,
            sent_at,
        }
    }

    pub fn with_id(mut self, id: MessageId) -> Self {
        self.id = Some(id);
        self
    }
}

/// Cached answer to "may this identity use this room".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthorizationVerdict {
    pub allowed: bool,
    pub checked_at: Timestamp,
}

impl AuthorizationVerdict {
    pub fn new(allowed: bool, checked_at: Timestamp) -> Self {
        Self {
            allowed,
            checked_at,
        }
    }

    /// Age of the verdict at `now`, in milliseconds
    pub fn age_millis(&self, now: Timestamp) -> i64 {
        now.value() - self.checked_at.value()
    }

    /// Strictly younger than `window_millis`
    pub fn is_younger_than(&self, now: Timestamp, window_millis: i64) -> bool {
        self.age_millis(now) < window_millis
    }
}
