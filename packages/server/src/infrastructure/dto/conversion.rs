//! Conversion logic between DTOs and domain entities.

use guildrelay_shared::protocol::GuildMessage;

use crate::domain::{
    ChatMessage, IdentityId, MessageBody, MessageId, RoomId, Timestamp, ValueObjectError,
};
use crate::infrastructure::dto::http::InjectedMessage;

// ========================================
// Domain Entity → DTO
// ========================================

impl From<ChatMessage> for GuildMessage {
    fn from(model: ChatMessage) -> Self {
        Self {
            id: model.id.map(|id| id.value()),
            guild_id: model.room_id.value(),
            server: model.origin_server,
            sender: model.sender.into_string(),
            message: model.body.into_string(),
            transliterated_message: model.transliterated_body,
            timestamp: model.sent_at.value(),
        }
    }
}

// ========================================
// DTO → Domain Entity
// ========================================

impl TryFrom<InjectedMessage> for ChatMessage {
    type Error = ValueObjectError;

    fn try_from(dto: InjectedMessage) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Some(MessageId::new(dto.id)?),
            room_id: RoomId::new(dto.guild_id)?,
            origin_server: dto.server,
            sender: IdentityId::new(dto.sender)?,
            body: MessageBody::new(dto.message)?,
            transliterated_body: dto.transliterated_message,
            sent_at: Timestamp::new(dto.timestamp),
        })
    }
}

/// One element of an injection batch. `None` when the element does not
/// describe a valid persisted message.
pub fn injected_message(value: serde_json::Value) -> Option<ChatMessage> {
    let dto: InjectedMessage = serde_json::from_value(value).ok()?;
    ChatMessage::try_from(dto).ok()
}
