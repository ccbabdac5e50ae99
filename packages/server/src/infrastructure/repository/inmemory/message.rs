//! InMemory MessageStore 実装
//!
//! ドメイン層が定義する MessageStore trait の具体的な実装。
//! ルームごとの Vec をインメモリ DB として使用します。
//! ID は全ルームで共有する連番で、ルーム内では単調増加になります。

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{ChatMessage, MessageId, MessageStore, RepositoryError, RoomId};

#[derive(Default)]
struct MessageTable {
    last_id: i64,
    rooms: HashMap<RoomId, Vec<ChatMessage>>,
}

/// インメモリ MessageStore 実装
#[derive(Default)]
pub struct InMemoryMessageStore {
    table: Mutex<MessageTable>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// ルームに保存されているメッセージ数
    pub async fn count(&self, room_id: RoomId) -> usize {
        let table = self.table.lock().await;
        table.rooms.get(&room_id).map_or(0, Vec::len)
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn insert(&self, message: ChatMessage) -> Result<MessageId, RepositoryError> {
        let mut table = self.table.lock().await;
        let id = MessageId::new(table.last_id + 1)
            .map_err(|e| RepositoryError::Unavailable(e.to_string()))?;
        table.last_id = id.value();
        table
            .rooms
            .entry(message.room_id)
            .or_default()
            .push(message.with_id(id));
        Ok(id)
    }

    async fn page(
        &self,
        room_id: RoomId,
        before: Option<MessageId>,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, RepositoryError> {
        let table = self.table.lock().await;
        let Some(messages) = table.rooms.get(&room_id) else {
            return Ok(Vec::new());
        };

        // 保存順 = ID 昇順
        let end = match before {
            Some(cursor) => messages.partition_point(|m| m.id.is_some_and(|id| id < cursor)),
            None => messages.len(),
        };
        let start = end.saturating_sub(limit);
        Ok(messages[start..end].to_vec())
    }
}
