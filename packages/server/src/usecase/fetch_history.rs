//! UseCase: ルームの履歴ページ取得
//!
//! 接続受付と同じ認証・認可（キャッシュ経由）を通したうえで、
//! `before` より古いメッセージを最大 `page_size` 件、古い順で返します。

use std::sync::Arc;

use crate::domain::{ChatMessage, Credential, MessageId, MessageStore, RoomId};

use super::{accept_connection::AcceptConnectionUseCase, error::HistoryError};

pub const DEFAULT_PAGE_SIZE: usize = 50;

pub struct FetchHistoryUseCase {
    accept: Arc<AcceptConnectionUseCase>,
    store: Arc<dyn MessageStore>,
    page_size: usize,
}

impl FetchHistoryUseCase {
    pub fn new(
        accept: Arc<AcceptConnectionUseCase>,
        store: Arc<dyn MessageStore>,
        page_size: usize,
    ) -> Self {
        Self {
            accept,
            store,
            page_size,
        }
    }

    pub async fn execute(
        &self,
        credential: Option<Credential>,
        room_id: RoomId,
        before_id: Option<i64>,
    ) -> Result<Vec<ChatMessage>, HistoryError> {
        let before = before_id
            .map(|raw| MessageId::new(raw).map_err(|_| HistoryError::InvalidCursor(raw)))
            .transpose()?;

        self.accept.execute(credential, room_id).await?;

        self.store
            .page(room_id, before, self.page_size)
            .await
            .map_err(|e| HistoryError::Storage(e.to_string()))
    }
}
