//! UseCase: 外部（CRUD 層）で保存済みのメッセージを配信する
//!
//! メッセージをルームごとにまとめ、起動中の RoomHub へ並行して渡します。
//! RoomHub が起動していないルームは配信先がないのでスキップします
//! （注入によって RoomHub を起動しない）。

use std::{collections::BTreeMap, sync::Arc};

use futures_util::future::join_all;

use crate::{
    domain::{ChatMessage, RoomId},
    hub::HubRegistry,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastSummary {
    /// 配信したコピー数（ソケット数 × メッセージ数）
    pub delivered: usize,
    /// 配信先のルームがなかったメッセージ数
    pub skipped: usize,
}

pub struct BroadcastExternalUseCase {
    registry: Arc<HubRegistry>,
}

impl BroadcastExternalUseCase {
    pub fn new(registry: Arc<HubRegistry>) -> Self {
        Self { registry }
    }

    pub async fn execute(&self, messages: Vec<ChatMessage>) -> BroadcastSummary {
        let mut by_room: BTreeMap<RoomId, Vec<ChatMessage>> = BTreeMap::new();
        for message in messages {
            by_room.entry(message.room_id).or_default().push(message);
        }

        let mut summary = BroadcastSummary::default();
        let mut deliveries = Vec::new();
        for (room_id, batch) in by_room {
            match self.registry.existing(room_id).await {
                Some(hub) => deliveries.push(async move {
                    let count = batch.len();
                    (count, hub.broadcast_external(batch).await)
                }),
                None => {
                    tracing::debug!(
                        "no live hub for room {}, skipping {} messages",
                        room_id,
                        batch.len()
                    );
                    summary.skipped += batch.len();
                }
            }
        }

        for (count, result) in join_all(deliveries).await {
            match result {
                Ok(delivered) => summary.delivered += delivered,
                Err(e) => {
                    tracing::warn!("{}", e);
                    summary.skipped += count;
                }
            }
        }

        tracing::info!(
            "external broadcast delivered {} copies, skipped {} messages",
            summary.delivered,
            summary.skipped
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{ConnectionId, Identity, IdentityId, MessageBody, MessageId, Timestamp},
        hub::AuthorizationPolicy,
        infrastructure::repository::{InMemoryMembershipTable, InMemoryMessageStore},
    };
    use guildrelay_shared::time::SystemClock;
    use tokio::sync::mpsc;

    fn message(id: i64, room: i64) -> ChatMessage {
        ChatMessage {
            id: Some(MessageId::new(id).unwrap()),
            room_id: RoomId::new(room).unwrap(),
            origin_server: "Lobby".to_string(),
            sender: IdentityId::new("uuid-x".to_string()).unwrap(),
            body: MessageBody::new(format!("imported {id}")).unwrap(),
            transliterated_body: None,
            sent_at: Timestamp::new(id),
        }
    }

    #[tokio::test]
    async fn test_mixed_batch_is_routed_per_room() {
        // テスト項目: 起動中のルームにだけ配信され、他はスキップされる
        // given (前提条件): ルーム 42 に 2 ソケット、ルーム 7 は RoomHub なし
        let registry = Arc::new(HubRegistry::new(
            Arc::new(InMemoryMessageStore::new()),
            Arc::new(InMemoryMembershipTable::new()),
            Arc::new(SystemClock),
            AuthorizationPolicy::default(),
        ));
        let hub = registry.hub_for(RoomId::new(42).unwrap()).await;
        let mut receivers = Vec::new();
        for id in ["uuid-a", "uuid-b"] {
            let (tx, rx) = mpsc::channel(8);
            let identity = Identity::new(IdentityId::new(id.to_string()).unwrap(), id);
            hub.register(ConnectionId::generate(), identity, tx).unwrap();
            receivers.push(rx);
        }
        let usecase = BroadcastExternalUseCase::new(registry.clone());

        // when (操作):
        let summary = usecase
            .execute(vec![message(1, 42), message(2, 7), message(3, 42)])
            .await;

        // then (期待する結果):
        assert_eq!(summary, BroadcastSummary { delivered: 4, skipped: 1 });
        for rx in receivers.iter_mut() {
            assert!(rx.recv().await.unwrap().contains("imported 1"));
            assert!(rx.recv().await.unwrap().contains("imported 3"));
        }
        assert!(registry.existing(RoomId::new(7).unwrap()).await.is_none());
    }
}
