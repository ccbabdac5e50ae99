//! Room Hub
//!
//! ルームごとに 1 つの tokio タスクとして動くアクター。
//! 接続中ソケットの集合と認可キャッシュを排他的に所有し、
//! すべての操作をコマンドチャネル経由で直列に処理します。
//!
//! ## 設計ノート
//!
//! - ソケットへの送信は `try_send` のみ（遅いクライアントでファンアウトを止めない）
//! - 送信に失敗したソケットはその場で集合から取り除く
//! - 接続 ID → ユーザーの対応はこのアクターのサイドテーブルで、ソケットの寿命は
//!   UI 層の `handle_socket` が持つ

use std::{collections::HashMap, sync::Arc};

use guildrelay_shared::{
    protocol::{ClientFrame, GuildMessage},
    time::Clock,
};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use super::auth_cache::AuthorizationCache;
use crate::domain::{
    ChatMessage, ConnectionId, Identity, IdentityId, MessageBody, MessageStore, RoomId, Timestamp,
};

/// 1 ソケット分の送信キュー
pub type OutboundSender = mpsc::Sender<String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HubError {
    #[error("room hub {0} is no longer running")]
    Closed(RoomId),
}

/// 認可済みの接続
pub struct AuthorizedConnection {
    pub identity: Identity,
    pub room_id: RoomId,
    sender: OutboundSender,
}

enum HubCommand {
    Authorize {
        identity: IdentityId,
        reply: oneshot::Sender<bool>,
    },
    Register {
        connection_id: ConnectionId,
        identity: Identity,
        sender: OutboundSender,
    },
    Inbound {
        connection_id: ConnectionId,
        text: String,
    },
    BroadcastExternal {
        messages: Vec<ChatMessage>,
        reply: oneshot::Sender<usize>,
    },
    Unregister {
        connection_id: ConnectionId,
    },
    LiveCount {
        reply: oneshot::Sender<usize>,
    },
}

/// RoomHub アクターへのハンドル
///
/// アクターはハンドルがすべて drop されると、受信済みのコマンドを処理してから止まる。
#[derive(Clone)]
pub struct RoomHubHandle {
    room_id: RoomId,
    commands: mpsc::UnboundedSender<HubCommand>,
}

/// アクターを生かし続けない参照（レジストリ用）
pub struct WeakRoomHubHandle {
    room_id: RoomId,
    commands: mpsc::WeakUnboundedSender<HubCommand>,
}

impl WeakRoomHubHandle {
    /// 誰かがまだハンドルを持っていれば、そのアクターへのハンドルを返す
    pub fn upgrade(&self) -> Option<RoomHubHandle> {
        let commands = self.commands.upgrade()?;
        Some(RoomHubHandle {
            room_id: self.room_id,
            commands,
        })
        .filter(|handle| !handle.is_closed())
    }
}

impl RoomHubHandle {
    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    pub fn downgrade(&self) -> WeakRoomHubHandle {
        WeakRoomHubHandle {
            room_id: self.room_id,
            commands: self.commands.downgrade(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    /// 同じアクターを指しているか
    pub fn same_hub(&self, other: &RoomHubHandle) -> bool {
        self.commands.same_channel(&other.commands)
    }

    fn send(&self, command: HubCommand) -> Result<(), HubError> {
        self.commands
            .send(command)
            .map_err(|_| HubError::Closed(self.room_id))
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> HubCommand,
    ) -> Result<T, HubError> {
        let (reply, response) = oneshot::channel();
        self.send(build(reply))?;
        response.await.map_err(|_| HubError::Closed(self.room_id))
    }

    /// ユーザーがこのルームを使えるか（認可キャッシュ経由）
    pub async fn authorize(&self, identity: &IdentityId) -> Result<bool, HubError> {
        let identity = identity.clone();
        self.request(|reply| HubCommand::Authorize { identity, reply })
            .await
    }

    pub fn register(
        &self,
        connection_id: ConnectionId,
        identity: Identity,
        sender: OutboundSender,
    ) -> Result<(), HubError> {
        self.send(HubCommand::Register {
            connection_id,
            identity,
            sender,
        })
    }

    pub fn inbound(&self, connection_id: ConnectionId, text: String) -> Result<(), HubError> {
        self.send(HubCommand::Inbound {
            connection_id,
            text,
        })
    }

    /// 保存済みメッセージを配信し、配信したコピー数を返す
    pub async fn broadcast_external(&self, messages: Vec<ChatMessage>) -> Result<usize, HubError> {
        self.request(|reply| HubCommand::BroadcastExternal { messages, reply })
            .await
    }

    /// 冪等。アクターが既に止まっていても何もしない
    pub fn unregister(&self, connection_id: ConnectionId) {
        let _ = self.send(HubCommand::Unregister { connection_id });
    }

    pub async fn live_count(&self) -> Result<usize, HubError> {
        self.request(|reply| HubCommand::LiveCount { reply }).await
    }
}

pub struct RoomHub {
    room_id: RoomId,
    connections: HashMap<ConnectionId, AuthorizedConnection>,
    auth_cache: AuthorizationCache,
    store: Arc<dyn MessageStore>,
    clock: Arc<dyn Clock>,
}

impl RoomHub {
    pub fn new(
        room_id: RoomId,
        auth_cache: AuthorizationCache,
        store: Arc<dyn MessageStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            room_id,
            connections: HashMap::new(),
            auth_cache,
            store,
            clock,
        }
    }

    /// アクタータスクを起動してハンドルを返す
    pub fn spawn(self) -> RoomHubHandle {
        let (commands, inbox) = mpsc::unbounded_channel();
        let handle = RoomHubHandle {
            room_id: self.room_id,
            commands,
        };
        tokio::spawn(self.run(inbox));
        handle
    }

    async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<HubCommand>) {
        tracing::info!("room hub {} started", self.room_id);
        while let Some(command) = inbox.recv().await {
            self.dispatch(command).await;
        }
        tracing::info!("room hub {} stopped", self.room_id);
    }

    async fn dispatch(&mut self, command: HubCommand) {
        match command {
            HubCommand::Authorize { identity, reply } => {
                let allowed = self
                    .auth_cache
                    .check_membership(&identity, self.room_id)
                    .await;
                let _ = reply.send(allowed);
            }
            HubCommand::Register {
                connection_id,
                identity,
                sender,
            } => self.register(connection_id, identity, sender),
            HubCommand::Inbound {
                connection_id,
                text,
            } => {
                self.handle_inbound_frame(connection_id, &text).await;
            }
            HubCommand::BroadcastExternal { messages, reply } => {
                let delivered = self.broadcast_external(&messages);
                let _ = reply.send(delivered);
            }
            HubCommand::Unregister { connection_id } => self.unregister(connection_id),
            HubCommand::LiveCount { reply } => {
                let _ = reply.send(self.connections.len());
            }
        }
    }

    pub fn register(&mut self, connection_id: ConnectionId, identity: Identity, sender: OutboundSender) {
        tracing::info!(
            "connection {} ({}) joined room {}",
            connection_id,
            identity.id,
            self.room_id
        );
        self.connections.insert(
            connection_id,
            AuthorizedConnection {
                identity,
                room_id: self.room_id,
                sender,
            },
        );
    }

    pub fn unregister(&mut self, connection_id: ConnectionId) {
        if self.connections.remove(&connection_id).is_some() {
            tracing::info!("connection {} left room {}", connection_id, self.room_id);
        }
    }

    pub fn live_count(&self) -> usize {
        self.connections.len()
    }

    /// 受信フレームを処理する。保存して配信したメッセージを返す
    pub async fn handle_inbound_frame(
        &mut self,
        connection_id: ConnectionId,
        text: &str,
    ) -> Option<ChatMessage> {
        let sender = self.connections.get(&connection_id)?.identity.id.clone();

        let frame = match serde_json::from_str::<ClientFrame>(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!("dropping malformed frame from {}: {}", connection_id, e);
                return None;
            }
        };
        let ClientFrame::Message { room_id, message } = frame;

        if room_id != self.room_id.value() {
            tracing::warn!(
                "dropping frame for room {} sent by {} on room {}",
                room_id,
                sender,
                self.room_id
            );
            return None;
        }
        let Ok(body) = MessageBody::new(message) else {
            tracing::debug!("dropping empty message from {}", connection_id);
            return None;
        };

        let sent_at = Timestamp::new(self.clock.now_millis());
        let pending = ChatMessage::from_web(self.room_id, sender, body, sent_at);
        let id = match self.store.insert(pending.clone()).await {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!("failed to persist message in room {}: {}", self.room_id, e);
                return None;
            }
        };
        let stored = pending.with_id(id);

        match GuildMessage::from(stored.clone()).to_frame_json() {
            Ok(payload) => {
                let delivered = self.fan_out(self.room_id, &payload);
                tracing::debug!(
                    "message {} fanned out to {} sockets in room {}",
                    id.value(),
                    delivered,
                    self.room_id
                );
            }
            Err(e) => tracing::warn!("failed to encode message {}: {}", id.value(), e),
        }
        Some(stored)
    }

    /// 外部で保存済みのメッセージを、ルームが一致するソケットに配信する
    pub fn broadcast_external(&mut self, messages: &[ChatMessage]) -> usize {
        let mut delivered = 0;
        for message in messages {
            let payload = match GuildMessage::from(message.clone()).to_frame_json() {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::warn!("failed to encode injected message: {}", e);
                    continue;
                }
            };
            delivered += self.fan_out(message.room_id, &payload);
        }
        delivered
    }

    /// ルームが一致するソケットに送信し、送信できた数を返す。
    /// 送信に失敗したソケットは即座に取り除く
    fn fan_out(&mut self, room_id: RoomId, payload: &str) -> usize {
        let mut delivered = 0;
        self.connections.retain(|connection_id, connection| {
            if connection.room_id != room_id {
                return true;
            }
            match connection.sender.try_send(payload.to_string()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(e) => {
                    tracing::warn!(
                        "evicting connection {} ({}) from room {}: {}",
                        connection_id,
                        connection.identity.id,
                        room_id,
                        e
                    );
                    false
                }
            }
        });
        delivered
    }
}
