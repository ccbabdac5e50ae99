//! Repository / collaborator trait 定義
//!
//! ドメイン層が必要とする外部協調者のインターフェースを定義します。
//! 具体的な実装は Infrastructure 層が提供します（依存性の逆転）。

use async_trait::async_trait;

use super::{
    AuthorityError, ChatMessage, Credential, Identity, IdentityId, MessageId, RepositoryError,
    RoomId,
};

/// チャットメッセージの永続化
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// メッセージを保存し、割り当てられた ID を返す
    async fn insert(&self, message: ChatMessage) -> Result<MessageId, RepositoryError>;

    /// `before` より古いメッセージを最大 `limit` 件、古い順で返す
    async fn page(
        &self,
        room_id: RoomId,
        before: Option<MessageId>,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, RepositoryError>;
}

/// クレデンシャルからユーザーを解決する
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// 未知のクレデンシャルは `Ok(None)`
    async fn resolve(&self, credential: &Credential) -> Result<Option<Identity>, AuthorityError>;
}

/// ルームのメンバーシップ判定の正本
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MembershipAuthority: Send + Sync {
    /// 明示的な「メンバーではない」は `Ok(false)`、問い合わせ不能は `Err`
    async fn is_member(&self, identity: &IdentityId, room_id: RoomId) -> Result<bool, AuthorityError>;
}
