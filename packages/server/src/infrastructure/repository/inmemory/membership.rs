//! InMemory MembershipAuthority 実装
//!
//! (ルーム, ユーザー) の組を保持するメンバーシップ表。

use std::collections::HashSet;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::{AuthorityError, IdentityId, MembershipAuthority, RoomId};

#[derive(Default)]
pub struct InMemoryMembershipTable {
    members: RwLock<HashSet<(RoomId, IdentityId)>>,
}

impl InMemoryMembershipTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn grant(&self, identity: IdentityId, room_id: RoomId) {
        self.members.write().await.insert((room_id, identity));
    }

    /// 既に存在しない組の削除は何もしない
    pub async fn revoke(&self, identity: &IdentityId, room_id: RoomId) {
        self.members
            .write()
            .await
            .remove(&(room_id, identity.clone()));
    }

    pub async fn membership_count(&self) -> usize {
        self.members.read().await.len()
    }
}

#[async_trait]
impl MembershipAuthority for InMemoryMembershipTable {
    async fn is_member(&self, identity: &IdentityId, room_id: RoomId) -> Result<bool, AuthorityError> {
        let members = self.members.read().await;
        Ok(members.contains(&(room_id, identity.clone())))
    }
}
