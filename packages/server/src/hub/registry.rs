//! ルーム ID → RoomHub の対応表
//!
//! ルームごとに生きている RoomHub はちょうど 1 つ。初めて参照されたときに
//! 起動し、アクターが止まっていれば次の参照で起動し直します。
//! ロックは対応表の参照にだけ使い、ルーム内の処理は各アクターが直列化します。
//!
//! 対応表は弱い参照だけを持ちます。接続・受付処理・配信がハンドルを
//! 手放すとアクターは止まるので、拒否された接続試行で RoomHub が残り続けることはありません。

use std::{collections::HashMap, sync::Arc};

use guildrelay_shared::time::Clock;
use tokio::sync::Mutex;

use super::{
    auth_cache::{AuthorizationCache, AuthorizationPolicy},
    room::{RoomHub, RoomHubHandle, WeakRoomHubHandle},
};
use crate::domain::{MembershipAuthority, MessageStore, RoomId};

pub struct HubRegistry {
    hubs: Mutex<HashMap<RoomId, WeakRoomHubHandle>>,
    store: Arc<dyn MessageStore>,
    authority: Arc<dyn MembershipAuthority>,
    clock: Arc<dyn Clock>,
    policy: AuthorizationPolicy,
}

impl HubRegistry {
    pub fn new(
        store: Arc<dyn MessageStore>,
        authority: Arc<dyn MembershipAuthority>,
        clock: Arc<dyn Clock>,
        policy: AuthorizationPolicy,
    ) -> Self {
        Self {
            hubs: Mutex::new(HashMap::new()),
            store,
            authority,
            clock,
            policy,
        }
    }

    /// ルームの RoomHub を返す（なければ起動する）
    pub async fn hub_for(&self, room_id: RoomId) -> RoomHubHandle {
        let mut hubs = self.hubs.lock().await;
        if let Some(handle) = hubs.get(&room_id).and_then(WeakRoomHubHandle::upgrade) {
            return handle;
        }

        hubs.retain(|_, weak| weak.upgrade().is_some());
        let cache = AuthorizationCache::new(self.authority.clone(), self.clock.clone(), self.policy);
        let handle = RoomHub::new(room_id, cache, self.store.clone(), self.clock.clone()).spawn();
        hubs.insert(room_id, handle.downgrade());
        handle
    }

    /// 起動済みの RoomHub だけを返す（起動はしない）
    pub async fn existing(&self, room_id: RoomId) -> Option<RoomHubHandle> {
        let hubs = self.hubs.lock().await;
        hubs.get(&room_id).and_then(WeakRoomHubHandle::upgrade)
    }

    /// 生きている RoomHub の数
    pub async fn room_count(&self) -> usize {
        let hubs = self.hubs.lock().await;
        hubs.values().filter(|weak| weak.upgrade().is_some()).count()
    }
}
