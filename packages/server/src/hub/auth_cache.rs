//! 認可キャッシュ
//!
//! (ユーザー, ルーム) ごとのメンバーシップ判定を二段階の TTL で保持します。
//!
//! - freshness 以内: キャッシュをそのまま返す（ライブ問い合わせなし）
//! - freshness 経過: ライブ問い合わせを行い、結果をキャッシュ
//! - 問い合わせ失敗: 直近の判定が `allowed = true` かつ grace 以内なら許可、それ以外は拒否
//!
//! キャッシュは RoomHub が排他的に所有するため、ロックは不要です。

use std::{collections::HashMap, sync::Arc, time::Duration};

use guildrelay_shared::time::Clock;

use crate::domain::{
    AuthorityError, AuthorizationVerdict, IdentityId, MembershipAuthority, RoomId, Timestamp,
};

pub const DEFAULT_FRESHNESS: Duration = Duration::from_millis(45_000);
pub const DEFAULT_GRACE: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_AUTHORITY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthorizationPolicy {
    pub freshness: Duration,
    pub grace: Duration,
    pub authority_timeout: Duration,
}

impl Default for AuthorizationPolicy {
    fn default() -> Self {
        Self {
            freshness: DEFAULT_FRESHNESS,
            grace: DEFAULT_GRACE,
            authority_timeout: DEFAULT_AUTHORITY_TIMEOUT,
        }
    }
}

pub fn cache_key(identity: &IdentityId, room_id: RoomId) -> String {
    format!("member:{}:{}", identity, room_id)
}

fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

pub struct AuthorizationCache {
    verdicts: HashMap<String, AuthorizationVerdict>,
    authority: Arc<dyn MembershipAuthority>,
    clock: Arc<dyn Clock>,
    policy: AuthorizationPolicy,
}

impl AuthorizationCache {
    pub fn new(
        authority: Arc<dyn MembershipAuthority>,
        clock: Arc<dyn Clock>,
        policy: AuthorizationPolicy,
    ) -> Self {
        Self {
            verdicts: HashMap::new(),
            authority,
            clock,
            policy,
        }
    }

    pub fn verdict(&self, identity: &IdentityId, room_id: RoomId) -> Option<AuthorizationVerdict> {
        self.verdicts.get(&cache_key(identity, room_id)).copied()
    }

    /// メンバーシップを判定する。失敗はすべて `false` に畳み込む
    pub async fn check_membership(&mut self, identity: &IdentityId, room_id: RoomId) -> bool {
        let key = cache_key(identity, room_id);
        let now = Timestamp::new(self.clock.now_millis());

        if let Some(cached) = self.verdicts.get(&key)
            && cached.is_younger_than(now, millis(self.policy.freshness))
        {
            tracing::debug!("fresh verdict for {}: {}", key, cached.allowed);
            return cached.allowed;
        }

        match self.live_check(identity, room_id).await {
            Ok(allowed) => {
                self.verdicts
                    .insert(key, AuthorizationVerdict::new(allowed, now));
                allowed
            }
            Err(e) => {
                let fallback = self.verdicts.get(&key).is_some_and(|cached| {
                    cached.allowed && cached.is_younger_than(now, millis(self.policy.grace))
                });
                tracing::warn!(
                    "membership authority failed for {} ({}), grace fallback: {}",
                    key,
                    e,
                    fallback
                );
                fallback
            }
        }
    }

    async fn live_check(&self, identity: &IdentityId, room_id: RoomId) -> Result<bool, AuthorityError> {
        let timeout = self.policy.authority_timeout;
        match tokio::time::timeout(timeout, self.authority.is_member(identity, room_id)).await {
            Ok(result) => result,
            Err(_) => Err(AuthorityError::Timeout(timeout.as_millis())),
        }
    }
}
