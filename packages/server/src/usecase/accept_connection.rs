//! UseCase: 接続受付（upgrade 前の認証・認可）
//!
//! 1. クレデンシャルをユーザーに解決する（失敗 → Unauthorized）
//! 2. ルームの RoomHub を取得（なければ起動）
//! 3. RoomHub の認可キャッシュでメンバーシップを確認（拒否 → Forbidden）
//!
//! 拒否した場合はハンドルを手放すので、その試行のために起動した RoomHub は止まります。
//!
//! 認証局に問い合わせできない場合も Unauthorized として扱います。

use std::sync::Arc;

use crate::{
    domain::{Credential, Identity, IdentityResolver, RoomId},
    hub::{HubRegistry, RoomHubHandle},
};

use super::error::AcceptError;

/// 認可済みの接続先
pub struct AcceptedConnection {
    pub identity: Identity,
    pub hub: RoomHubHandle,
}

pub struct AcceptConnectionUseCase {
    resolver: Arc<dyn IdentityResolver>,
    registry: Arc<HubRegistry>,
}

impl AcceptConnectionUseCase {
    pub fn new(resolver: Arc<dyn IdentityResolver>, registry: Arc<HubRegistry>) -> Self {
        Self { resolver, registry }
    }

    pub async fn execute(
        &self,
        credential: Option<Credential>,
        room_id: RoomId,
    ) -> Result<AcceptedConnection, AcceptError> {
        let identity = self.authenticate(credential).await?;

        let hub = self.registry.hub_for(room_id).await;
        let allowed = hub.authorize(&identity.id).await.map_err(|e| {
            tracing::warn!("{}", e);
            AcceptError::HubUnavailable
        })?;
        if !allowed {
            tracing::warn!("{} is not a member of room {}", identity.id, room_id);
            return Err(AcceptError::Forbidden);
        }

        Ok(AcceptedConnection { identity, hub })
    }

    async fn authenticate(&self, credential: Option<Credential>) -> Result<Identity, AcceptError> {
        let Some(credential) = credential else {
            tracing::warn!("connection attempt without credential");
            return Err(AcceptError::Unauthorized);
        };

        match self.resolver.resolve(&credential).await {
            Ok(Some(identity)) => Ok(identity),
            Ok(None) => {
                tracing::warn!("credential does not map to a known identity");
                Err(AcceptError::Unauthorized)
            }
            Err(e) => {
                tracing::warn!("identity resolution failed: {}", e);
                Err(AcceptError::Unauthorized)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{AuthorityError, IdentityId},
        hub::AuthorizationPolicy,
        infrastructure::repository::{
            InMemoryIdentityDirectory, InMemoryMembershipTable, InMemoryMessageStore,
        },
    };
    use async_trait::async_trait;
    use guildrelay_shared::time::SystemClock;

    // ========================================
    // 【どのようなシナリオをテストするか】
    // 1. メンバーは受け付けられる
    // 2. クレデンシャルなし・未知のクレデンシャルは Unauthorized
    // 3. メンバーでないユーザーは Forbidden
    // 4. 認証局の障害は Unauthorized
    // 5. 拒否された試行は RoomHub を残さない
    // ========================================

    async fn create_usecase(
        resolver: Option<Arc<dyn IdentityResolver>>,
    ) -> (AcceptConnectionUseCase, Arc<HubRegistry>) {
        let directory = Arc::new(InMemoryIdentityDirectory::new());
        let alice = Identity::new(IdentityId::new("uuid-a".to_string()).unwrap(), "Alice");
        directory.insert("token-a", alice.clone()).await;
        let table = Arc::new(InMemoryMembershipTable::new());
        table.grant(alice.id, RoomId::new(42).unwrap()).await;

        let registry = Arc::new(HubRegistry::new(
            Arc::new(InMemoryMessageStore::new()),
            table,
            Arc::new(SystemClock),
            AuthorizationPolicy::default(),
        ));
        let resolver: Arc<dyn IdentityResolver> = match resolver {
            Some(resolver) => resolver,
            None => directory,
        };
        (AcceptConnectionUseCase::new(resolver, registry.clone()), registry)
    }

    fn credential(token: &str) -> Option<Credential> {
        Some(Credential::new(token.to_string()).unwrap())
    }

    #[tokio::test]
    async fn test_member_is_accepted() {
        // テスト項目: メンバーのクレデンシャルは受け付けられる
        // given (前提条件):
        let (usecase, _) = create_usecase(None).await;
        let room = RoomId::new(42).unwrap();

        // when (操作):
        let result = usecase.execute(credential("token-a"), room).await;

        // then (期待する結果):
        let accepted = result.ok().unwrap();
        assert_eq!(accepted.identity.display_name, "Alice");
        assert_eq!(accepted.hub.room_id(), room);
    }

    #[tokio::test]
    async fn test_missing_or_unknown_credential_is_unauthorized() {
        // テスト項目: クレデンシャルなし・未知のクレデンシャルは Unauthorized
        // given (前提条件):
        let (usecase, _) = create_usecase(None).await;
        let room = RoomId::new(42).unwrap();

        // when (操作):
        let missing = usecase.execute(None, room).await;
        let unknown = usecase.execute(credential("token-x"), room).await;

        // then (期待する結果):
        assert_eq!(missing.err(), Some(AcceptError::Unauthorized));
        assert_eq!(unknown.err(), Some(AcceptError::Unauthorized));
    }

    #[tokio::test]
    async fn test_non_member_is_forbidden() {
        // テスト項目: メンバーでないルームへの接続は Forbidden
        // given (前提条件):
        let (usecase, _) = create_usecase(None).await;

        // when (操作):
        let result = usecase
            .execute(credential("token-a"), RoomId::new(7).unwrap())
            .await;

        // then (期待する結果):
        assert_eq!(result.err(), Some(AcceptError::Forbidden));
    }

    #[tokio::test]
    async fn test_forbidden_attempts_leave_no_hub() {
        // テスト項目: メンバーでないルームへの試行を繰り返しても RoomHub は残らない
        // given (前提条件):
        let (usecase, registry) = create_usecase(None).await;

        // when (操作):
        for room in 100..150 {
            let result = usecase
                .execute(credential("token-a"), RoomId::new(room).unwrap())
                .await;
            assert_eq!(result.err(), Some(AcceptError::Forbidden));
        }

        // then (期待する結果):
        assert_eq!(registry.room_count().await, 0);
        let accepted = usecase
            .execute(credential("token-a"), RoomId::new(42).unwrap())
            .await
            .ok()
            .unwrap();
        assert_eq!(registry.room_count().await, 1);
        drop(accepted);
        assert_eq!(registry.room_count().await, 0);
    }

    struct UnreachableResolver;

    #[async_trait]
    impl IdentityResolver for UnreachableResolver {
        async fn resolve(&self, _: &Credential) -> Result<Option<Identity>, AuthorityError> {
            Err(AuthorityError::Unavailable("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_resolver_outage_is_unauthorized() {
        // テスト項目: ユーザー解決ができない場合は Unauthorized
        // given (前提条件):
        let (usecase, _) = create_usecase(Some(Arc::new(UnreachableResolver))).await;

        // when (操作):
        let result = usecase
            .execute(credential("token-a"), RoomId::new(42).unwrap())
            .await;

        // then (期待する結果):
        assert_eq!(result.err(), Some(AcceptError::Unauthorized));
    }
}
