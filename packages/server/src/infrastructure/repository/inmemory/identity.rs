//! InMemory IdentityResolver 実装
//!
//! トークン → ユーザーの対応表。シードファイルから登録されるほか、
//! HTTP リゾルバが解決結果を書き込むキャッシュとしても使われます。

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::{AuthorityError, Credential, Identity, IdentityResolver};

#[derive(Default)]
pub struct InMemoryIdentityDirectory {
    players: RwLock<HashMap<String, Identity>>,
}

impl InMemoryIdentityDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// トークンに対応するユーザーを登録（既存の登録は上書き）
    pub async fn insert(&self, token: impl Into<String>, identity: Identity) {
        let mut players = self.players.write().await;
        players.insert(token.into(), identity);
    }

    pub async fn lookup(&self, credential: &Credential) -> Option<Identity> {
        let players = self.players.read().await;
        players.get(credential.as_str()).cloned()
    }

    pub async fn player_count(&self) -> usize {
        self.players.read().await.len()
    }
}

#[async_trait]
impl IdentityResolver for InMemoryIdentityDirectory {
    async fn resolve(&self, credential: &Credential) -> Result<Option<Identity>, AuthorityError> {
        Ok(self.lookup(credential).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::IdentityId;

    #[tokio::test]
    async fn test_resolve_known_and_unknown_tokens() {
        // テスト項目: 登録済みトークンだけがユーザーに解決される
        // given (前提条件):
        let directory = InMemoryIdentityDirectory::new();
        let alice = Identity::new(IdentityId::new("uuid-a".to_string()).unwrap(), "Alice");
        directory.insert("token-a", alice.clone()).await;

        // when (操作):
        let known = directory
            .resolve(&Credential::new("token-a".to_string()).unwrap())
            .await;
        let unknown = directory
            .resolve(&Credential::new("token-x".to_string()).unwrap())
            .await;

        // then (期待する結果):
        assert_eq!(known, Ok(Some(alice)));
        assert_eq!(unknown, Ok(None));
    }
}
