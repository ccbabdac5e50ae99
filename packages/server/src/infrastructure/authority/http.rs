//! HTTP IdentityResolver 実装
//!
//! まずローカルのディレクトリを引き、見つからなければ
//! `GET {base_url}/players/me` に Bearer トークンで問い合わせます。
//! 解決できたユーザーはディレクトリに書き戻します。

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::Deserialize;

use crate::{
    domain::{AuthorityError, Credential, Identity, IdentityId, IdentityResolver},
    infrastructure::repository::InMemoryIdentityDirectory,
};

#[derive(Debug, Deserialize)]
struct PlayerProfile {
    #[serde(default)]
    uuid: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

pub struct HttpIdentityResolver {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
    directory: Arc<InMemoryIdentityDirectory>,
}

impl HttpIdentityResolver {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        directory: Arc<InMemoryIdentityDirectory>,
    ) -> Result<Self, AuthorityError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthorityError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
            directory,
        })
    }

    fn map_transport_error(&self, error: reqwest::Error) -> AuthorityError {
        if error.is_timeout() {
            AuthorityError::Timeout(self.timeout.as_millis())
        } else {
            AuthorityError::Unavailable(error.to_string())
        }
    }
}

#[async_trait]
impl IdentityResolver for HttpIdentityResolver {
    async fn resolve(&self, credential: &Credential) -> Result<Option<Identity>, AuthorityError> {
        if let Some(identity) = self.directory.lookup(credential).await {
            return Ok(Some(identity));
        }

        let response = self
            .client
            .get(format!("{}/players/me", self.base_url))
            .bearer_auth(credential.as_str())
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        if status.is_client_error() {
            tracing::debug!("authority rejected credential with {}", status);
            return Ok(None);
        }
        if !status.is_success() {
            return Err(AuthorityError::Unavailable(format!(
                "authority responded with {}",
                status
            )));
        }

        let profile: PlayerProfile = response
            .json()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let Some(id) = profile.uuid.and_then(|uuid| IdentityId::new(uuid).ok()) else {
            return Ok(None);
        };
        let display_name = profile.name.unwrap_or_else(|| id.to_string());
        let identity = Identity::new(id, display_name);

        self.directory
            .insert(credential.as_str(), identity.clone())
            .await;
        tracing::info!("resolved identity {} via authority", identity.id);
        Ok(Some(identity))
    }
}
