//! History pages from the relay's HTTP API.

use std::time::Duration;

use guildrelay_shared::protocol::GuildMessage;
use serde::Deserialize;

use crate::{error::ClientError, store::ReconciliationStore};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// `GET /rooms/{room_id}/messages` response body
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryPage {
    pub room_id: i64,
    pub messages: Vec<GuildMessage>,
}

/// Build the history URL of a room, optionally paging before `before_id`
pub fn history_url(base_url: &str, room_id: i64, before_id: Option<i64>) -> String {
    let base = base_url.trim_end_matches('/');
    match before_id {
        Some(before_id) => format!("{}/rooms/{}/messages?before_id={}", base, room_id, before_id),
        None => format!("{}/rooms/{}/messages", base, room_id),
    }
}

#[derive(Debug, Clone)]
pub struct HistoryClient {
    http: reqwest::Client,
    base_url: String,
}

impl HistoryClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ClientError::History(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    /// Fetch one page, oldest message first
    pub async fn fetch_page(
        &self,
        room_id: i64,
        token: &str,
        before_id: Option<i64>,
    ) -> Result<Vec<GuildMessage>, ClientError> {
        let url = history_url(&self.base_url, room_id, before_id);
        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ClientError::History(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Rejected(status.as_u16()));
        }

        let page: HistoryPage = response
            .json()
            .await
            .map_err(|e| ClientError::History(e.to_string()))?;
        tracing::debug!(
            "Fetched {} messages of room {}",
            page.messages.len(),
            page.room_id
        );
        Ok(page.messages)
    }

    /// Load the newest page of a room into the store
    pub async fn load_initial_page(
        &self,
        store: &ReconciliationStore,
        room_id: i64,
        token: &str,
    ) -> Result<usize, ClientError> {
        let messages = self.fetch_page(room_id, token, None).await?;
        let count = messages.len();
        store.set_initial_page(room_id, messages);
        Ok(count)
    }

    /// Load the page before the oldest message the store holds.
    ///
    /// Falls back to the newest page when the room's log is empty.
    pub async fn load_older_page(
        &self,
        store: &ReconciliationStore,
        room_id: i64,
        token: &str,
    ) -> Result<usize, ClientError> {
        let Some(oldest) = store.oldest_id(room_id) else {
            return self.load_initial_page(store, room_id, token).await;
        };
        let messages = self.fetch_page(room_id, token, Some(oldest)).await?;
        let count = messages.len();
        store.prepend_older_page(room_id, messages);
        Ok(count)
    }
}
