//! Start-up seed data for the in-memory directory and membership table.
//!
//! ```json
//! {
//!   "players": [{ "token": "t-alice", "id": "uuid-a", "display_name": "Alice" }],
//!   "memberships": [{ "room_id": 42, "identity_id": "uuid-a" }]
//! }
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::{
    domain::{Identity, IdentityId, RoomId, ValueObjectError},
    infrastructure::repository::{InMemoryIdentityDirectory, InMemoryMembershipTable},
};

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("failed to read seed file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("seed file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid seed entry: {0}")]
    Invalid(#[from] ValueObjectError),
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedPlayer {
    pub token: String,
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedMembership {
    pub room_id: i64,
    pub identity_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SeedData {
    #[serde(default)]
    pub players: Vec<SeedPlayer>,
    #[serde(default)]
    pub memberships: Vec<SeedMembership>,
}

impl SeedData {
    pub fn from_json(text: &str) -> Result<Self, SeedError> {
        Ok(serde_json::from_str(text)?)
    }

    pub async fn load(path: &Path) -> Result<Self, SeedError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| SeedError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_json(&text)
    }

    /// Validate every entry first so a bad file leaves both tables untouched.
    pub async fn apply(
        self,
        directory: &InMemoryIdentityDirectory,
        memberships: &InMemoryMembershipTable,
    ) -> Result<(), SeedError> {
        let mut players = Vec::with_capacity(self.players.len());
        for player in self.players {
            let id = IdentityId::new(player.id)?;
            let display_name = player.display_name.unwrap_or_else(|| id.to_string());
            players.push((player.token, Identity::new(id, display_name)));
        }

        let mut grants = Vec::with_capacity(self.memberships.len());
        for membership in self.memberships {
            grants.push((
                IdentityId::new(membership.identity_id)?,
                RoomId::new(membership.room_id)?,
            ));
        }

        let (player_count, grant_count) = (players.len(), grants.len());
        for (token, identity) in players {
            directory.insert(token, identity).await;
        }
        for (identity, room_id) in grants {
            memberships.grant(identity, room_id).await;
        }

        tracing::info!(
            "seeded {} players and {} memberships",
            player_count,
            grant_count
        );
        Ok(())
    }
}
