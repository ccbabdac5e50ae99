//! Dependency wiring shared by the binary and the integration tests.
//!
//! Initialize dependencies in order:
//! 1. In-memory stores (directory, membership table, message store)
//! 2. Seed data
//! 3. IdentityResolver (HTTP authority when configured)
//! 4. HubRegistry
//! 5. UseCases
//! 6. AppState / Server

use std::sync::Arc;

use guildrelay_shared::time::Clock;
use thiserror::Error;

use crate::{
    config::ServerConfig,
    domain::{AuthorityError, IdentityResolver},
    hub::HubRegistry,
    infrastructure::{
        authority::HttpIdentityResolver,
        repository::{InMemoryIdentityDirectory, InMemoryMembershipTable, InMemoryMessageStore},
        seed::{SeedData, SeedError},
    },
    ui::{AppState, Server},
    usecase::{AcceptConnectionUseCase, BroadcastExternalUseCase, FetchHistoryUseCase},
};

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Seed(#[from] SeedError),

    #[error("failed to build authority client: {0}")]
    Authority(#[from] AuthorityError),
}

/// A fully wired relay plus handles on its in-memory tables
pub struct Relay {
    pub directory: Arc<InMemoryIdentityDirectory>,
    pub memberships: Arc<InMemoryMembershipTable>,
    pub store: Arc<InMemoryMessageStore>,
    pub registry: Arc<HubRegistry>,
    pub server: Server,
}

pub async fn build_relay(config: &ServerConfig, clock: Arc<dyn Clock>) -> Result<Relay, BootstrapError> {
    // 1. In-memory stores
    let directory = Arc::new(InMemoryIdentityDirectory::new());
    let memberships = Arc::new(InMemoryMembershipTable::new());
    let store = Arc::new(InMemoryMessageStore::new());

    // 2. Seed data
    if let Some(path) = &config.seed_file {
        SeedData::load(path)
            .await?
            .apply(&directory, &memberships)
            .await?;
    }

    // 3. IdentityResolver
    let resolver: Arc<dyn IdentityResolver> = match &config.authority_url {
        Some(url) => {
            tracing::info!("resolving unknown credentials via {}", url);
            Arc::new(HttpIdentityResolver::new(
                url.clone(),
                config.authority_timeout(),
                directory.clone(),
            )?)
        }
        None => directory.clone(),
    };

    // 4. HubRegistry
    let registry = Arc::new(HubRegistry::new(
        store.clone(),
        memberships.clone(),
        clock,
        config.authorization_policy(),
    ));

    // 5. UseCases
    let accept_connection_usecase =
        Arc::new(AcceptConnectionUseCase::new(resolver, registry.clone()));
    let broadcast_external_usecase = Arc::new(BroadcastExternalUseCase::new(registry.clone()));
    let fetch_history_usecase = Arc::new(FetchHistoryUseCase::new(
        accept_connection_usecase.clone(),
        store.clone(),
        config.history_page_size,
    ));

    // 6. AppState / Server
    let server = Server::new(AppState {
        accept_connection_usecase,
        broadcast_external_usecase,
        fetch_history_usecase,
        registry: registry.clone(),
        internal_token: config.internal_token.clone(),
        outbound_buffer: config.outbound_buffer,
    });

    Ok(Relay {
        directory,
        memberships,
        store,
        registry,
        server,
    })
}
