//! Relay server configuration.
//!
//! Every option can be given as a command line flag or through its
//! `RELAY_*` environment variable.

use std::{path::PathBuf, time::Duration};

use clap::Parser;

use crate::{hub::AuthorizationPolicy, usecase::DEFAULT_PAGE_SIZE};

#[derive(Parser, Debug, Clone)]
#[command(name = "guildrelay-server")]
#[command(about = "Real-time room relay for guild chat", long_about = None)]
pub struct ServerConfig {
    /// Host address to bind the server to
    #[arg(short = 'H', long, env = "RELAY_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, env = "RELAY_PORT", default_value_t = 8080)]
    pub port: u16,

    /// JSON file with players and memberships loaded at start-up
    #[arg(long, env = "RELAY_SEED_FILE")]
    pub seed_file: Option<PathBuf>,

    /// Base URL of the identity authority (`GET {url}/players/me`)
    #[arg(long, env = "RELAY_AUTHORITY_URL")]
    pub authority_url: Option<String>,

    /// Bearer token required on `/internal/broadcast`; unset disables the route
    #[arg(long, env = "RELAY_INTERNAL_TOKEN", hide_env_values = true)]
    pub internal_token: Option<String>,

    /// Seconds a membership verdict is served from cache
    #[arg(long, env = "RELAY_MEMBERSHIP_FRESH_SECS", default_value_t = 45)]
    pub membership_fresh_secs: u64,

    /// Seconds a granted verdict survives an authority outage
    #[arg(long, env = "RELAY_MEMBERSHIP_GRACE_SECS", default_value_t = 1800)]
    pub membership_grace_secs: u64,

    /// Timeout for calls to the authority, in milliseconds
    #[arg(long, env = "RELAY_AUTHORITY_TIMEOUT_MS", default_value_t = 5000)]
    pub authority_timeout_ms: u64,

    /// Frames queued per socket before it is evicted as too slow
    #[arg(long, env = "RELAY_OUTBOUND_BUFFER", default_value_t = 64)]
    pub outbound_buffer: usize,

    /// Messages per history page
    #[arg(long, env = "RELAY_HISTORY_PAGE_SIZE", default_value_t = DEFAULT_PAGE_SIZE)]
    pub history_page_size: usize,

    /// Default log level when RUST_LOG is not set
    #[arg(long, env = "RELAY_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl ServerConfig {
    pub fn membership_freshness(&self) -> Duration {
        Duration::from_secs(self.membership_fresh_secs)
    }

    pub fn membership_grace(&self) -> Duration {
        Duration::from_secs(self.membership_grace_secs)
    }

    pub fn authority_timeout(&self) -> Duration {
        Duration::from_millis(self.authority_timeout_ms)
    }

    pub fn authorization_policy(&self) -> AuthorizationPolicy {
        AuthorizationPolicy {
            freshness: self.membership_freshness(),
            grace: self.membership_grace(),
            authority_timeout: self.authority_timeout(),
        }
    }
}
