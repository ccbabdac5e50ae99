//! Terminal client configuration.

use std::{path::PathBuf, time::Duration};

use clap::Parser;

use crate::domain::BackoffPolicy;

#[derive(Parser, Debug, Clone)]
#[command(name = "guildrelay-client")]
#[command(about = "Terminal client for the guild relay", long_about = None)]
pub struct ClientConfig {
    /// Base URL of the relay
    #[arg(short = 'u', long, env = "RELAY_URL", default_value = "http://127.0.0.1:8080")]
    pub url: String,

    /// Bearer token identifying the player
    #[arg(short = 't', long, env = "RELAY_TOKEN", hide_env_values = true)]
    pub token: String,

    /// Room to join; repeat for several rooms, the first one is focused
    #[arg(short = 'r', long = "room", required = true)]
    pub rooms: Vec<i64>,

    /// JSON file holding unread counts between runs
    #[arg(long, env = "RELAY_UNREAD_FILE")]
    pub unread_file: Option<PathBuf>,

    /// Delay before the first reconnect attempt, in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub base_backoff_ms: u64,

    /// Upper bound for reconnect delays, in milliseconds
    #[arg(long, default_value_t = 15000)]
    pub max_backoff_ms: u64,

    /// Default log level when RUST_LOG is not set
    #[arg(long, env = "RELAY_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl ClientConfig {
    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            Duration::from_millis(self.base_backoff_ms),
            Duration::from_millis(self.max_backoff_ms),
        )
    }
}
