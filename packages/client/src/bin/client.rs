//! Terminal client for the guild relay.
//!
//! Connects to every given room, prints new messages of the focused room and
//! sends typed lines to it. Connections are re-established with exponential
//! backoff for as long as the client runs.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin guildrelay-client -- --token <token> --room 42
//! cargo run --bin guildrelay-client -- -t <token> -r 42 -r 7 --unread-file unread.json
//! ```

use clap::Parser;
use guildrelay_client::{config::ClientConfig, session::run_client_session};
use guildrelay_shared::logger::setup_logger;

#[tokio::main]
async fn main() {
    let config = ClientConfig::parse();

    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), &config.log_level);

    if let Err(e) = run_client_session(config).await {
        tracing::error!("Client error: {}", e);
        std::process::exit(1);
    }
}
