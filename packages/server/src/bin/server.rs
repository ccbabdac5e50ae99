//! Room relay server.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin guildrelay-server -- --seed-file seed.json
//! cargo run --bin guildrelay-server -- --host 0.0.0.0 --port 3000
//! ```

use std::sync::Arc;

use clap::Parser;
use guildrelay_server::{bootstrap::build_relay, config::ServerConfig};
use guildrelay_shared::{logger::setup_logger, time::SystemClock};

#[tokio::main]
async fn main() {
    let config = ServerConfig::parse();

    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), &config.log_level);

    let relay = match build_relay(&config, Arc::new(SystemClock)).await {
        Ok(relay) => relay,
        Err(e) => {
            tracing::error!("failed to start relay: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = relay.server.run(&config.host, config.port).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
