//! Logging setup utilities for the guild relay binaries.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Crates whose log output is enabled at the default level.
const RELAY_CRATES: [&str; 3] = ["guildrelay_shared", "guildrelay_server", "guildrelay_client"];

/// Build the default `EnvFilter` directive string.
///
/// Every relay crate plus the binary itself gets `default_log_level`;
/// `tower_http` request spans are always shown at `debug` when the default
/// level is `debug` or lower.
pub fn default_directives(binary_name: &str, default_log_level: &str) -> String {
    let mut directives: Vec<String> = RELAY_CRATES
        .iter()
        .map(|krate| format!("{}={}", krate, default_log_level))
        .collect();
    directives.push(format!(
        "{}={}",
        binary_name.replace('-', "_"),
        default_log_level
    ));
    directives.push(format!("tower_http={}", default_log_level));
    directives.join(",")
}

/// Initialize the tracing subscriber with the specified default log level.
///
/// The log level can be overridden using the `RUST_LOG` environment variable.
///
/// # Arguments
///
/// * `binary_name` - The name of the binary (e.g., "guildrelay-server")
/// * `default_log_level` - The default log level (e.g., "debug", "info", "warn", "error")
///
/// # Examples
///
/// ```no_run
/// use guildrelay_shared::logger::setup_logger;
///
/// setup_logger("guildrelay-server", "debug");
/// ```
pub fn setup_logger(binary_name: &str, default_log_level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_directives(binary_name, default_log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives_cover_all_crates_and_binary() {
        // テスト項目: 既定のフィルタに全クレートとバイナリ名が含まれる
        // given (前提条件):
        let binary_name = "relay-tool";

        // when (操作):
        let directives = default_directives(binary_name, "info");

        // then (期待する結果):
        assert!(directives.contains("guildrelay_shared=info"));
        assert!(directives.contains("guildrelay_server=info"));
        assert!(directives.contains("guildrelay_client=info"));
        assert!(directives.contains("relay_tool=info"));
        assert!(directives.contains("tower_http=info"));
    }
}
