//! Server execution logic.

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use super::{
    handler::{health_check, history_page, internal_broadcast, room_status, websocket_handler},
    signal::shutdown_signal,
    state::AppState,
};

/// Room relay server
///
/// # Example
///
/// ```ignore
/// let server = Server::new(app_state);
/// server.run("127.0.0.1", 8080).await?;
/// ```
pub struct Server {
    state: Arc<AppState>,
}

impl Server {
    pub fn new(state: AppState) -> Self {
        Self {
            state: Arc::new(state),
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            // WebSocket エンドポイント
            .route("/rooms/{room_id}/stream", get(websocket_handler))
            // HTTP エンドポイント
            .route("/rooms/{room_id}/messages", get(history_page))
            .route("/internal/broadcast", post(internal_broadcast))
            .route("/api/health", get(health_check))
            .route("/debug/rooms/{room_id}", get(room_status))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Bind `host:port` and serve until Ctrl+C / SIGTERM
    pub async fn run(self, host: &str, port: u16) -> Result<(), std::io::Error> {
        let listener = TcpListener::bind((host, port)).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until Ctrl+C / SIGTERM
    pub async fn serve(self, listener: TcpListener) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!("room relay listening on {}", addr);
        tracing::info!("Connect to: ws://{}/rooms/<room_id>/stream", addr);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }
}
