//! Error types for the relay client.

use thiserror::Error;

/// Client-specific errors
#[derive(Debug, Error)]
pub enum ClientError {
    /// The transport could not be established or broke
    #[error("Connection error: {0}")]
    Connection(String),

    /// The relay answered the request with a non-success status
    #[error("Rejected by relay with HTTP {0}")]
    Rejected(u16),

    /// A history page could not be fetched or decoded
    #[error("History error: {0}")]
    History(String),

    /// Unread counts could not be read from or written to storage
    #[error("Unread storage error: {0}")]
    Storage(String),

    /// The connection manager task is no longer running
    #[error("Connection manager has shut down")]
    ManagerClosed,
}
