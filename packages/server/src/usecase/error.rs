//! UseCase 層のエラー

use thiserror::Error;

/// 接続受付の失敗。いずれも upgrade 前に返す
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AcceptError {
    #[error("missing or unknown credential")]
    Unauthorized,

    #[error("identity is not a member of the room")]
    Forbidden,

    #[error("room hub is unavailable")]
    HubUnavailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HistoryError {
    #[error("missing or unknown credential")]
    Unauthorized,

    #[error("identity is not a member of the room")]
    Forbidden,

    #[error("room hub is unavailable")]
    HubUnavailable,

    #[error("invalid before_id cursor: {0}")]
    InvalidCursor(i64),

    #[error("message store failed: {0}")]
    Storage(String),
}

impl From<AcceptError> for HistoryError {
    fn from(error: AcceptError) -> Self {
        match error {
            AcceptError::Unauthorized => Self::Unauthorized,
            AcceptError::Forbidden => Self::Forbidden,
            AcceptError::HubUnavailable => Self::HubUnavailable,
        }
    }
}
