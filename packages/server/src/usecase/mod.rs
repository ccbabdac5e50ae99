//! UseCase 層
//!
//! UI 層（HTTP / WebSocket ハンドラ）から呼ばれるアプリケーションロジック。

mod accept_connection;
mod broadcast_external;
mod error;
mod fetch_history;

pub use accept_connection::{AcceptConnectionUseCase, AcceptedConnection};
pub use broadcast_external::{BroadcastExternalUseCase, BroadcastSummary};
pub use error::{AcceptError, HistoryError};
pub use fetch_history::{DEFAULT_PAGE_SIZE, FetchHistoryUseCase};
