//! Shared application state.

use std::sync::Arc;

use crate::{
    hub::HubRegistry,
    usecase::{AcceptConnectionUseCase, BroadcastExternalUseCase, FetchHistoryUseCase},
};

/// Shared application state
pub struct AppState {
    /// 接続受付（認証・認可）のユースケース
    pub accept_connection_usecase: Arc<AcceptConnectionUseCase>,
    /// 外部ブロードキャストのユースケース
    pub broadcast_external_usecase: Arc<BroadcastExternalUseCase>,
    /// 履歴ページ取得のユースケース
    pub fetch_history_usecase: Arc<FetchHistoryUseCase>,
    /// デバッグ用（ルームごとの接続数）
    pub registry: Arc<HubRegistry>,
    /// `/internal/broadcast` に要求するトークン（未設定なら常に 401）
    pub internal_token: Option<String>,
    /// 1 ソケットあたりの送信キュー長
    pub outbound_buffer: usize,
}
