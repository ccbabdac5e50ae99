//! Request handlers.

mod http;
mod websocket;

pub use http::{health_check, history_page, internal_broadcast, room_status};
pub use websocket::websocket_handler;
