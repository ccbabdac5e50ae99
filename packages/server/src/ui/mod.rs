//! HTTP / WebSocket entry point of the relay.

mod handler;
mod server;
mod signal;
pub mod state;

pub use server::Server;
pub use state::AppState;
