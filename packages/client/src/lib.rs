//! Terminal client for the guild relay.
//!
//! A [`manager::ConnectionManager`] keeps one shared connection per retained
//! room and reconnects with exponential backoff; received messages land in
//! the [`store::ReconciliationStore`], which also tracks unread counts.

pub mod config;
pub mod domain;
pub mod error;
pub mod formatter;
pub mod history;
pub mod manager;
pub mod session;
pub mod store;
pub mod transport;
pub mod ui;
pub mod unread;
