//! Real-time room relay.
//!
//! One hub actor per room owns that room's live sockets and authorization
//! cache; an axum router authenticates upgrade requests and hands accepted
//! sockets to the hub of the requested room.

pub mod bootstrap;
pub mod config;
pub mod domain;
pub mod hub;
pub mod infrastructure;
pub mod ui;
pub mod usecase;
