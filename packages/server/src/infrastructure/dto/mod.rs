//! Data Transfer Objects (DTOs) for the relay.
//!
//! - `http`: HTTP API request / response bodies
//! - `conversion`: DTO ⇔ domain entity conversion
//!
//! WebSocket frames live in `guildrelay_shared::protocol` because the client
//! speaks them too.

pub mod conversion;
pub mod http;
