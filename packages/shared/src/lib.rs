//! Code shared by the guild relay server and client.

pub mod credential;
pub mod logger;
pub mod protocol;
pub mod time;
