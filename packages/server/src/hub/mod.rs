//! Per-room hub actors, their authorization cache and the registry that
//! routes a room id to its hub.

pub mod auth_cache;
pub mod registry;
pub mod room;

pub use auth_cache::{AuthorizationCache, AuthorizationPolicy};
pub use registry::HubRegistry;
pub use room::{HubError, OutboundSender, RoomHub, RoomHubHandle, WeakRoomHubHandle};
