//! インメモリ実装

mod identity;
mod membership;
mod message;

pub use identity::InMemoryIdentityDirectory;
pub use membership::InMemoryMembershipTable;
pub use message::InMemoryMessageStore;
