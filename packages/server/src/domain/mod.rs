//! Domain layer: value objects, entities and the collaborator traits the
//! relay depends on.

pub mod entity;
pub mod error;
pub mod repository;
pub mod value_object;

pub use entity::{AuthorizationVerdict, ChatMessage};
pub use error::{AuthorityError, RepositoryError, ValueObjectError};
pub use repository::{IdentityResolver, MembershipAuthority, MessageStore};
pub use value_object::{
    ConnectionId, Credential, Identity, IdentityId, MessageBody, MessageId, RoomId, Timestamp,
};

#[cfg(test)]
pub use repository::MockMembershipAuthority;
