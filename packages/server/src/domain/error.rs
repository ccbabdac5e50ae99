//! Domain error types.

use thiserror::Error;

/// Value object validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueObjectError {
    #[error("room id must be a positive integer: {0}")]
    InvalidRoomId(String),

    #[error("message id must be a positive integer: {0}")]
    InvalidMessageId(i64),

    #[error("identity id must not be empty")]
    EmptyIdentityId,

    #[error("credential must not be empty")]
    EmptyCredential,

    #[error("message body must not be empty")]
    EmptyMessageBody,
}

/// Persistence errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Authority (identity / membership source) errors.
///
/// `Unavailable` means the authority could not be asked; an explicit
/// "not a member" is `Ok(false)`, never an error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthorityError {
    #[error("authority unavailable: {0}")]
    Unavailable(String),

    #[error("authority did not answer within {0} ms")]
    Timeout(u128),
}
