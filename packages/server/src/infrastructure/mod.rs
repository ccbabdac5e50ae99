//! Infrastructure layer: concrete implementations of the domain collaborators.

pub mod authority;
pub mod dto;
pub mod repository;
pub mod seed;
