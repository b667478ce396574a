//! Shared validation error types for ZenTalk mesh storage
//!
//! Component-level operational errors (transport failures, codec failures,
//! schema migration failures, ...) live in their owning crates per the
//! taxonomy in spec §7; this module only holds the validation errors that
//! `mesh-common::types` needs, shared because more than one crate validates
//! the same inputs (a `UserAddress` is checked both at the API edge and
//! inside the encryption key-derivation path).

use thiserror::Error;

/// Errors raised while validating a user address.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UserAddressError {
    #[error("wallet address must start with \"0x\"")]
    MissingPrefix,
    #[error("wallet address must be exactly 42 characters, got {0}")]
    WrongLength(usize),
    #[error("wallet address contains non-hex characters")]
    NotHex,
}

/// Errors raised while validating a shard key component.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ShardKeyError {
    #[error("component must not contain the \"_shard_\" sentinel")]
    ContainsSentinel,
}
