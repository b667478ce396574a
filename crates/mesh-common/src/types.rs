//! Core identifiers and value types shared across the mesh storage crates.

use crate::error::{ShardKeyError, UserAddressError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// `0x`-prefixed, 42-character wallet address.
///
/// Validated once at the boundary (API edge, or key derivation) and then
/// passed around as an opaque, already-checked value — the same shape as
/// `objectio_common::types::BucketName`.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserAddress(String);

impl UserAddress {
    pub fn new(address: impl Into<String>) -> Result<Self, UserAddressError> {
        let address = address.into();
        Self::validate(&address)?;
        Ok(Self(address))
    }

    /// Construct without validation (internal use only, e.g. deserializing
    /// a value that was already validated on write).
    #[must_use]
    pub fn new_unchecked(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lowercase hex substring used as wallet-derived KDF input (the `0x`
    /// prefix stripped, per spec §4.3).
    #[must_use]
    pub fn hex_body_lowercase(&self) -> String {
        self.0[2..].to_ascii_lowercase()
    }

    fn validate(address: &str) -> Result<(), UserAddressError> {
        if !address.starts_with("0x") {
            return Err(UserAddressError::MissingPrefix);
        }
        if address.len() != 42 {
            return Err(UserAddressError::WrongLength(address.len()));
        }
        if !address[2..].chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(UserAddressError::NotHex);
        }
        Ok(())
    }
}

impl fmt::Debug for UserAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserAddress({:?})", self.0)
    }
}

impl fmt::Display for UserAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque chunk identifier, unique per user.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkId(pub u64);

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index of a shard within one encoding, `0..n`.
pub type ShardIndex = u8;

/// Variable-length peer identifier.
///
/// The DHT transport this engine disperses shards over is an external
/// dependency (spec §1); it is free to use node ids of any width, so this
/// is `Vec<u8>`-backed rather than a fixed array.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerId(Vec<u8>);

impl PeerId {
    #[must_use]
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// XOR distance to another peer id, per spec §4.5: byte-wise XOR,
    /// big-endian, the shorter operand implicitly zero-padded on the right.
    #[must_use]
    pub fn xor_distance(&self, other: &[u8]) -> Distance {
        let len = self.0.len().max(other.len());
        let mut out = vec![0u8; len];
        for i in 0..len {
            let a = self.0.get(i).copied().unwrap_or(0);
            let b = other.get(i).copied().unwrap_or(0);
            out[i] = a ^ b;
        }
        Distance(out)
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", hex::encode(&self.0))
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0))
    }
}

/// XOR distance between two peer ids, ordered lexicographically (= the
/// Kademlia distance metric). Grounded on `willief-communitas`'s
/// `dht::Distance`, generalized to variable-length ids.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Distance(Vec<u8>);

/// Build the canonical `"{user_address}_{chunk_id}_shard_{shard_index}"` key.
///
/// Errors if either embedded component contains the `_shard_` sentinel,
/// which would make the key ambiguous to parse back (spec §6).
pub fn shard_key(
    user: &UserAddress,
    chunk: ChunkId,
    shard_index: ShardIndex,
) -> Result<String, ShardKeyError> {
    if user.as_str().contains("_shard_") {
        return Err(ShardKeyError::ContainsSentinel);
    }
    Ok(format!("{user}_{chunk}_shard_{shard_index}"))
}

/// Per-shard availability vector returned by `chunk_status` (spec §4.9).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardAvailability(pub Vec<bool>);

impl ShardAvailability {
    #[must_use]
    pub fn available_count(&self) -> usize {
        self.0.iter().filter(|b| **b).count()
    }
}

/// Discretized chunk health, per spec §6/GLOSSARY thresholds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HealthLevel {
    Excellent,
    Good,
    Degraded,
    Critical,
    Lost,
}

impl HealthLevel {
    #[must_use]
    pub fn classify(available: usize) -> Self {
        use crate::constants::{HEALTH_CRITICAL, HEALTH_DEGRADED, HEALTH_EXCELLENT, HEALTH_GOOD};
        if available >= HEALTH_EXCELLENT {
            Self::Excellent
        } else if available >= HEALTH_GOOD {
            Self::Good
        } else if available >= HEALTH_DEGRADED {
            Self::Degraded
        } else if available >= HEALTH_CRITICAL {
            Self::Critical
        } else {
            Self::Lost
        }
    }

    #[must_use]
    pub fn needs_repair(self) -> bool {
        matches!(self, Self::Degraded | Self::Critical)
    }
}

/// Where one shard of a chunk lives (spec §3). `peer_addresses` are
/// hint-only; `peer_id` is authoritative for dispatch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardLocation {
    pub shard_index: ShardIndex,
    pub peer_id: PeerId,
    pub peer_addresses: Vec<String>,
}

/// The client-held handle for a stored chunk (spec §3): the only state
/// needed to retrieve or repair it given a surviving peer set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributedChunk {
    pub user_address: UserAddress,
    pub chunk_id: ChunkId,
    pub original_size: usize,
    pub shard_size: usize,
    pub locations: Vec<ShardLocation>,
}

impl DistributedChunk {
    /// Canonical peer-selection key (spec §4.5):
    /// `hex(SHA-256("{user_address}:{chunk_id}"))`.
    #[must_use]
    pub fn chunk_key(&self) -> String {
        chunk_key(&self.user_address, self.chunk_id)
    }
}

/// Deterministic peer-selection key for a `(user, chunk_id)` pair
/// (spec §4.5), computable without any stored metadata.
#[must_use]
pub fn chunk_key(user: &UserAddress, chunk: ChunkId) -> String {
    use sha2::{Digest, Sha256};
    let input = format!("{user}:{chunk}");
    hex::encode(Sha256::digest(input.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_address_validates_prefix_length_and_hex() {
        assert!(UserAddress::new(format!("0x{}", "1".repeat(40))).is_ok());
        assert_eq!(
            UserAddress::new("1234").unwrap_err(),
            UserAddressError::MissingPrefix
        );
        assert_eq!(
            UserAddress::new("0x1234").unwrap_err(),
            UserAddressError::WrongLength(6)
        );
        assert_eq!(
            UserAddress::new(format!("0x{}zz", "1".repeat(38))).unwrap_err(),
            UserAddressError::NotHex
        );
    }

    #[test]
    fn xor_distance_pads_shorter_operand() {
        let a = PeerId::from_bytes(vec![0xff, 0x00]);
        let d = a.xor_distance(&[0x0f]);
        assert_eq!(d, a.xor_distance(&[0x0f, 0x00]));
    }

    #[test]
    fn xor_distance_is_symmetric_and_zero_for_self() {
        let a = PeerId::from_bytes(vec![1, 2, 3]);
        let b = PeerId::from_bytes(vec![4, 5, 6]);
        assert_eq!(a.xor_distance(b.as_bytes()), b.xor_distance(a.as_bytes()));
        assert!(a.xor_distance(a.as_bytes()).0.iter().all(|b| *b == 0));
    }

    #[test]
    fn chunk_key_is_deterministic_and_user_sensitive() {
        let user_a = UserAddress::new(format!("0x{}", "1".repeat(40))).unwrap();
        let user_b = UserAddress::new(format!("0x{}", "2".repeat(40))).unwrap();
        assert_eq!(chunk_key(&user_a, ChunkId(1)), chunk_key(&user_a, ChunkId(1)));
        assert_ne!(chunk_key(&user_a, ChunkId(1)), chunk_key(&user_b, ChunkId(1)));
    }

    #[test]
    fn health_level_thresholds() {
        assert_eq!(HealthLevel::classify(15), HealthLevel::Excellent);
        assert_eq!(HealthLevel::classify(13), HealthLevel::Good);
        assert_eq!(HealthLevel::classify(11), HealthLevel::Degraded);
        assert_eq!(HealthLevel::classify(10), HealthLevel::Critical);
        assert_eq!(HealthLevel::classify(9), HealthLevel::Lost);
    }
}
