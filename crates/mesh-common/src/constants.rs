//! Frozen version/health/KDF constants (spec §6).

/// Data shards.
pub const K: usize = 10;
/// Parity shards.
pub const M: usize = 5;
/// Total shards.
pub const N: usize = K + M;

/// All shards present.
pub const HEALTH_EXCELLENT: usize = 15;
/// Healthy, no repair needed.
pub const HEALTH_GOOD: usize = 13;
/// Repair should be triggered.
pub const HEALTH_DEGRADED: usize = 11;
/// Repair should be triggered urgently; one shard above the recovery floor.
pub const HEALTH_CRITICAL: usize = 10;
/// Minimum shards for reconstruction; equal to `K`.
pub const MIN_SHARDS_FOR_RECOVERY: usize = K;

/// PBKDF2 iteration count, frozen for v1.x.
pub const KDF_ITERATIONS: u32 = 100_000;
/// KDF output length in bytes (AES-256 key).
pub const KDF_OUTPUT_LEN: usize = 32;
/// Fixed application salt for the password-based KDF.
pub const KDF_SALT: &[u8] = b"ZenTalk-Mesh-Storage-v1";

/// API-level input size ceiling (spec §4.9).
pub const MAX_BLOB_SIZE: usize = 100 * 1024 * 1024;

/// Maximum clock skew tolerated on a signed deletion timestamp (spec §4.4).
pub const DELETE_SIGNATURE_MAX_SKEW_SECS: i64 = 5 * 60;

/// Default protocol version (used when a peer sends an empty/absent version).
pub const DEFAULT_PROTOCOL_VERSION: &str = "1.0.0";
