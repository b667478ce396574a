//! Stored record shapes, bincode-encoded into redb the way
//! `objectio_meta_store::types` encodes its stored types.

use serde::{Deserialize, Serialize};

/// A persisted shard, keyed by `(shard_key, shard_index)` (spec §3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoredShardRecord {
    pub shard_key: String,
    pub shard_index: u8,
    pub bytes: Vec<u8>,
    /// Unix timestamp (seconds) of the write.
    pub stored_at: i64,
    pub size: u64,
}

/// Aggregate statistics over the local store (spec §4.2).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub chunk_count: usize,
    pub unique_user_count: usize,
    pub total_bytes: u64,
}

/// One row of the schema metadata table.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SchemaMetaRow {
    pub version: u32,
    pub applied_at: i64,
    pub comment: String,
}

/// Split a canonical shard key `"{user}_{chunk_id}_shard_{index}"` back into
/// `(user, chunk_id)`. Relies on wallet addresses containing no underscore
/// (validated hex body) so the rightmost remaining `_` before the
/// `_shard_` sentinel always separates user from chunk id.
#[must_use]
pub fn parse_shard_key(shard_key: &str) -> Option<(&str, &str)> {
    let (prefix, _index) = shard_key.split_once("_shard_")?;
    prefix.rsplit_once('_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_canonical_shard_key() {
        let key = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa_42_shard_3";
        let (user, chunk) = parse_shard_key(key).unwrap();
        assert_eq!(user, "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");
        assert_eq!(chunk, "42");
    }
}
