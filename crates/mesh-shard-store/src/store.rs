//! Redb-backed local shard store.
//!
//! Grounded on the teacher's `objectio-block-gateway::store::BlockStore`:
//! a single `Database` handle, one table per record kind, explicit
//! begin_write/commit around every mutation, and prefix-range scans for
//! per-owner queries instead of a secondary index.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use redb::{Database, ReadableTable, TableDefinition};
use thiserror::Error;
use tracing::{info, warn};

use crate::migrations::{self, CURRENT_SCHEMA_VERSION};
use crate::types::{parse_shard_key, SchemaMetaRow, StoreStats, StoredShardRecord};
use crate::{backup, Result};

const SHARDS: TableDefinition<&str, &[u8]> = TableDefinition::new("shards");
const SCHEMA_META: TableDefinition<&str, &[u8]> = TableDefinition::new("schema_meta");

const SCHEMA_META_KEY: &str = "current";

#[derive(Debug, Error)]
pub enum ShardStoreError {
    #[error("shard store backend error: {0}")]
    Backend(String),
    #[error("shard not found: {shard_key} index {shard_index}")]
    NotFound { shard_key: String, shard_index: u8 },
    #[error("refusing to open database with newer schema version {found}, this binary supports up to {supported}")]
    SchemaTooNew { found: u32, supported: u32 },
    #[error("rejecting empty shard payload for {shard_key} index {shard_index}")]
    EmptyPayload { shard_key: String, shard_index: u8 },
    #[error("backup failed: {0}")]
    Backup(String),
}

macro_rules! backend_err {
    ($($t:ty),+ $(,)?) => {
        $(
            impl From<$t> for ShardStoreError {
                fn from(e: $t) -> Self {
                    ShardStoreError::Backend(e.to_string())
                }
            }
        )+
    };
}

backend_err!(
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
    std::io::Error
);

/// Durable local shard store (spec C2 / §4.2).
pub struct ShardKv {
    db: Arc<Database>,
}

impl ShardKv {
    /// Open (creating if absent) the store at `path`, applying any pending
    /// schema migrations after backing the file up first (spec §8 scenario 6).
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let existed = path.exists();
        let db = Database::create(path)?;

        {
            let wtx = db.begin_write()?;
            wtx.open_table(SHARDS)?;
            wtx.open_table(SCHEMA_META)?;
            wtx.commit()?;
        }

        let stored_version = Self::read_schema_version(&db)?;

        if let Some(found) = stored_version {
            if found > CURRENT_SCHEMA_VERSION {
                return Err(ShardStoreError::SchemaTooNew {
                    found,
                    supported: CURRENT_SCHEMA_VERSION,
                });
            }
            if found < CURRENT_SCHEMA_VERSION {
                info!(from = found, to = CURRENT_SCHEMA_VERSION, "migrating shard store schema");
                if existed {
                    let backup_path = backup::backup_before_migration(path, Utc::now().timestamp())?;
                    info!(path = %backup_path.display(), "wrote pre-migration backup");
                }
                Self::run_migrations(&db, found)?;
            }
        } else {
            // No metadata row at all: either a brand-new database, or a
            // legacy (pre-versioning) one. A brand-new SHARDS table is
            // empty; a legacy one may already hold records.
            let is_legacy = {
                let rtx = db.begin_read()?;
                let table = rtx.open_table(SHARDS)?;
                table.iter()?.next().is_some()
            };
            if is_legacy && existed {
                let backup_path = backup::backup_before_migration(path, Utc::now().timestamp())?;
                info!(path = %backup_path.display(), "wrote pre-migration backup for legacy (unversioned) store");
            }
            Self::run_migrations(&db, 0)?;
        }

        Self::write_schema_version(&db, CURRENT_SCHEMA_VERSION)?;

        Ok(Self { db: Arc::new(db) })
    }

    fn read_schema_version(db: &Database) -> Result<Option<u32>> {
        let rtx = db.begin_read()?;
        let table = rtx.open_table(SCHEMA_META)?;
        match table.get(SCHEMA_META_KEY)? {
            Some(bytes) => {
                let row: SchemaMetaRow = bincode::deserialize(bytes.value())
                    .map_err(|e| ShardStoreError::Backend(e.to_string()))?;
                Ok(Some(row.version))
            }
            None => Ok(None),
        }
    }

    fn write_schema_version(db: &Database, version: u32) -> Result<()> {
        let row = SchemaMetaRow {
            version,
            applied_at: Utc::now().timestamp(),
            comment: format!("schema v{version}"),
        };
        let bytes = bincode::serialize(&row).map_err(|e| ShardStoreError::Backend(e.to_string()))?;
        let wtx = db.begin_write()?;
        wtx.open_table(SCHEMA_META)?.insert(SCHEMA_META_KEY, bytes.as_slice())?;
        wtx.commit()?;
        Ok(())
    }

    fn run_migrations(db: &Database, from_version: u32) -> Result<()> {
        for (version, migrate) in migrations::pending(from_version) {
            let wtx = db.begin_write()?;
            migrate(&wtx)?;
            wtx.commit()?;
            info!(version, "applied shard store migration");
        }
        Ok(())
    }

    /// Persist `record`, keyed by its own `shard_key` (which already embeds
    /// the shard index, spec §3). Rejects empty payloads (spec §4.2).
    pub fn put(&self, record: &StoredShardRecord) -> Result<()> {
        if record.bytes.is_empty() {
            return Err(ShardStoreError::EmptyPayload {
                shard_key: record.shard_key.clone(),
                shard_index: record.shard_index,
            });
        }
        let bytes = bincode::serialize(record).map_err(|e| ShardStoreError::Backend(e.to_string()))?;
        let wtx = self.db.begin_write()?;
        wtx.open_table(SHARDS)?.insert(record.shard_key.as_str(), bytes.as_slice())?;
        wtx.commit()?;
        Ok(())
    }

    /// Fetch a shard by its key. `shard_index` is used only to build a
    /// precise `NotFound` error; the lookup itself is by `shard_key` since
    /// the key already embeds the index.
    pub fn get(&self, shard_key: &str, shard_index: u8) -> Result<StoredShardRecord> {
        let rtx = self.db.begin_read()?;
        let table = rtx.open_table(SHARDS)?;
        match table.get(shard_key)? {
            Some(bytes) => bincode::deserialize(bytes.value())
                .map_err(|e| ShardStoreError::Backend(e.to_string())),
            None => Err(ShardStoreError::NotFound {
                shard_key: shard_key.to_string(),
                shard_index,
            }),
        }
    }

    /// Delete a shard. Idempotent: deleting an absent key is not an error.
    pub fn delete(&self, shard_key: &str) -> Result<()> {
        let wtx = self.db.begin_write()?;
        wtx.open_table(SHARDS)?.remove(shard_key)?;
        wtx.commit()?;
        Ok(())
    }

    /// All shards stored locally.
    pub fn list_all(&self) -> Result<Vec<StoredShardRecord>> {
        let rtx = self.db.begin_read()?;
        let table = rtx.open_table(SHARDS)?;
        let mut out = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            out.push(
                bincode::deserialize(value.value())
                    .map_err(|e| ShardStoreError::Backend(e.to_string()))?,
            );
        }
        Ok(out)
    }

    /// Shards belonging to `user`, via a prefix scan over `shard_key`
    /// (which starts with `"{user}_"`), same idiom as the teacher's
    /// `delete_volume_chunks` prefix scan.
    pub fn list_by_user(&self, user: &str) -> Result<Vec<StoredShardRecord>> {
        let prefix = format!("{user}_");
        let rtx = self.db.begin_read()?;
        let table = rtx.open_table(SHARDS)?;
        let mut out = Vec::new();
        for entry in table.range(prefix.as_str()..)? {
            let (key, value) = entry?;
            if !key.value().starts_with(prefix.as_str()) {
                break;
            }
            out.push(
                bincode::deserialize(value.value())
                    .map_err(|e| ShardStoreError::Backend(e.to_string()))?,
            );
        }
        Ok(out)
    }

    /// Aggregate statistics (spec §4.2).
    pub fn stats(&self) -> Result<StoreStats> {
        let records = self.list_all()?;
        let mut users = std::collections::HashSet::new();
        let mut total_bytes = 0u64;
        let mut chunks = std::collections::HashSet::new();
        for r in &records {
            if let Some((user, chunk)) = parse_shard_key(&r.shard_key) {
                users.insert(user.to_string());
                chunks.insert(chunk.to_string());
            }
            total_bytes += r.size;
        }
        Ok(StoreStats {
            chunk_count: chunks.len(),
            unique_user_count: users.len(),
            total_bytes,
        })
    }

    /// Delete every shard stored before `cutoff_unix` (spec §4.2 GC).
    /// Returns the number of records removed.
    pub fn gc_older_than(&self, cutoff_unix: i64) -> Result<usize> {
        let stale: Vec<String> = self
            .list_all()?
            .into_iter()
            .filter(|r| r.stored_at < cutoff_unix)
            .map(|r| r.shard_key)
            .collect();
        let wtx = self.db.begin_write()?;
        {
            let mut table = wtx.open_table(SHARDS)?;
            for key in &stale {
                table.remove(key.as_str())?;
            }
        }
        wtx.commit()?;
        if !stale.is_empty() {
            warn!(removed = stale.len(), "garbage collected stale shards");
        }
        Ok(stale.len())
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(user: &str, chunk: &str, index: u8, bytes: Vec<u8>) -> StoredShardRecord {
        StoredShardRecord {
            shard_key: format!("{user}_{chunk}_shard_{index}"),
            shard_index: index,
            size: bytes.len() as u64,
            bytes,
            stored_at: 1_700_000_000,
        }
    }

    #[test]
    fn put_get_round_trip() {
        let dir = tempdir().unwrap();
        let store = ShardKv::open(dir.path().join("shards.redb")).unwrap();
        let rec = record("0xabc", "7", 2, b"shard payload".to_vec());
        store.put(&rec).unwrap();

        let got = store.get(&rec.shard_key, 2).unwrap();
        assert_eq!(got.bytes, b"shard payload");
    }

    #[test]
    fn get_missing_is_not_found() {
        let dir = tempdir().unwrap();
        let store = ShardKv::open(dir.path().join("shards.redb")).unwrap();
        let err = store.get("0xabc_7_shard_0", 0).unwrap_err();
        assert!(matches!(err, ShardStoreError::NotFound { .. }));
    }

    #[test]
    fn empty_payload_rejected() {
        let dir = tempdir().unwrap();
        let store = ShardKv::open(dir.path().join("shards.redb")).unwrap();
        let rec = record("0xabc", "7", 0, Vec::new());
        let err = store.put(&rec).unwrap_err();
        assert!(matches!(err, ShardStoreError::EmptyPayload { .. }));
    }

    #[test]
    fn delete_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = ShardKv::open(dir.path().join("shards.redb")).unwrap();
        let rec = record("0xabc", "7", 0, b"x".to_vec());
        store.put(&rec).unwrap();
        store.delete(&rec.shard_key).unwrap();
        store.delete(&rec.shard_key).unwrap();
        assert!(store.get(&rec.shard_key, 0).is_err());
    }

    #[test]
    fn list_by_user_excludes_other_users() {
        let dir = tempdir().unwrap();
        let store = ShardKv::open(dir.path().join("shards.redb")).unwrap();
        store.put(&record("0xaaa", "1", 0, b"a".to_vec())).unwrap();
        store.put(&record("0xaaa", "1", 1, b"b".to_vec())).unwrap();
        store.put(&record("0xbbb", "2", 0, b"c".to_vec())).unwrap();

        let mine = store.list_by_user("0xaaa").unwrap();
        assert_eq!(mine.len(), 2);
        assert!(mine.iter().all(|r| r.shard_key.starts_with("0xaaa_")));
    }

    #[test]
    fn stats_reflect_distinct_users_and_chunks() {
        let dir = tempdir().unwrap();
        let store = ShardKv::open(dir.path().join("shards.redb")).unwrap();
        store.put(&record("0xaaa", "1", 0, vec![0; 10])).unwrap();
        store.put(&record("0xaaa", "1", 1, vec![0; 10])).unwrap();
        store.put(&record("0xbbb", "2", 0, vec![0; 5])).unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.chunk_count, 2);
        assert_eq!(stats.unique_user_count, 2);
        assert_eq!(stats.total_bytes, 25);
    }

    #[test]
    fn gc_removes_only_stale_records() {
        let dir = tempdir().unwrap();
        let store = ShardKv::open(dir.path().join("shards.redb")).unwrap();
        let mut old = record("0xaaa", "1", 0, b"old".to_vec());
        old.stored_at = 1_000;
        let mut fresh = record("0xaaa", "2", 0, b"fresh".to_vec());
        fresh.stored_at = 2_000_000_000;
        store.put(&old).unwrap();
        store.put(&fresh).unwrap();

        let removed = store.gc_older_than(1_000_000_000).unwrap();
        assert_eq!(removed, 1);
        assert!(store.get(&fresh.shard_key, 0).is_ok());
        assert!(store.get(&old.shard_key, 0).is_err());
    }

    #[test]
    fn reopening_existing_database_preserves_data() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("shards.redb");
        {
            let store = ShardKv::open(&db_path).unwrap();
            store.put(&record("0xaaa", "1", 0, b"persisted".to_vec())).unwrap();
        }
        {
            let store = ShardKv::open(&db_path).unwrap();
            let got = store.get("0xaaa_1_shard_0", 0).unwrap();
            assert_eq!(got.bytes, b"persisted");
        }
    }

    #[test]
    fn refuses_to_open_newer_schema() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("shards.redb");
        {
            let db = Database::create(&db_path).unwrap();
            let wtx = db.begin_write().unwrap();
            wtx.open_table(SHARDS).unwrap();
            wtx.open_table(SCHEMA_META).unwrap();
            wtx.commit().unwrap();
            ShardKv::write_schema_version(&db, CURRENT_SCHEMA_VERSION + 1).unwrap();
        }
        let err = ShardKv::open(&db_path).unwrap_err();
        assert!(matches!(err, ShardStoreError::SchemaTooNew { .. }));
    }
}
