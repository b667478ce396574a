//! Pre-migration backup (spec §4.2/§8 scenario 6): copy the database file
//! aside before any migration touches it, so a failed or regretted
//! migration can be rolled back by hand.

use chrono::{TimeZone, Utc};
use std::path::{Path, PathBuf};

use crate::store::ShardStoreError;

/// Copy `db_path` to `{db_path}.backup_{YYYYMMDD_HHMMSS}`. `now_unix` is
/// passed in rather than read from the clock so callers control the stamp
/// deterministically in tests.
pub fn backup_before_migration(db_path: &Path, now_unix: i64) -> Result<PathBuf, ShardStoreError> {
    let file_name = db_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ShardStoreError::Backup("database path has no file name".into()))?;
    let stamp = Utc
        .timestamp_opt(now_unix, 0)
        .single()
        .ok_or_else(|| ShardStoreError::Backup(format!("invalid backup timestamp {now_unix}")))?
        .format("%Y%m%d_%H%M%S");
    let backup_path = db_path.with_file_name(format!("{file_name}.backup_{stamp}"));
    std::fs::copy(db_path, &backup_path)
        .map_err(|e| ShardStoreError::Backup(format!("failed to copy database for backup: {e}")))?;
    Ok(backup_path)
}
