//! Schema migration registry (spec §4.2, §8 scenario 6).
//!
//! Each migration is a plain function applied to an open write transaction,
//! numbered by the schema version it produces. Applied in ascending order
//! starting just above the database's current version.

use redb::WriteTransaction;

use crate::store::ShardStoreError;

pub const CURRENT_SCHEMA_VERSION: u32 = 1;

type Migration = fn(&WriteTransaction) -> Result<(), ShardStoreError>;

/// `(version, migration fn producing that version)`, ascending.
pub const MIGRATIONS: &[(u32, Migration)] = &[(1, migrate_to_v1)];

/// v0 (no `SCHEMA_META` table, implicit legacy version) to v1: no structural
/// change, the `SHARDS` table layout has not changed since the original
/// unversioned release. Exists so the migration path is exercised and so a
/// later v2 has a real predecessor to chain from.
fn migrate_to_v1(_txn: &WriteTransaction) -> Result<(), ShardStoreError> {
    Ok(())
}

/// Migrations strictly after `from_version` up to and including
/// [`CURRENT_SCHEMA_VERSION`], in ascending order.
pub fn pending(from_version: u32) -> impl Iterator<Item = &'static (u32, Migration)> {
    MIGRATIONS.iter().filter(move |(v, _)| *v > from_version)
}
