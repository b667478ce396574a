//! Mesh Storage Shard Store - durable local shard persistence (spec §4.2)
//!
//! Backed by `redb`, grounded on the teacher's `BlockStore`
//! (`objectio-block-gateway/src/store.rs`): one `Database` handle, a table
//! per record kind, explicit begin_write/commit around every mutation.
//! Values are bincode-encoded rather than JSON since shard payloads are raw
//! bytes, not display-friendly records.

pub mod backup;
pub mod migrations;
pub mod store;
pub mod types;

pub use store::{ShardKv, ShardStoreError};
pub use types::{SchemaMetaRow, StoreStats, StoredShardRecord};

pub type Result<T> = std::result::Result<T, ShardStoreError>;
