//! Mesh Storage Placement - peer ranking and the write/read/delete
//! procedures that dispatch shards across the ranked peer set (spec C5).

pub mod procedures;
pub mod ranking;

pub use procedures::{rank_for_chunk, DeleteError, DeleteToken, PlacementError, ReadError, WriteError};
pub use ranking::rank_peers;
