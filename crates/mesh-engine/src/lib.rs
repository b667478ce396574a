//! Public storage API for ZenTalk mesh storage (spec C9): composes
//! `mesh-codec`, `mesh-crypto`, `mesh-shard-store`, `mesh-rpc`,
//! `mesh-placement`, `mesh-repair`, and `mesh-supervisor` into the five
//! operations a caller actually needs — `store_chunk`, `retrieve_chunk`,
//! `delete_chunk`, `chunk_status`, `chunk_health`.

pub mod engine;
pub mod error;
pub mod handler;

pub use engine::DistributedStorage;
pub use error::{EngineError, Result};
pub use handler::LocalPeerHandler;
