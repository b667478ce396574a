//! Mesh Storage Codec - systematic k-of-n Reed-Solomon erasure coding
//!
//! Fixed at k=10 data shards, m=5 parity shards, n=15 total (spec §4.1).
//! Systematic coding means the first k shards of an undamaged encoding are
//! literal contiguous slices of the padded input.

pub mod codec;
pub mod shard;

pub use codec::{CodecError, EncodedChunk, ErasureCodec, Result};
pub use shard::Shard;
