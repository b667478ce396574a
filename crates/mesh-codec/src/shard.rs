//! Shard — one equal-length byte block produced by erasure coding.

use bytes::Bytes;

/// One of `n` equal-length byte blocks produced by `ErasureCodec::encode`.
///
/// Indices `[0, k)` are data shards (literal contiguous slices of the
/// padded input under systematic coding); indices `[k, n)` are parity
/// shards.
#[derive(Clone, PartialEq, Eq)]
pub struct Shard(Bytes);

impl Shard {
    #[must_use]
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self(Bytes::from(bytes))
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl std::fmt::Debug for Shard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Shard({} bytes)", self.0.len())
    }
}

impl From<Vec<u8>> for Shard {
    fn from(bytes: Vec<u8>) -> Self {
        Self::from_vec(bytes)
    }
}
