//! Top-level error enum the public API returns (spec §7): each component
//! keeps its own narrower enum; this is the one explicit `From` boundary
//! conversion point, mirroring `objectio_common::Error`'s flat shape.

use mesh_codec::CodecError;
use mesh_crypto::CryptoError;
use mesh_placement::{DeleteError, ReadError, WriteError};
use mesh_rpc::AuthError;
use mesh_shard_store::ShardStoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("input must not be empty")]
    EmptyInput,
    #[error("input of {0} bytes exceeds the {max} byte ceiling", max = mesh_common::constants::MAX_BLOB_SIZE)]
    TooLarge(usize),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Write(#[from] WriteError),
    #[error(transparent)]
    Read(#[from] ReadError),
    #[error(transparent)]
    Delete(#[from] DeleteError),
    #[error(transparent)]
    Store(#[from] ShardStoreError),
    #[error("delete authorization failed: {0}")]
    Unauthorized(#[from] AuthError),
    #[error("stored ciphertext envelope is malformed: {0}")]
    MalformedEnvelope(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    /// Whether a caller may reasonably retry the same call later (spec §7:
    /// `PeerTransport`/`StorageIO` recovery classes). Per-shard network and
    /// disk failures are already aggregated into the shard counts these
    /// variants carry, so the retry signal lives at this level rather than
    /// on a nested transport error.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Write(WriteError::StoreFailed(_))
                | Self::Read(ReadError::InsufficientShards { .. })
                | Self::Delete(DeleteError::PartialFailure { .. })
                | Self::Store(_)
        )
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Store(ShardStoreError::NotFound { .. }))
    }
}
