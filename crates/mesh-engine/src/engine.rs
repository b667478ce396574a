//! `DistributedStorage`: the public storage API (spec C9 §4.9).
//!
//! Composition root grounded on `objectio-s3`'s `AppState`, which holds an
//! `OsdPool` + `ScatterGatherEngine` + metrics for the gateway binary to
//! share across handlers; this struct plays the same role for the mesh
//! engine's five public operations, minus the HTTP-specific members
//! (axum/tower are out of scope, spec §1).

use std::sync::Arc;

use dashmap::DashMap;
use ed25519_dalek::SigningKey;
use mesh_codec::ErasureCodec;
use mesh_common::constants::{MAX_BLOB_SIZE, N};
use mesh_common::types::{ChunkId, DistributedChunk, PeerId, ShardAvailability, UserAddress};
use mesh_crypto::{decrypt, derive_key, encrypt, EncryptedBlob, KeyMode};
use mesh_placement::procedures::{self, DeleteToken};
use mesh_rpc::{verify_chunk_delete, PeerTransport, RequestBody, RpcMessage};
use mesh_supervisor::Supervisor;
use parking_lot::RwLock;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::{EngineError, Result};

type ChunkLockKey = (String, u64);

/// Composes the shard store, RPC transport, codec, crypto, placement, and a
/// background Supervisor into the five operations spec §4.9 names.
pub struct DistributedStorage {
    local_store: Arc<mesh_shard_store::ShardKv>,
    transport: Arc<dyn PeerTransport>,
    codec: ErasureCodec,
    self_id: PeerId,
    connected_peers: Arc<RwLock<Vec<PeerId>>>,
    operator_key: SigningKey,
    operator_public_key_pem: String,
    allow_unsigned_delete: bool,
    supervisor: Arc<Supervisor>,
    chunk_locks: DashMap<ChunkLockKey, Arc<AsyncMutex<()>>>,
}

impl DistributedStorage {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        local_store: Arc<mesh_shard_store::ShardKv>,
        transport: Arc<dyn PeerTransport>,
        self_id: PeerId,
        connected_peers: Arc<RwLock<Vec<PeerId>>>,
        operator_key: SigningKey,
        operator_public_key_pem: String,
        allow_unsigned_delete: bool,
        supervisor_config: mesh_supervisor::SupervisorConfig,
    ) -> Self {
        let supervisor = Arc::new(Supervisor::new(
            local_store.clone(),
            transport.clone(),
            self_id.clone(),
            connected_peers.clone(),
            supervisor_config,
        ));
        Self {
            local_store,
            transport,
            codec: ErasureCodec::new(),
            self_id,
            connected_peers,
            operator_key,
            operator_public_key_pem,
            allow_unsigned_delete,
            supervisor,
            chunk_locks: DashMap::new(),
        }
    }

    #[must_use]
    pub fn supervisor(&self) -> Arc<Supervisor> {
        self.supervisor.clone()
    }

    /// Runs the background health scan until `cancel` fires (spec §4.7).
    pub async fn run_supervisor(&self, cancel: CancellationToken) {
        self.supervisor.run(cancel).await;
    }

    fn chunk_lock(&self, user: &UserAddress, chunk_id: ChunkId) -> Arc<AsyncMutex<()>> {
        self.chunk_locks
            .entry((user.as_str().to_string(), chunk_id.0))
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Encrypt, erasure-encode, and disperse `bytes` (spec §4.9). Per-chunk
    /// writes are serialized by an advisory lock keyed on `(user, chunk_id)`
    /// (spec §5) so concurrent stores of the same chunk id linearize.
    pub async fn store_chunk(
        &self,
        user: &UserAddress,
        chunk_id: ChunkId,
        bytes: &[u8],
        key_mode: &KeyMode,
    ) -> Result<DistributedChunk> {
        if bytes.is_empty() {
            return Err(EngineError::EmptyInput);
        }
        if bytes.len() > MAX_BLOB_SIZE {
            return Err(EngineError::TooLarge(bytes.len()));
        }

        let lock = self.chunk_lock(user, chunk_id);
        let _guard = lock.lock().await;

        let key = derive_key(key_mode)?;
        let blob = encrypt(bytes, &key);
        let envelope = bincode::serialize(&blob).map_err(|e| EngineError::MalformedEnvelope(e.to_string()))?;

        let connected = self.connected_peers.read().clone();
        let chunk = procedures::write_chunk(
            &self.codec,
            &self.local_store,
            self.transport.as_ref(),
            &self.self_id,
            &connected,
            user,
            chunk_id,
            &envelope,
        )
        .await?;

        self.supervisor.register(chunk.clone());
        Ok(chunk)
    }

    /// Fetch and reconstruct `chunk`, then decrypt under `key_mode`
    /// (spec §4.9).
    pub async fn retrieve_chunk(&self, chunk: &DistributedChunk, key_mode: &KeyMode) -> Result<Vec<u8>> {
        let envelope = procedures::read_chunk(&self.codec, &self.local_store, self.transport.as_ref(), &self.self_id, chunk).await?;
        let blob: EncryptedBlob =
            bincode::deserialize(&envelope).map_err(|e| EngineError::MalformedEnvelope(e.to_string()))?;
        let key = derive_key(key_mode)?;
        Ok(decrypt(&blob, &key)?)
    }

    /// Authenticated delete (spec §4.9/§4.4): the caller's `timestamp` and
    /// `signature_b64`/`public_key_pem` authorize the whole chunk, checked
    /// once against the chunk-level canonical form before any per-shard
    /// `delete_shard` is dispatched. This node's own operator keypair then
    /// signs each shard's own canonical message — a chunk-level signature
    /// cannot cover a per-shard RPC contract that embeds `shard_index`
    /// (spec §6).
    pub async fn delete_chunk(
        &self,
        chunk: &DistributedChunk,
        timestamp_rfc3339: &str,
        signature_b64: &str,
        public_key_pem: &str,
    ) -> Result<()> {
        verify_chunk_delete(
            chunk.user_address.as_str(),
            chunk.chunk_id.0,
            timestamp_rfc3339,
            signature_b64,
            public_key_pem,
            chrono::Utc::now(),
            self.allow_unsigned_delete,
        )?;

        let token = DeleteToken {
            timestamp_rfc3339: timestamp_rfc3339.to_string(),
            operator_key: Some(self.operator_key.clone()),
            operator_public_key_pem: self.operator_public_key_pem.clone(),
        };
        procedures::delete_chunk(&self.local_store, self.transport.as_ref(), &self.self_id, chunk, &token).await?;
        self.supervisor.unregister(&chunk.user_address, chunk.chunk_id);
        info!(user = %chunk.user_address, chunk_id = chunk.chunk_id.0, "chunk deleted");
        Ok(())
    }

    /// Per-shard availability snapshot (spec §4.9): probes every location
    /// concurrently, same fan-out idiom as the Supervisor's health scan.
    pub async fn chunk_status(&self, chunk: &DistributedChunk) -> ShardAvailability {
        let tasks = chunk.locations.iter().map(|loc| {
            let index = loc.shard_index;
            let peer = loc.peer_id.clone();
            async move {
                let ok = if peer == self.self_id {
                    let Ok(key) = mesh_common::types::shard_key(&chunk.user_address, chunk.chunk_id, index) else {
                        return (index, false);
                    };
                    self.local_store.get(&key, index).is_ok()
                } else {
                    let msg = RpcMessage {
                        version: mesh_common::constants::DEFAULT_PROTOCOL_VERSION.to_string(),
                        id: format!("status:{}:{}:{}", chunk.user_address, chunk.chunk_id, index),
                        body: RequestBody::GetShard {
                            user_address: chunk.user_address.as_str().to_string(),
                            chunk_id: chunk.chunk_id.0,
                            shard_index: index,
                        },
                    };
                    self.transport.send(&peer, msg).await.map(|r| r.success).unwrap_or(false)
                };
                (index, ok)
            }
        });

        let mut availability = vec![false; N];
        for (index, ok) in futures::future::join_all(tasks).await {
            if let Some(slot) = availability.get_mut(index as usize) {
                *slot = ok;
            }
        }
        ShardAvailability(availability)
    }

    /// `available / n` (spec §4.9).
    pub async fn chunk_health(&self, chunk: &DistributedChunk) -> f64 {
        let status = self.chunk_status(chunk).await;
        status.available_count() as f64 / N as f64
    }
}
