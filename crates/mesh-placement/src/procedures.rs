//! Write / read / delete procedures (spec §4.5).
//!
//! Each procedure fans shard operations out across the ranked peer list in
//! parallel with `futures::future::join_all` (teacher dependency `futures`,
//! same idiom the repair engine reuses) and reduces the collected results,
//! per the §9 design note "concurrent fan-out with result aggregation".

use ed25519_dalek::SigningKey;
use futures::future::join_all;
use mesh_codec::{CodecError, EncodedChunk, ErasureCodec, Shard};
use mesh_common::constants::{K, M, N};
use mesh_common::types::{chunk_key, shard_key, ChunkId, DistributedChunk, PeerId, ShardLocation, UserAddress};
use mesh_common::ShardKeyError;
use mesh_rpc::{canonical_delete_message, sign_delete_message, PeerTransport, RequestBody, RpcMessage, TransportError};
use mesh_shard_store::{ShardKv, ShardStoreError, StoredShardRecord};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::warn;

use crate::ranking::rank_peers;

#[derive(Debug, Error)]
pub enum PlacementError {
    #[error(transparent)]
    Write(#[from] WriteError),
    #[error(transparent)]
    Read(#[from] ReadError),
    #[error(transparent)]
    Delete(#[from] DeleteError),
}

#[derive(Debug, Error)]
pub enum WriteError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("invalid shard key: {0}")]
    ShardKey(#[from] ShardKeyError),
    #[error("store failed: {0} of {n} shards could not be written", n = N)]
    StoreFailed(usize),
}

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("insufficient shards: have {got}, need {need}")]
    InsufficientShards { got: usize, need: usize },
    #[error(transparent)]
    Codec(#[from] CodecError),
}

#[derive(Debug, Error)]
pub enum DeleteError {
    #[error("invalid shard key: {0}")]
    ShardKey(#[from] ShardKeyError),
    #[error("only {successes} of {required} required deletions succeeded")]
    PartialFailure { successes: usize, required: usize },
}

/// Authorization for a `delete_chunk` call, verified once at the chunk level
/// against `mesh_rpc::canonical_chunk_delete_message` by the caller (e.g.
/// `mesh-engine`) before this function runs. Since the per-shard RPC
/// signature embeds `shard_index` (spec §6), one chunk-level signature
/// cannot cover every shard directly; `operator_key` is this node's own
/// Ed25519 keypair, used to sign each `delete_shard` message individually
/// once that chunk-level authorization has been confirmed. `operator_key`
/// of `None` falls back to the `allow_unsigned` escape hatch on the
/// receiving end (spec §9 open question 3) and should only be used in tests.
#[derive(Clone)]
pub struct DeleteToken {
    pub timestamp_rfc3339: String,
    pub operator_key: Option<SigningKey>,
    pub operator_public_key_pem: String,
}

impl std::fmt::Debug for DeleteToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeleteToken")
            .field("timestamp_rfc3339", &self.timestamp_rfc3339)
            .field("signed", &self.operator_key.is_some())
            .finish()
    }
}

/// Where one shard operation should go: the local store, or an RPC peer.
enum Destination {
    Local,
    Remote(PeerId),
}

fn distance_key_for(user: &UserAddress, chunk: ChunkId) -> Vec<u8> {
    Sha256::digest(chunk_key(user, chunk).as_bytes()).to_vec()
}

/// Recompute the deterministic `n`-slot peer ranking for `(user, chunk)`
/// (spec §4.5/§4.6: both placement and repair derive it the same way from
/// `chunk_key` alone, with no stored ranking state).
#[must_use]
pub fn rank_for_chunk(user: &UserAddress, chunk: ChunkId, connected_peers: &[PeerId], self_id: &PeerId) -> Vec<PeerId> {
    rank_peers(&distance_key_for(user, chunk), connected_peers, self_id, N)
}

fn destination_for(peer: &PeerId, self_id: &PeerId) -> Destination {
    if peer == self_id {
        Destination::Local
    } else {
        Destination::Remote(peer.clone())
    }
}

/// Encode `data`, rank peers, and dispatch all `n` shard writes in parallel
/// (spec §4.5 Write). Failures beyond `m` abort the whole write; up to `m`
/// failures still succeed (erasure redundancy absorbs them).
pub async fn write_chunk(
    codec: &ErasureCodec,
    local_store: &ShardKv,
    transport: &dyn PeerTransport,
    self_id: &PeerId,
    connected_peers: &[PeerId],
    user: &UserAddress,
    chunk_id: ChunkId,
    data: &[u8],
) -> Result<DistributedChunk, WriteError> {
    let encoded = codec.encode(data)?;
    let ranked = rank_for_chunk(user, chunk_id, connected_peers, self_id);

    let tasks = ranked.iter().enumerate().map(|(i, peer)| {
        let dest = destination_for(peer, self_id);
        let shard = encoded.get(i).expect("encode fills every slot").clone();
        async move {
            let key = shard_key(user, chunk_id, i as u8)?;
            let ok = match dest {
                Destination::Local => write_local(local_store, &key, i as u8, shard).is_ok(),
                Destination::Remote(ref peer_id) => write_remote(transport, peer_id, user, chunk_id, i as u8, shard).await.is_ok(),
            };
            Ok::<bool, ShardKeyError>(ok)
        }
    });
    let results: Vec<bool> = join_all(tasks)
        .await
        .into_iter()
        .collect::<Result<Vec<bool>, ShardKeyError>>()?;

    let failures = results.iter().filter(|ok| !**ok).count();
    if failures > M {
        return Err(WriteError::StoreFailed(failures));
    }
    if failures > 0 {
        warn!(failures, "chunk write tolerated shard failures within redundancy budget");
    }

    let locations = ranked
        .into_iter()
        .enumerate()
        .map(|(i, peer_id)| ShardLocation {
            shard_index: i as u8,
            peer_id,
            peer_addresses: Vec::new(),
        })
        .collect();

    Ok(DistributedChunk {
        user_address: user.clone(),
        chunk_id,
        original_size: data.len(),
        shard_size: encoded.shard_size(),
        locations,
    })
}

fn write_local(store: &ShardKv, key: &str, index: u8, shard: Shard) -> Result<(), ShardStoreError> {
    store.put(&StoredShardRecord {
        shard_key: key.to_string(),
        shard_index: index,
        size: shard.len() as u64,
        bytes: shard.into_bytes().to_vec(),
        stored_at: now_unix(),
    })
}

async fn write_remote(
    transport: &dyn PeerTransport,
    peer: &PeerId,
    user: &UserAddress,
    chunk_id: ChunkId,
    index: u8,
    shard: Shard,
) -> Result<(), TransportError> {
    let msg = RpcMessage {
        version: mesh_common::constants::DEFAULT_PROTOCOL_VERSION.to_string(),
        id: format!("store_shard:{user}:{chunk_id}:{index}"),
        body: RequestBody::StoreShard {
            user_address: user.as_str().to_string(),
            chunk_id: chunk_id.0,
            shard_index: index,
            bytes: shard.into_bytes().to_vec(),
        },
    };
    let resp = transport.send(peer, msg).await?;
    if resp.success {
        Ok(())
    } else {
        Err(TransportError::StreamClosed)
    }
}

/// Fetch every location in parallel, leaving failures as missing slots
/// (spec §4.5 Read: partial failures do not abort the read).
pub async fn read_chunk(
    codec: &ErasureCodec,
    local_store: &ShardKv,
    transport: &dyn PeerTransport,
    self_id: &PeerId,
    chunk: &DistributedChunk,
) -> Result<Vec<u8>, ReadError> {
    let mut encoded = EncodedChunk::all_missing(chunk.shard_size, chunk.original_size);

    let tasks = chunk.locations.iter().map(|loc| {
        let dest = destination_for(&loc.peer_id, self_id);
        let index = loc.shard_index;
        async move {
            let bytes = match dest {
                Destination::Local => read_local(local_store, &chunk.user_address, chunk.chunk_id, index),
                Destination::Remote(peer_id) => {
                    read_remote(transport, &peer_id, &chunk.user_address, chunk.chunk_id, index).await
                }
            };
            (index, bytes)
        }
    });

    for (index, bytes) in join_all(tasks).await {
        if let Some(bytes) = bytes {
            encoded.set(index as usize, Shard::from_vec(bytes));
        }
    }

    let got = encoded.available_count();
    if got < K {
        return Err(ReadError::InsufficientShards { got, need: K });
    }

    Ok(codec.decode(&mut encoded)?)
}

fn read_local(store: &ShardKv, user: &UserAddress, chunk_id: ChunkId, index: u8) -> Option<Vec<u8>> {
    let key = shard_key(user, chunk_id, index).ok()?;
    store.get(&key, index).ok().map(|r| r.bytes)
}

async fn read_remote(
    transport: &dyn PeerTransport,
    peer: &PeerId,
    user: &UserAddress,
    chunk_id: ChunkId,
    index: u8,
) -> Option<Vec<u8>> {
    let msg = RpcMessage {
        version: mesh_common::constants::DEFAULT_PROTOCOL_VERSION.to_string(),
        id: format!("get_shard:{user}:{chunk_id}:{index}"),
        body: RequestBody::GetShard {
            user_address: user.as_str().to_string(),
            chunk_id: chunk_id.0,
            shard_index: index,
        },
    };
    let resp = transport.send(peer, msg).await.ok()?;
    if resp.success {
        resp.data
    } else {
        None
    }
}

/// Recompute ranking and dispatch authenticated `delete_shard` to every
/// location; requires at least `⌈2n/3⌉` successes (spec §4.5 Delete).
pub async fn delete_chunk(
    local_store: &ShardKv,
    transport: &dyn PeerTransport,
    self_id: &PeerId,
    chunk: &DistributedChunk,
    token: &DeleteToken,
) -> Result<(), DeleteError> {
    let required = (2 * N).div_ceil(3);

    let tasks = chunk.locations.iter().map(|loc| {
        let dest = destination_for(&loc.peer_id, self_id);
        let index = loc.shard_index;
        let token = token.clone();
        async move {
            match dest {
                Destination::Local => delete_local(local_store, &chunk.user_address, chunk.chunk_id, index),
                Destination::Remote(peer_id) => {
                    delete_remote(transport, &peer_id, &chunk.user_address, chunk.chunk_id, index, &token).await
                }
            }
        }
    });

    let successes = join_all(tasks).await.into_iter().filter(|ok| *ok).count();
    if successes < required {
        return Err(DeleteError::PartialFailure { successes, required });
    }
    Ok(())
}

fn delete_local(store: &ShardKv, user: &UserAddress, chunk_id: ChunkId, index: u8) -> bool {
    let Ok(key) = shard_key(user, chunk_id, index) else {
        return false;
    };
    store.delete(&key).is_ok()
}

async fn delete_remote(
    transport: &dyn PeerTransport,
    peer: &PeerId,
    user: &UserAddress,
    chunk_id: ChunkId,
    index: u8,
    token: &DeleteToken,
) -> bool {
    let (signature_b64, public_key_pem) = per_shard_signature(user, chunk_id, index, token);
    let msg = RpcMessage {
        version: mesh_common::constants::DEFAULT_PROTOCOL_VERSION.to_string(),
        id: format!("delete_shard:{user}:{chunk_id}:{index}"),
        body: RequestBody::DeleteShard {
            user_address: user.as_str().to_string(),
            chunk_id: chunk_id.0,
            shard_index: index,
            timestamp_rfc3339: token.timestamp_rfc3339.clone(),
            signature_b64,
            public_key_pem,
        },
    };
    transport.send(peer, msg).await.map(|r| r.success).unwrap_or(false)
}

/// Sign the per-shard canonical message fresh for this `shard_index`; a
/// chunk-level signature cannot be reused verbatim across shards since the
/// RPC-level contract embeds the index (spec §6).
fn per_shard_signature(user: &UserAddress, chunk_id: ChunkId, index: u8, token: &DeleteToken) -> (String, String) {
    match &token.operator_key {
        Some(key) => {
            let message = canonical_delete_message(user.as_str(), chunk_id.0, index, &token.timestamp_rfc3339);
            (sign_delete_message(key, &message), token.operator_public_key_pem.clone())
        }
        None => (String::new(), String::new()),
    }
}

fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tempfile::tempdir;

    struct NullTransport;

    #[async_trait]
    impl PeerTransport for NullTransport {
        async fn send(&self, _peer: &PeerId, _message: RpcMessage) -> Result<mesh_rpc::RpcResponse, TransportError> {
            panic!("one-peer network should never dispatch over the wire");
        }
    }

    fn user(n: u8) -> UserAddress {
        UserAddress::new(format!("0x{}", n.to_string().repeat(40))).unwrap()
    }

    #[tokio::test]
    async fn one_peer_network_round_trips_locally() {
        let dir = tempdir().unwrap();
        let store = ShardKv::open(dir.path().join("shards.redb")).unwrap();
        let codec = ErasureCodec::new();
        let transport = NullTransport;
        let self_id = PeerId::from_bytes(vec![0]);
        let me = user(1);

        let data = b"Testing retrieval of a distributed mesh blob".to_vec();
        let chunk = write_chunk(&codec, &store, &transport, &self_id, &[], &me, ChunkId(2), &data)
            .await
            .unwrap();
        assert_eq!(chunk.locations.len(), N);
        assert!(chunk.locations.iter().all(|l| l.peer_id == self_id));

        let back = read_chunk(&codec, &store, &transport, &self_id, &chunk).await.unwrap();
        assert_eq!(back, data);
    }

    #[tokio::test]
    async fn delete_removes_all_local_shards() {
        let dir = tempdir().unwrap();
        let store = ShardKv::open(dir.path().join("shards.redb")).unwrap();
        let codec = ErasureCodec::new();
        let transport = NullTransport;
        let self_id = PeerId::from_bytes(vec![0]);
        let me = user(2);

        let chunk = write_chunk(&codec, &store, &transport, &self_id, &[], &me, ChunkId(5), b"payload")
            .await
            .unwrap();

        let token = DeleteToken {
            timestamp_rfc3339: chrono::Utc::now().to_rfc3339(),
            operator_key: None,
            operator_public_key_pem: String::new(),
        };
        delete_chunk(&store, &transport, &self_id, &chunk, &token).await.unwrap();

        let err = read_chunk(&codec, &store, &transport, &self_id, &chunk).await.unwrap_err();
        assert!(matches!(err, ReadError::InsufficientShards { got: 0, .. }));
    }

    #[tokio::test]
    async fn signed_delete_verifies_per_shard_across_remote_peers() {
        use mesh_rpc::{verify_delete, RpcResponse};
        use rand::rngs::OsRng;
        use std::sync::Arc;

        struct VerifyingTransport {
            public_key_pem: String,
        }

        #[async_trait]
        impl PeerTransport for VerifyingTransport {
            async fn send(&self, _peer: &PeerId, message: RpcMessage) -> Result<RpcResponse, TransportError> {
                let RequestBody::DeleteShard {
                    user_address,
                    chunk_id,
                    shard_index,
                    timestamp_rfc3339,
                    signature_b64,
                    public_key_pem,
                } = message.body
                else {
                    panic!("expected a DeleteShard request");
                };
                assert_eq!(public_key_pem, self.public_key_pem);
                verify_delete(
                    &user_address,
                    chunk_id,
                    shard_index,
                    &timestamp_rfc3339,
                    &signature_b64,
                    &public_key_pem,
                    chrono::Utc::now(),
                    false,
                )
                .expect("per-shard signature must verify");
                Ok(RpcResponse::ok(&message.version))
            }
        }

        let signing_key = SigningKey::generate(&mut OsRng);
        let public_key_pem = pem::encode(&pem::Pem::new("PUBLIC KEY", signing_key.verifying_key().to_bytes().to_vec()));

        let dir = tempdir().unwrap();
        let store = ShardKv::open(dir.path().join("shards.redb")).unwrap();
        let codec = ErasureCodec::new();
        let self_id = PeerId::from_bytes(vec![0]);
        let remote_peer = PeerId::from_bytes(vec![1]);
        let me = user(7);

        // Force every location onto the remote peer so the signed path is
        // exercised end to end instead of falling through to the local store.
        let chunk = DistributedChunk {
            user_address: me.clone(),
            chunk_id: ChunkId(9),
            original_size: 7,
            shard_size: 7,
            locations: (0..N as u8)
                .map(|i| ShardLocation { shard_index: i, peer_id: remote_peer.clone(), peer_addresses: Vec::new() })
                .collect(),
        };

        let transport: Arc<dyn PeerTransport> = Arc::new(VerifyingTransport { public_key_pem: public_key_pem.clone() });
        let token = DeleteToken {
            timestamp_rfc3339: chrono::Utc::now().to_rfc3339(),
            operator_key: Some(signing_key),
            operator_public_key_pem: public_key_pem,
        };
        delete_chunk(&store, transport.as_ref(), &self_id, &chunk, &token).await.unwrap();
    }
}
