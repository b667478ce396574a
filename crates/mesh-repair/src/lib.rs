//! Repair Engine (spec C6): regenerate missing shards from survivors and
//! redistribute them onto freshly ranked peers.
//!
//! Expressed as the teacher's fan-out-then-reduce idiom (`objectio_erasure`
//! decode + `objectio_placement` select, composed): one probe/fetch task per
//! location via `futures::future::join_all`, a codec reconstruct in memory,
//! then a second join for the regenerated-shard placements.

use futures::future::join_all;
use mesh_codec::{CodecError, EncodedChunk, ErasureCodec, Shard};
use mesh_common::constants::{HEALTH_EXCELLENT, K};
use mesh_common::types::{shard_key, ChunkId, DistributedChunk, PeerId, ShardLocation, UserAddress};
use mesh_common::ShardKeyError;
use mesh_placement::rank_for_chunk;
use mesh_rpc::{PeerTransport, RequestBody, RpcMessage};
use mesh_shard_store::{ShardKv, StoredShardRecord};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum RepairError {
    #[error("chunk is irrecoverably lost: only {0} of k shards available")]
    IrrecoverableLoss(usize),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("invalid shard key: {0}")]
    ShardKey(#[from] ShardKeyError),
}

/// Outcome of a repair attempt (spec §4.6 step 8: partial success still
/// counts as success so long as at least one shard was restored).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairOutcome {
    /// Chunk was already at `HealthExcellent`, or no regenerated shard
    /// could be placed anywhere; stored-shard count is unchanged either way.
    NoOp,
    Repaired { restored: usize, available_after: usize },
}

enum Destination {
    Local,
    Remote(PeerId),
}

fn destination_for(peer: &PeerId, self_id: &PeerId) -> Destination {
    if peer == self_id {
        Destination::Local
    } else {
        Destination::Remote(peer.clone())
    }
}

/// Probe and regenerate `chunk`'s missing shards, writing them to a freshly
/// computed placement and updating `chunk.locations` in place (spec §4.6).
pub async fn repair_chunk(
    codec: &ErasureCodec,
    local_store: &ShardKv,
    transport: &dyn PeerTransport,
    self_id: &PeerId,
    connected_peers: &[PeerId],
    chunk: &mut DistributedChunk,
) -> Result<RepairOutcome, RepairError> {
    let user = chunk.user_address.clone();
    let chunk_id = chunk.chunk_id;
    let mut encoded = EncodedChunk::all_missing(chunk.shard_size, chunk.original_size);

    let tasks = chunk.locations.iter().map(|loc| {
        let dest = destination_for(&loc.peer_id, self_id);
        let index = loc.shard_index;
        let user = &user;
        async move {
            let bytes = match dest {
                Destination::Local => fetch_local(local_store, user, chunk_id, index),
                Destination::Remote(peer_id) => fetch_remote(transport, &peer_id, user, chunk_id, index).await,
            };
            (index, bytes)
        }
    });

    let fetched = join_all(tasks).await;
    let missing: Vec<usize> = fetched
        .iter()
        .filter_map(|(index, bytes)| if bytes.is_none() { Some(*index as usize) } else { None })
        .collect();
    for (index, bytes) in fetched {
        if let Some(bytes) = bytes {
            encoded.set(index as usize, Shard::from_vec(bytes));
        }
    }

    let available = encoded.available_count();
    if available >= HEALTH_EXCELLENT {
        return Ok(RepairOutcome::NoOp);
    }
    if available < K {
        return Err(RepairError::IrrecoverableLoss(available));
    }

    codec.reconstruct_in_place(&mut encoded)?;

    let ranked = rank_for_chunk(&user, chunk_id, connected_peers, self_id);

    let mut placements = Vec::with_capacity(missing.len());
    for &index in &missing {
        let peer = ranked[index].clone();
        let shard = encoded.get(index).expect("reconstructed above").clone();
        let user = &user;
        placements.push(async move {
            let key = shard_key(user, chunk_id, index as u8)?;
            let ok = match destination_for(&peer, self_id) {
                Destination::Local => store_local(local_store, &key, index as u8, shard).is_ok(),
                Destination::Remote(ref peer_id) => {
                    store_remote(transport, peer_id, user, chunk_id, index as u8, shard).await.is_ok()
                }
            };
            Ok::<(usize, PeerId, bool), ShardKeyError>((index, peer, ok))
        });
    }

    let results: Vec<(usize, PeerId, bool)> = join_all(placements)
        .await
        .into_iter()
        .collect::<Result<Vec<_>, ShardKeyError>>()?;

    let mut restored = 0;
    for (index, peer, ok) in results {
        if ok {
            restored += 1;
            chunk.locations[index] = ShardLocation {
                shard_index: index as u8,
                peer_id: peer,
                peer_addresses: Vec::new(),
            };
        } else {
            warn!(shard_index = index, "repair placement failed, will retry on next health pass");
        }
    }

    if restored == 0 {
        warn!("repair made no progress, all regenerated-shard placements failed");
        return Ok(RepairOutcome::NoOp);
    }

    let available_after = available + restored;
    info!(restored, available_after, "repaired chunk");
    Ok(RepairOutcome::Repaired { restored, available_after })
}

fn fetch_local(store: &ShardKv, user: &UserAddress, chunk_id: ChunkId, index: u8) -> Option<Vec<u8>> {
    let key = shard_key(user, chunk_id, index).ok()?;
    store.get(&key, index).ok().map(|r| r.bytes)
}

async fn fetch_remote(
    transport: &dyn PeerTransport,
    peer: &PeerId,
    user: &UserAddress,
    chunk_id: ChunkId,
    index: u8,
) -> Option<Vec<u8>> {
    let msg = RpcMessage {
        version: mesh_common::constants::DEFAULT_PROTOCOL_VERSION.to_string(),
        id: format!("repair_get_shard:{user}:{chunk_id}:{index}"),
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

fn store_local(store: &ShardKv, key: &str, index: u8, shard: Shard) -> Result<(), mesh_shard_store::ShardStoreError> {
    store.put(&StoredShardRecord {
        shard_key: key.to_string(),
        shard_index: index,
        size: shard.len() as u64,
        bytes: shard.into_bytes().to_vec(),
        stored_at: chrono_now_unix(),
    })
}

async fn store_remote(
    transport: &dyn PeerTransport,
    peer: &PeerId,
    user: &UserAddress,
    chunk_id: ChunkId,
    index: u8,
    shard: Shard,
) -> Result<(), mesh_rpc::TransportError> {
    let msg = RpcMessage {
        version: mesh_common::constants::DEFAULT_PROTOCOL_VERSION.to_string(),
        id: format!("repair_store_shard:{user}:{chunk_id}:{index}"),
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
        Err(mesh_rpc::TransportError::StreamClosed)
    }
}

fn chrono_now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mesh_placement::procedures::write_chunk;
    use tempfile::tempdir;

    struct NullTransport;

    #[async_trait]
    impl PeerTransport for NullTransport {
        async fn send(&self, _peer: &PeerId, _message: RpcMessage) -> Result<mesh_rpc::RpcResponse, mesh_rpc::TransportError> {
            panic!("one-peer network should never dispatch over the wire");
        }
    }

    fn user(n: u8) -> UserAddress {
        UserAddress::new(format!("0x{}", n.to_string().repeat(40))).unwrap()
    }

    #[tokio::test]
    async fn fully_healthy_chunk_is_a_no_op() {
        let dir = tempdir().unwrap();
        let store = ShardKv::open(dir.path().join("shards.redb")).unwrap();
        let codec = ErasureCodec::new();
        let transport = NullTransport;
        let self_id = PeerId::from_bytes(vec![0]);
        let me = user(1);

        let mut chunk = write_chunk(&codec, &store, &transport, &self_id, &[], &me, ChunkId(1), b"intact chunk")
            .await
            .unwrap();

        let outcome = repair_chunk(&codec, &store, &transport, &self_id, &[], &mut chunk)
            .await
            .unwrap();
        assert_eq!(outcome, RepairOutcome::NoOp);
    }

    #[tokio::test]
    async fn degraded_chunk_is_restored_and_monotonic() {
        let dir = tempdir().unwrap();
        let store = ShardKv::open(dir.path().join("shards.redb")).unwrap();
        let codec = ErasureCodec::new();
        let transport = NullTransport;
        let self_id = PeerId::from_bytes(vec![0]);
        let me = user(2);

        let mut chunk = write_chunk(
            &codec,
            &store,
            &transport,
            &self_id,
            &[],
            &me,
            ChunkId(100),
            b"Testing automatic shard repair of a distributed mesh blob",
        )
        .await
        .unwrap();

        for index in [2u8, 5, 8, 11, 14] {
            let key = shard_key(&me, ChunkId(100), index).unwrap();
            store.delete(&key).unwrap();
        }

        let outcome = repair_chunk(&codec, &store, &transport, &self_id, &[], &mut chunk)
            .await
            .unwrap();
        match outcome {
            RepairOutcome::Repaired { restored, available_after } => {
                assert_eq!(restored, 5);
                assert_eq!(available_after, 15);
            }
            RepairOutcome::NoOp => panic!("expected repair to restore shards"),
        }

        let back = mesh_placement::procedures::read_chunk(&codec, &store, &transport, &self_id, &chunk)
            .await
            .unwrap();
        assert_eq!(back, b"Testing automatic shard repair of a distributed mesh blob");
    }

    #[tokio::test]
    async fn irrecoverable_loss_is_reported_not_panicked() {
        let dir = tempdir().unwrap();
        let store = ShardKv::open(dir.path().join("shards.redb")).unwrap();
        let codec = ErasureCodec::new();
        let transport = NullTransport;
        let self_id = PeerId::from_bytes(vec![0]);
        let me = user(3);

        let mut chunk = write_chunk(&codec, &store, &transport, &self_id, &[], &me, ChunkId(3), b"doomed chunk")
            .await
            .unwrap();

        for index in 0u8..10 {
            let key = shard_key(&me, ChunkId(3), index).unwrap();
            store.delete(&key).unwrap();
        }

        let err = repair_chunk(&codec, &store, &transport, &self_id, &[], &mut chunk)
            .await
            .unwrap_err();
        assert!(matches!(err, RepairError::IrrecoverableLoss(5)));
    }
}
