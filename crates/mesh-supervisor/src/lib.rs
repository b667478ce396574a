//! Health Supervisor (spec C7): a ticker-driven background scan over
//! registered chunks that dispatches Repair past a health threshold.
//!
//! Grounded on `objectio_storage::metadata::store::MetadataStore`'s
//! background-thread pattern (shutdown signal + join handle guarding a
//! lock), ported to an async `tokio::time::interval` task since the rest
//! of the engine is already tokio-based. Holds only non-owning `Arc`
//! handles into the engine (Design Note 1, §9) — the engine owns the
//! Supervisor, never the reverse.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use mesh_codec::ErasureCodec;
use mesh_common::types::{ChunkId, DistributedChunk, HealthLevel, PeerId, UserAddress};
use mesh_repair::{repair_chunk, RepairError, RepairOutcome};
use mesh_rpc::{PeerTransport, RequestBody, RpcMessage};
use mesh_shard_store::ShardKv;
use parking_lot::RwLock;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Ticker cadence and per-tick deadline (spec §4.7).
#[derive(Debug, Clone, Copy)]
pub struct SupervisorConfig {
    pub tick_interval: Duration,
    pub tick_deadline: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(600),
            tick_deadline: Duration::from_secs(300),
        }
    }
}

type ChunkKey = (String, u64);

fn key_of(user: &UserAddress, chunk_id: ChunkId) -> ChunkKey {
    (user.as_str().to_string(), chunk_id.0)
}

/// One chunk's scan outcome for a single tick (spec §4.7 threshold table).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanVerdict {
    Healthy,
    Repaired { restored: usize },
    RepairNoProgress,
    RepairFailed,
    Irrecoverable,
}

/// Watches a set of registered `DistributedChunk`s and periodically
/// dispatches repair past a health threshold (spec C7).
pub struct Supervisor {
    local_store: Arc<ShardKv>,
    transport: Arc<dyn PeerTransport>,
    self_id: PeerId,
    connected_peers: Arc<RwLock<Vec<PeerId>>>,
    codec: ErasureCodec,
    registered: RwLock<HashMap<ChunkKey, DistributedChunk>>,
    config: SupervisorConfig,
}

impl Supervisor {
    #[must_use]
    pub fn new(
        local_store: Arc<ShardKv>,
        transport: Arc<dyn PeerTransport>,
        self_id: PeerId,
        connected_peers: Arc<RwLock<Vec<PeerId>>>,
        config: SupervisorConfig,
    ) -> Self {
        Self {
            local_store,
            transport,
            self_id,
            connected_peers,
            codec: ErasureCodec::new(),
            registered: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Add (or refresh) `chunk` in the watch set (spec §4.7: writes
    /// auto-register). Idempotent.
    pub fn register(&self, chunk: DistributedChunk) {
        let key = key_of(&chunk.user_address, chunk.chunk_id);
        self.registered.write().insert(key, chunk);
    }

    /// Remove `(user, chunk_id)` from the watch set (spec §4.7: deletes
    /// auto-unregister). Idempotent: unregistering an absent chunk is a no-op.
    pub fn unregister(&self, user: &UserAddress, chunk_id: ChunkId) {
        self.registered.write().remove(&key_of(user, chunk_id));
    }

    #[must_use]
    pub fn registered_count(&self) -> usize {
        self.registered.read().len()
    }

    /// Run one scan tick: snapshot the registered set, probe and classify
    /// every chunk concurrently, dispatch Repair where the threshold calls
    /// for it, all bounded by `tick_deadline` (spec §4.7).
    pub async fn run_tick(&self) -> HashMap<ChunkKey, ScanVerdict> {
        let snapshot: Vec<DistributedChunk> = self.registered.read().values().cloned().collect();
        let scans = snapshot.into_iter().map(|chunk| self.scan_one(chunk));

        match tokio::time::timeout(self.config.tick_deadline, join_all(scans)).await {
            Ok(results) => results.into_iter().collect(),
            Err(_) => {
                warn!(deadline_secs = self.config.tick_deadline.as_secs(), "supervisor tick exceeded its deadline");
                HashMap::new()
            }
        }
    }

    /// Tick on `config.tick_interval` until `cancel` fires, finishing the
    /// in-flight tick (never interrupting it mid-repair) before returning
    /// (spec §4.7 shutdown).
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = interval(self.config.tick_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let verdicts = self.run_tick().await;
                    info!(chunks = verdicts.len(), "supervisor tick complete");
                }
                () = cancel.cancelled() => {
                    info!("supervisor shutting down");
                    return;
                }
            }
        }
    }

    async fn scan_one(&self, mut chunk: DistributedChunk) -> (ChunkKey, ScanVerdict) {
        let key = key_of(&chunk.user_address, chunk.chunk_id);
        let available = self.probe_available(&chunk).await;
        let level = HealthLevel::classify(available);

        let verdict = match level {
            HealthLevel::Excellent | HealthLevel::Good => {
                info!(user = %chunk.user_address, chunk_id = chunk.chunk_id.0, available, "chunk healthy");
                ScanVerdict::Healthy
            }
            HealthLevel::Degraded => self.dispatch_repair(&mut chunk, false).await,
            HealthLevel::Critical => self.dispatch_repair(&mut chunk, true).await,
            HealthLevel::Lost => {
                warn!(user = %chunk.user_address, chunk_id = chunk.chunk_id.0, available, "chunk is irrecoverable");
                ScanVerdict::Irrecoverable
            }
        };

        if matches!(verdict, ScanVerdict::Repaired { .. }) {
            self.registered.write().insert(key.clone(), chunk);
        }
        (key, verdict)
    }

    async fn dispatch_repair(&self, chunk: &mut DistributedChunk, urgent: bool) -> ScanVerdict {
        if urgent {
            warn!(user = %chunk.user_address, chunk_id = chunk.chunk_id.0, "chunk critical, dispatching urgent repair");
        } else {
            info!(user = %chunk.user_address, chunk_id = chunk.chunk_id.0, "chunk degraded, dispatching repair");
        }

        let connected = self.connected_peers.read().clone();
        match repair_chunk(&self.codec, &self.local_store, self.transport.as_ref(), &self.self_id, &connected, chunk).await {
            Ok(RepairOutcome::Repaired { restored, .. }) => ScanVerdict::Repaired { restored },
            Ok(RepairOutcome::NoOp) => ScanVerdict::RepairNoProgress,
            Err(RepairError::IrrecoverableLoss(available)) => {
                warn!(available, "repair found the chunk irrecoverable mid-scan");
                ScanVerdict::Irrecoverable
            }
            Err(err) => {
                warn!(error = %err, "repair attempt failed");
                ScanVerdict::RepairFailed
            }
        }
    }

    async fn probe_available(&self, chunk: &DistributedChunk) -> usize {
        let tasks = chunk.locations.iter().map(|loc| async move {
            if loc.peer_id == self.self_id {
                let Ok(key) = mesh_common::types::shard_key(&chunk.user_address, chunk.chunk_id, loc.shard_index) else {
                    return false;
                };
                self.local_store.get(&key, loc.shard_index).is_ok()
            } else {
                let msg = RpcMessage {
                    version: mesh_common::constants::DEFAULT_PROTOCOL_VERSION.to_string(),
                    id: format!("probe:{}:{}:{}", chunk.user_address, chunk.chunk_id, loc.shard_index),
                    body: RequestBody::GetShard {
                        user_address: chunk.user_address.as_str().to_string(),
                        chunk_id: chunk.chunk_id.0,
                        shard_index: loc.shard_index,
                    },
                };
                self.transport.send(&loc.peer_id, msg).await.map(|r| r.success).unwrap_or(false)
            }
        });
        join_all(tasks).await.into_iter().filter(|ok| *ok).count()
    }
}
