//! Peer-side RPC handler: serves another peer's shard requests against the
//! local store (spec §9 design note "dynamic dispatch over local vs. peer"
//! resolved at the dispatch site, this module is the "local" side of it).
//!
//! Fixes the source's `handle_get_shard` asymmetry (spec §9 open question
//! 1): both `store_shard` and `get_shard` key by the request's own
//! `shard_index`, never a hard-coded second key.

use std::sync::Arc;

use mesh_common::types::{shard_key, ChunkId, UserAddress};
use mesh_rpc::{verify_delete, AuthError, PeerHandler, RequestBody, RpcMessage, RpcResponse, ShardInfo};
use mesh_shard_store::types::parse_shard_key;
use mesh_shard_store::{ShardKv, StoredShardRecord};
use tracing::warn;

/// Serves `StoreShard` / `GetShard` / `DeleteShard` / `ShardStatus` / `Ping`
/// against this node's local [`ShardKv`]. `StoreChunk`/`GetChunk` are part
/// of the wire shape but have no handler on this shard-granularity peer —
/// every engine in this workspace only ever dispatches at shard
/// granularity, so they are answered with an explicit unsupported error
/// rather than silently doing the wrong thing.
pub struct LocalPeerHandler {
    store: Arc<ShardKv>,
    allow_unsigned_delete: bool,
}

impl LocalPeerHandler {
    #[must_use]
    pub fn new(store: Arc<ShardKv>, allow_unsigned_delete: bool) -> Self {
        Self { store, allow_unsigned_delete }
    }
}

impl PeerHandler for LocalPeerHandler {
    fn handle(&self, message: RpcMessage) -> RpcResponse {
        let version = message.version.clone();
        match message.body {
            RequestBody::Ping => RpcResponse::ok(&version),
            RequestBody::StoreShard { user_address, chunk_id, shard_index, bytes } => {
                handle_store_shard(&self.store, &version, user_address, chunk_id, shard_index, bytes)
            }
            RequestBody::GetShard { user_address, chunk_id, shard_index } => {
                handle_get_shard(&self.store, &version, user_address, chunk_id, shard_index)
            }
            RequestBody::DeleteShard {
                user_address,
                chunk_id,
                shard_index,
                timestamp_rfc3339,
                signature_b64,
                public_key_pem,
            } => handle_delete_shard(
                &self.store,
                self.allow_unsigned_delete,
                &version,
                user_address,
                chunk_id,
                shard_index,
                timestamp_rfc3339,
                signature_b64,
                public_key_pem,
            ),
            RequestBody::ShardStatus { user_address, chunk_id } => {
                handle_shard_status(&self.store, &version, user_address, chunk_id)
            }
            RequestBody::StoreChunk { .. } | RequestBody::GetChunk { .. } => {
                RpcResponse::err(&version, "this peer only serves shard-granularity requests")
            }
        }
    }
}

fn handle_store_shard(
    store: &ShardKv,
    version: &str,
    user_address: String,
    chunk_id: u64,
    shard_index: u8,
    bytes: Vec<u8>,
) -> RpcResponse {
    let Ok(user) = UserAddress::new(&user_address) else {
        return RpcResponse::err(version, "malformed user_address");
    };
    let Ok(key) = shard_key(&user, ChunkId(chunk_id), shard_index) else {
        return RpcResponse::err(version, "user_address contains the shard-key sentinel");
    };
    let record = StoredShardRecord {
        shard_key: key,
        shard_index,
        size: bytes.len() as u64,
        bytes,
        stored_at: chrono::Utc::now().timestamp(),
    };
    match store.put(&record) {
        Ok(()) => RpcResponse::ok(version),
        Err(e) => RpcResponse::err(version, e.to_string()),
    }
}

/// Keys by the request's own `shard_index`, unlike the source's hard-coded
/// second key of `0` (spec §9 open question 1).
fn handle_get_shard(store: &ShardKv, version: &str, user_address: String, chunk_id: u64, shard_index: u8) -> RpcResponse {
    let Ok(user) = UserAddress::new(&user_address) else {
        return RpcResponse::err(version, "malformed user_address");
    };
    let Ok(key) = shard_key(&user, ChunkId(chunk_id), shard_index) else {
        return RpcResponse::err(version, "user_address contains the shard-key sentinel");
    };
    match store.get(&key, shard_index) {
        Ok(record) => RpcResponse::ok_with_data(version, record.bytes),
        Err(e) => RpcResponse::err(version, e.to_string()),
    }
}

#[allow(clippy::too_many_arguments)]
fn handle_delete_shard(
    store: &ShardKv,
    allow_unsigned: bool,
    version: &str,
    user_address: String,
    chunk_id: u64,
    shard_index: u8,
    timestamp_rfc3339: String,
    signature_b64: String,
    public_key_pem: String,
) -> RpcResponse {
    if let Err(e) = verify_delete(
        &user_address,
        chunk_id,
        shard_index,
        &timestamp_rfc3339,
        &signature_b64,
        &public_key_pem,
        chrono::Utc::now(),
        allow_unsigned,
    ) {
        warn!(error = %e, "rejected unauthenticated delete_shard");
        return RpcResponse::err(version, auth_error_message(&e));
    }

    let Ok(user) = UserAddress::new(&user_address) else {
        return RpcResponse::err(version, "malformed user_address");
    };
    let Ok(key) = shard_key(&user, ChunkId(chunk_id), shard_index) else {
        return RpcResponse::err(version, "user_address contains the shard-key sentinel");
    };
    match store.delete(&key) {
        Ok(()) => RpcResponse::ok(version),
        Err(e) => RpcResponse::err(version, e.to_string()),
    }
}

fn auth_error_message(e: &AuthError) -> String {
    format!("unauthorized: {e}")
}

fn handle_shard_status(store: &ShardKv, version: &str, user_address: Option<String>, chunk_id: Option<u64>) -> RpcResponse {
    let records = match &user_address {
        Some(user) => store.list_by_user(user),
        None => store.list_all(),
    };
    let records = match records {
        Ok(r) => r,
        Err(e) => return RpcResponse::err(version, e.to_string()),
    };

    let infos: Vec<ShardInfo> = records
        .into_iter()
        .filter(|r| {
            let Some(wanted) = chunk_id else { return true };
            matches!(parse_shard_key(&r.shard_key), Some((_, c)) if c == wanted.to_string())
        })
        .map(|r| {
            let (user, chunk) = parse_shard_key(&r.shard_key).unwrap_or(("", "0"));
            ShardInfo {
                user_address: user.to_string(),
                chunk_id: chunk.parse().unwrap_or_default(),
                shard_index: r.shard_index,
                size: r.size,
                stored_at: r.stored_at,
            }
        })
        .collect();

    RpcResponse { version: version.to_string(), success: true, shard_infos: Some(infos), ..Default::default() }
}
