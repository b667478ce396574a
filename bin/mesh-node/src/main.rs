//! Manual exercise harness for the ZenTalk mesh storage engine.
//!
//! Wires a small in-process mesh over a shared [`mesh_rpc::LoopbackTransport`]
//! and drives it through a store, a simulated shard loss + repair, and an
//! authenticated delete. There is no HTTP/gRPC server loop here — that
//! surface is out of scope (spec §1); this binary exists to exercise the
//! engine end to end the way a developer would at a REPL.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use ed25519_dalek::SigningKey;
use mesh_common::constants::N;
use mesh_common::types::{shard_key, ChunkId, PeerId, UserAddress};
use mesh_crypto::KeyMode;
use mesh_engine::{DistributedStorage, LocalPeerHandler};
use mesh_rpc::{canonical_chunk_delete_message, sign_delete_message, LoopbackTransport};
use mesh_shard_store::ShardKv;
use mesh_supervisor::SupervisorConfig;
use parking_lot::RwLock;
use rand::rngs::OsRng;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "mesh-node")]
#[command(about = "Manual exercise harness for the ZenTalk mesh storage engine")]
struct Args {
    /// Number of peers in the demo mesh (must exceed n = k + m shards)
    #[arg(long, default_value_t = 20)]
    peers: usize,

    /// Directory holding each simulated peer's redb file
    #[arg(long, default_value = "/tmp/mesh-node-demo")]
    data_dir: String,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| args.log_level.clone().into()))
        .init();

    run(&args).await;
}

async fn run(args: &Args) {
    assert!(args.peers > N, "need more peers than shards to exercise the remote path");

    let transport = Arc::new(LoopbackTransport::new());
    let mut peer_ids = Vec::with_capacity(args.peers);
    let mut peer_stores = Vec::with_capacity(args.peers);

    for i in 0..args.peers {
        let peer_id = PeerId::from_bytes(vec![i as u8]);
        let dir = Path::new(&args.data_dir).join(format!("peer-{i}"));
        std::fs::create_dir_all(&dir).expect("create peer data dir");
        let store = Arc::new(ShardKv::open(dir.join("shards.redb")).expect("open shard store"));
        transport.register(peer_id.clone(), Arc::new(LocalPeerHandler::new(store.clone(), false)));
        peer_ids.push(peer_id);
        peer_stores.push(store);
    }

    let self_id = peer_ids[0].clone();
    let connected_peers: Vec<PeerId> = peer_ids[1..].to_vec();
    let operator_key = SigningKey::generate(&mut OsRng);
    let operator_public_key_pem = pem::encode(&pem::Pem::new("PUBLIC KEY", operator_key.verifying_key().to_bytes().to_vec()));

    let engine = DistributedStorage::new(
        peer_stores[0].clone(),
        transport.clone(),
        self_id,
        Arc::new(RwLock::new(connected_peers)),
        operator_key,
        operator_public_key_pem.clone(),
        false,
        SupervisorConfig { tick_interval: Duration::from_secs(600), tick_deadline: Duration::from_secs(30) },
    );

    let user = UserAddress::new_unchecked("0xdemo000000000000000000000000000000demo1");
    let chunk_id = ChunkId(1);
    let key_mode = KeyMode::Password("demo-passphrase".to_string());
    let payload = b"the mesh remembers everything you trust it with".to_vec();

    info!("storing a chunk across the mesh");
    let chunk = engine.store_chunk(&user, chunk_id, &payload, &key_mode).await.expect("store_chunk");
    let health = engine.chunk_health(&chunk).await;
    info!(health, locations = chunk.locations.len(), "chunk stored");

    info!("simulating the loss of three shards");
    for loc in chunk.locations.iter().take(3) {
        let peer_index = peer_ids.iter().position(|p| *p == loc.peer_id).expect("known peer");
        let key = shard_key(&user, chunk_id, loc.shard_index).expect("shard key");
        let _ = peer_stores[peer_index].delete(&key);
    }
    let degraded_health = engine.chunk_health(&chunk).await;
    info!(health = degraded_health, "health after simulated loss");

    info!("running a supervisor tick to trigger repair");
    let verdicts = engine.supervisor().run_tick().await;
    for (key, verdict) in &verdicts {
        info!(user = %key.0, chunk_id = key.1, ?verdict, "scan verdict");
    }

    let repaired_health = engine.chunk_health(&chunk).await;
    info!(health = repaired_health, "health after repair");

    info!("retrieving the chunk to confirm content survived the repair");
    let fetched = engine.retrieve_chunk(&chunk, &key_mode).await.expect("retrieve_chunk");
    assert_eq!(fetched, payload, "repaired chunk must decode to the original bytes");
    info!("retrieved chunk matches the original payload");

    info!("issuing an authenticated delete");
    let timestamp = chrono::Utc::now().to_rfc3339();
    let api_key = SigningKey::generate(&mut OsRng);
    let api_public_key_pem = pem::encode(&pem::Pem::new("PUBLIC KEY", api_key.verifying_key().to_bytes().to_vec()));
    let message = canonical_chunk_delete_message(user.as_str(), chunk_id.0, &timestamp);
    let signature = sign_delete_message(&api_key, &message);
    engine.delete_chunk(&chunk, &timestamp, &signature, &api_public_key_pem).await.expect("delete_chunk");

    let status = engine.chunk_status(&chunk).await;
    info!(available = status.available_count(), "availability after delete");
}
