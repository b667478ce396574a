//! Peer transport abstraction (spec §9 "dynamic dispatch over local vs.
//! peer" design note; spec §4.4 framing).
//!
//! Mirrors the teacher's client/pool layering (`objectio_client::OsdClient`
//! composed by `objectio-gateway::osd_pool::OsdPool`) minus the gRPC
//! channel management, since this transport rides over an arbitrary
//! stream-opening peer-to-peer dependency rather than a trusted cluster
//! network. Production code implements [`PeerTransport`] over that
//! dependency; [`LoopbackTransport`] is the in-memory stand-in used by
//! this workspace's own tests and by `bin/mesh-node`'s single-process demo.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use mesh_common::types::PeerId;
use thiserror::Error;

use crate::message::{RpcMessage, RpcResponse};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("peer {0} is not known to this transport")]
    UnknownPeer(String),
    #[error("failed to open stream to peer: {0}")]
    StreamOpen(String),
    #[error("stream closed by peer before a response was received")]
    StreamClosed,
    #[error("failed to decode peer response: {0}")]
    Decode(String),
}

/// Sends one request to one peer and awaits its response (spec §4.4:
/// per-request bidirectional stream, JSON in, JSON out, stream closes).
#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn send(&self, peer: &PeerId, message: RpcMessage) -> Result<RpcResponse, TransportError>;
}

/// Synchronous request handler a [`LoopbackTransport`] peer registers.
/// `mesh-engine` implements this over a local shard store and the
/// authenticated-delete verifier.
pub trait PeerHandler: Send + Sync {
    fn handle(&self, message: RpcMessage) -> RpcResponse;
}

/// In-memory transport for tests and the single-process demo binary:
/// peers are registered handlers rather than network endpoints.
#[derive(Default)]
pub struct LoopbackTransport {
    peers: parking_lot::RwLock<HashMap<PeerId, Arc<dyn PeerHandler>>>,
}

impl LoopbackTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, peer: PeerId, handler: Arc<dyn PeerHandler>) {
        self.peers.write().insert(peer, handler);
    }

    pub fn unregister(&self, peer: &PeerId) {
        self.peers.write().remove(peer);
    }

    #[must_use]
    pub fn known_peers(&self) -> Vec<PeerId> {
        self.peers.read().keys().cloned().collect()
    }
}

#[async_trait]
impl PeerTransport for LoopbackTransport {
    async fn send(&self, peer: &PeerId, message: RpcMessage) -> Result<RpcResponse, TransportError> {
        let handler = self
            .peers
            .read()
            .get(peer)
            .cloned()
            .ok_or_else(|| TransportError::UnknownPeer(peer.to_string()))?;
        Ok(handler.handle(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::RequestBody;

    struct Echo;
    impl PeerHandler for Echo {
        fn handle(&self, message: RpcMessage) -> RpcResponse {
            RpcResponse::ok_with_data(&message.version, b"pong".to_vec())
        }
    }

    #[tokio::test]
    async fn dispatches_to_registered_peer() {
        let transport = LoopbackTransport::new();
        let peer = PeerId::from_bytes(vec![1, 2, 3]);
        transport.register(peer.clone(), Arc::new(Echo));

        let resp = transport
            .send(
                &peer,
                RpcMessage {
                    version: "1.0.0".to_string(),
                    id: "req-1".to_string(),
                    body: RequestBody::Ping,
                },
            )
            .await
            .unwrap();
        assert!(resp.success);
        assert_eq!(resp.data, Some(b"pong".to_vec()));
    }

    #[tokio::test]
    async fn unknown_peer_is_an_error() {
        let transport = LoopbackTransport::new();
        let peer = PeerId::from_bytes(vec![9]);
        let err = transport
            .send(
                &peer,
                RpcMessage {
                    version: "1.0.0".to_string(),
                    id: "req-1".to_string(),
                    body: RequestBody::Ping,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::UnknownPeer(_)));
    }
}
