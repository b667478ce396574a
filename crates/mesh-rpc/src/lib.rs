//! Mesh Storage Peer RPC - wire protocol, transport, version negotiation,
//! and authenticated deletion (spec C4/C8).
//!
//! Per-request JSON framing over an arbitrary stream-opening transport,
//! grounded on the teacher's client/gateway layering
//! (`objectio_client::OsdClient`, `objectio-gateway::osd_pool`) without its
//! gRPC/protobuf machinery, which has no counterpart on a peer-to-peer
//! transport.

pub mod auth;
pub mod message;
pub mod transport;
pub mod version;

pub use auth::{
    canonical_chunk_delete_message, canonical_delete_message, sign_delete_message, verify_chunk_delete, verify_delete,
    AuthError,
};
pub use message::{RequestBody, RpcMessage, RpcResponse, ShardInfo};
pub use transport::{LoopbackTransport, PeerTransport, TransportError};
pub use version::{VersionError, VersionNegotiator};
