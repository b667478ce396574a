//! Request/response message shapes (spec §4.4).

use mesh_common::constants::DEFAULT_PROTOCOL_VERSION;
use serde::{Deserialize, Serialize};

fn default_version() -> String {
    DEFAULT_PROTOCOL_VERSION.to_string()
}

/// One stored shard's metadata, as returned by `shard_status`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardInfo {
    pub user_address: String,
    pub chunk_id: u64,
    pub shard_index: u8,
    pub size: u64,
    pub stored_at: i64,
}

/// A single JSON-framed request (spec §4.4 field table). Empty-string
/// `version` on the wire deserializes through `default_version`, never
/// through a sentinel check at call sites.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcMessage {
    #[serde(default = "default_version")]
    pub version: String,
    pub id: String,
    #[serde(flatten)]
    pub body: RequestBody,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum RequestBody {
    Ping,
    StoreChunk {
        user_address: String,
        chunk_id: u64,
        bytes: Vec<u8>,
    },
    GetChunk {
        user_address: String,
        chunk_id: u64,
    },
    StoreShard {
        user_address: String,
        chunk_id: u64,
        shard_index: u8,
        bytes: Vec<u8>,
    },
    GetShard {
        user_address: String,
        chunk_id: u64,
        shard_index: u8,
    },
    ShardStatus {
        user_address: Option<String>,
        chunk_id: Option<u64>,
    },
    DeleteShard {
        user_address: String,
        chunk_id: u64,
        shard_index: u8,
        timestamp_rfc3339: String,
        signature_b64: String,
        public_key_pem: String,
    },
}

/// The single response shape for every request type (spec §4.4): unused
/// fields are `None` rather than the protocol branching by message type.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RpcResponse {
    #[serde(default = "default_version")]
    pub version: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shard_info: Option<ShardInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shard_infos: Option<Vec<ShardInfo>>,
    /// Populated only on a version-rejection response (spec §4.4 handshake).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supported_versions: Option<Vec<String>>,
}

impl RpcResponse {
    #[must_use]
    pub fn ok(version: &str) -> Self {
        Self {
            version: version.to_string(),
            success: true,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn ok_with_data(version: &str, data: Vec<u8>) -> Self {
        Self {
            data: Some(data),
            ..Self::ok(version)
        }
    }

    #[must_use]
    pub fn err(version: &str, error: impl Into<String>) -> Self {
        Self {
            version: version.to_string(),
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}
