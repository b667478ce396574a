//! Root configuration for a mesh storage node.
//!
//! Mirrors `objectio_common::config::Config`'s nested-struct-with-`Default`
//! layout, narrowed to this engine's concerns. Loading this from a file and
//! starting a process is the operator CLI's job (spec §1, out of scope);
//! this crate only owns the shape and the `from_file` loader.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MeshConfig {
    pub node: NodeConfig,
    pub storage: StorageConfig,
    pub rpc: RpcConfig,
    pub supervisor: SupervisorConfig,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            node: NodeConfig::default(),
            storage: StorageConfig::default(),
            rpc: RpcConfig::default(),
            supervisor: SupervisorConfig::default(),
        }
    }
}

impl MeshConfig {
    /// Load configuration from a TOML file, falling back to defaults for any
    /// field the file does not set.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .build()?;
        settings.try_deserialize()
    }
}

/// Node identity.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Human-readable node name.
    pub name: String,
    /// Data directory for the local shard store.
    pub data_dir: PathBuf,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: "mesh-node".to_string(),
            data_dir: PathBuf::from("./mesh-data"),
        }
    }
}

/// Local shard store tuning.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Garbage-collect shard records older than this age. `None` disables GC.
    #[serde(with = "humantime_opt", default)]
    pub gc_max_age: Option<Duration>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { gc_max_age: None }
    }
}

/// Peer RPC timeouts (spec §5).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcConfig {
    #[serde(with = "humantime")]
    pub store_timeout: Duration,
    #[serde(with = "humantime")]
    pub read_timeout: Duration,
    #[serde(with = "humantime")]
    pub per_rpc_timeout: Duration,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_secs(60),
            read_timeout: Duration::from_secs(60),
            per_rpc_timeout: Duration::from_secs(30),
        }
    }
}

/// Health supervisor tuning (spec §4.7).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SupervisorConfig {
    #[serde(with = "humantime")]
    pub tick_interval: Duration,
    #[serde(with = "humantime")]
    pub tick_deadline: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(10 * 60),
            tick_deadline: Duration::from_secs(5 * 60),
        }
    }
}

mod humantime {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

mod humantime_opt {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&d.as_secs()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_timeouts() {
        let cfg = MeshConfig::default();
        assert_eq!(cfg.rpc.store_timeout, Duration::from_secs(60));
        assert_eq!(cfg.rpc.read_timeout, Duration::from_secs(60));
        assert_eq!(cfg.supervisor.tick_interval, Duration::from_secs(600));
        assert_eq!(cfg.supervisor.tick_deadline, Duration::from_secs(300));
    }

    #[test]
    fn loads_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mesh.toml");
        std::fs::write(
            &path,
            r#"
            [node]
            name = "node-a"
            data_dir = "/var/lib/mesh"

            [storage]

            [rpc]
            store_timeout = 30
            read_timeout = 30
            per_rpc_timeout = 10

            [supervisor]
            tick_interval = 60
            tick_deadline = 30
            "#,
        )
        .unwrap();

        let cfg = MeshConfig::from_file(&path).unwrap();
        assert_eq!(cfg.node.name, "node-a");
        assert_eq!(cfg.rpc.store_timeout, Duration::from_secs(30));
    }
}
