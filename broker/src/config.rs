use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

pub const DEFAULT_PORT: u16 = 5704;

/// Broker configuration: a `global` section plus per-stream overrides,
/// loaded by the server from YAML and environment variables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub global: GlobalConfig,
    pub streams: HashMap<String, StreamConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    pub data_dir: PathBuf,
    /// Default partition count for newly materialized streams.
    pub partitions: u32,
    /// Default retention in seconds; 0 disables pruning.
    pub ttl: u64,
    pub rebalance_interval: u64,
    pub prune_interval: u64,
    pub receiver_timeout: u64,
    pub port: Option<u16>,
}

impl Default for GlobalConfig {
    fn default() -> GlobalConfig {
        GlobalConfig {
            data_dir: PathBuf::from("./data"),
            partitions: 1,
            ttl: 0,
            rebalance_interval: 10,
            prune_interval: 300,
            receiver_timeout: 30,
            port: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Partition count override; partitions may only be added, never removed.
    pub partitions: Option<u32>,
    pub ttl: Option<u64>,
}

impl BrokerConfig {
    pub fn streams_path(&self) -> PathBuf {
        self.global.data_dir.join("streams")
    }

    pub fn stream_path(&self, stream: &str) -> PathBuf {
        self.streams_path().join(stream)
    }

    pub fn partition_path(&self, stream: &str, number: u32) -> PathBuf {
        self.stream_path(stream).join(number.to_string())
    }

    pub fn partitions_for(&self, stream: &str) -> u32 {
        self.streams
            .get(stream)
            .and_then(|stream| stream.partitions)
            .unwrap_or(self.global.partitions)
    }

    pub fn ttl_for(&self, stream: &str) -> u64 {
        self.streams
            .get(stream)
            .and_then(|stream| stream.ttl)
            .unwrap_or(self.global.ttl)
    }

    pub fn port(&self) -> u16 {
        self.global.port.unwrap_or(DEFAULT_PORT)
    }
}
