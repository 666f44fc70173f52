use crate::config::BrokerConfig;
use crate::error::BrokerError;
use crate::partitions::partition::Partition;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Process-lifetime map of open partition handles, keyed by
/// (stream, partition number). Entries are created on first use and never
/// evicted; the mutex is held only for lookup and insert.
pub struct PartitionCache {
    config: Arc<BrokerConfig>,
    partitions: Mutex<HashMap<(String, u32), Arc<Partition>>>,
}

impl PartitionCache {
    pub fn new(config: Arc<BrokerConfig>) -> PartitionCache {
        PartitionCache {
            config,
            partitions: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the partition handle, opening the store on first access. The
    /// partition directory must already exist: the stream registry
    /// materializes partitions before anything opens them for I/O, so an
    /// unknown number surfaces as `PartitionNotFound`.
    pub async fn get(&self, stream: &str, number: u32) -> Result<Arc<Partition>, BrokerError> {
        let mut partitions = self.partitions.lock().await;
        if let Some(partition) = partitions.get(&(stream.to_string(), number)) {
            return Ok(partition.clone());
        }
        let partition = Arc::new(Partition::open(
            stream,
            number,
            &self.config.global.data_dir,
            false,
        )?);
        partitions.insert((stream.to_string(), number), partition.clone());
        Ok(partition)
    }
}
