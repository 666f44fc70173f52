use crate::config::BrokerConfig;
use crate::error::BrokerError;
use crate::partitions::partition::Partition;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// Maps stream names to their sorted partition-number sets.
///
/// A stream is materialized on first reference: existing partition
/// directories are discovered on disk and missing ones are created up to the
/// configured target count. The result is cached for the process lifetime;
/// partition sets only ever grow.
pub struct StreamRegistry {
    config: Arc<BrokerConfig>,
    streams: Mutex<HashMap<String, Vec<u32>>>,
}

impl StreamRegistry {
    pub fn new(config: Arc<BrokerConfig>) -> StreamRegistry {
        StreamRegistry {
            config,
            streams: Mutex::new(HashMap::new()),
        }
    }

    /// The sorted partition numbers of a stream, materializing it on first
    /// use. Partition directories must form a gapless range starting at 0.
    pub async fn partition_numbers(&self, stream: &str) -> Result<Vec<u32>, BrokerError> {
        validate_stream_name(stream)?;
        let mut streams = self.streams.lock().await;
        if let Some(numbers) = streams.get(stream) {
            return Ok(numbers.clone());
        }

        let mut numbers = self.on_disk_partition_numbers(stream).await?;
        for (position, number) in numbers.iter().enumerate() {
            if *number != position as u32 {
                return Err(BrokerError::MissingPartitions {
                    stream: stream.to_string(),
                });
            }
        }

        let existing = numbers.len() as u32;
        let target = self.config.partitions_for(stream);
        if target > existing {
            info!("materializing partitions {existing}..{target} of stream {stream}");
            for number in existing..target {
                // Open with directory creation, then drop the handle; the
                // partition cache opens its own copy for I/O.
                Partition::open(stream, number, &self.config.global.data_dir, true)?;
                numbers.push(number);
            }
        }

        streams.insert(stream.to_string(), numbers.clone());
        Ok(numbers)
    }

    /// Stream directories currently present on disk; used by the prune pass,
    /// which also covers streams nothing has referenced yet.
    pub async fn stream_names(&self) -> Result<Vec<String>, BrokerError> {
        let mut names = Vec::new();
        let path = self.config.streams_path();
        let mut entries = tokio::fs::read_dir(&path).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort_unstable();
        Ok(names)
    }

    /// Numeric partition subdirectories of a stream, sorted. Non-numeric
    /// entries are ignored.
    pub async fn on_disk_partition_numbers(&self, stream: &str) -> Result<Vec<u32>, BrokerError> {
        let mut numbers = Vec::new();
        let path = self.config.stream_path(stream);
        if tokio::fs::metadata(&path)
            .await
            .map(|metadata| metadata.is_dir())
            .unwrap_or(false)
        {
            let mut entries = tokio::fs::read_dir(&path).await?;
            while let Some(entry) = entries.next_entry().await? {
                if let Ok(number) = entry.file_name().to_string_lossy().parse::<u32>() {
                    numbers.push(number);
                }
            }
        }
        numbers.sort_unstable();
        Ok(numbers)
    }
}

fn validate_stream_name(stream: &str) -> Result<(), BrokerError> {
    if stream.is_empty() || stream == "." || stream == ".." || stream.contains(['/', '\\']) {
        return Err(BrokerError::BadRequest(format!(
            "invalid stream name: {stream:?}"
        )));
    }
    Ok(())
}
