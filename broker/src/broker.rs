use crate::config::BrokerConfig;
use crate::envelope::{
    CommitMessageResponse, Envelope, ErrorResponse, GetMessageResponse, GetPartitionsResponse,
    KnockResponse, Params, PutMessageResponse, SetOffsetResponse, Status, WireFormat,
};
use crate::error::BrokerError;
use crate::groups::coordinator::GroupCoordinator;
use crate::partitioning;
use crate::partitions::cache::PartitionCache;
use crate::partitions::partition::PartitionItem;
use crate::streams::registry::StreamRegistry;
use crate::timestamp;
use rand::Rng;
use serde::Serialize;
use serde_bytes::ByteBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The broker engine: streams of durable partitions, receiver-group
/// coordination and the method dispatcher the transport calls into.
pub struct Broker {
    config: Arc<BrokerConfig>,
    registry: StreamRegistry,
    partitions: PartitionCache,
    coordinator: GroupCoordinator,
}

impl Broker {
    pub fn new(config: BrokerConfig) -> Broker {
        let config = Arc::new(config);
        Broker {
            registry: StreamRegistry::new(config.clone()),
            partitions: PartitionCache::new(config.clone()),
            coordinator: GroupCoordinator::new(config.global.receiver_timeout),
            config,
        }
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Decodes an envelope, dispatches the method and encodes the response
    /// with the same wire format the request used.
    ///
    /// Operational failures are reported in-band with an ERROR status. An
    /// `Err` return means the transport should answer with a protocol-level
    /// failure instead: 400 for `BadRequest`, 500 for anything else.
    pub async fn handle(&self, bytes: &[u8]) -> Result<Vec<u8>, BrokerError> {
        let format = WireFormat::detect(bytes);
        let envelope: Envelope = format.decode(bytes)?;
        let params = envelope
            .params
            .ok_or_else(|| BrokerError::BadRequest("missing params".to_string()))?;

        match envelope.method.as_str() {
            "knock" => {
                let response = self
                    .knock(params.receiver_group()?, params.receiver()?)
                    .await;
                format.encode(&response)
            }
            "put_message" => {
                let result = self
                    .put_message(
                        params.stream()?,
                        params.value()?.to_vec(),
                        params.key.as_deref(),
                        params.partition,
                    )
                    .await;
                respond(format, &params, result)
            }
            "get_message" => {
                let result = self
                    .get_message(
                        params.stream()?,
                        params.receiver_group()?,
                        params.receiver()?,
                        params.index,
                    )
                    .await;
                respond(format, &params, result)
            }
            "get_partitions" => {
                let result = self
                    .get_partitions(
                        params.stream()?,
                        params.receiver_group()?,
                        params.receiver()?,
                    )
                    .await;
                respond(format, &params, result)
            }
            "commit_message" => {
                let result = self
                    .commit_message(
                        params.stream()?,
                        params.partition()?,
                        params.index()?,
                        params.receiver_group()?,
                    )
                    .await;
                respond(format, &params, result)
            }
            "set_offset" => {
                let result = self
                    .set_offset(
                        params.stream()?,
                        params.partition()?,
                        params.index()?,
                        params.receiver_group()?,
                    )
                    .await;
                respond(format, &params, result)
            }
            method => Err(BrokerError::BadRequest(format!(
                "unknown method: {method}"
            ))),
        }
    }

    /// Registers a liveness heartbeat for the receiver.
    pub async fn knock(&self, receiver_group: &str, receiver: &str) -> KnockResponse {
        self.coordinator.knock(receiver_group, receiver).await;
        info!("{receiver_group}/{receiver} is knocking");
        KnockResponse {
            receiver_group: receiver_group.to_string(),
            receiver: receiver.to_string(),
            status: Status::Ok,
        }
    }

    /// Appends a message to the stream. An explicit partition must exist;
    /// without one the partition is derived from the key, or picked at
    /// random.
    pub async fn put_message(
        &self,
        stream: &str,
        value: Vec<u8>,
        key: Option<&str>,
        partition: Option<u32>,
    ) -> Result<PutMessageResponse, BrokerError> {
        let numbers = self.registry.partition_numbers(stream).await?;
        let number = match partition {
            Some(number) => {
                if !numbers.contains(&number) {
                    return Err(BrokerError::PartitionNotFound {
                        stream: stream.to_string(),
                        partition: number,
                    });
                }
                number
            }
            None => partitioning::pick_partition(&numbers, key)?,
        };

        let timestamp = timestamp::timestamp_ms();
        let item = PartitionItem { value, timestamp };
        let partition = self.partitions.get(stream, number).await?;
        let index = partition.append(&item).await?;
        debug!("appended message {index} to {stream}/{number}");

        Ok(PutMessageResponse {
            stream: stream.to_string(),
            partition: number,
            index,
            timestamp,
            status: Status::Ok,
        })
    }

    /// Polls the receiver's assigned partitions in uniformly random order
    /// until one yields a message. An empty assignment means every partition
    /// is covered by other receivers of the group; exhausting the assignment
    /// without a hit is the end of the stream for now.
    pub async fn get_message(
        &self,
        stream: &str,
        receiver_group: &str,
        receiver: &str,
        index: Option<u64>,
    ) -> Result<GetMessageResponse, BrokerError> {
        self.coordinator.knock(receiver_group, receiver).await;
        let mut remaining = self
            .coordinator
            .assignment(stream, receiver_group, receiver)
            .await;

        if remaining.is_empty() {
            return Ok(empty_get_response(
                stream,
                receiver_group,
                receiver,
                remaining,
                Status::AllPartitionsAssigned,
            ));
        }

        while !remaining.is_empty() {
            let position = rand::thread_rng().gen_range(0..remaining.len());
            let number = remaining.remove(position);
            let partition = self.partitions.get(stream, number).await?;
            let Some(message) = partition.get(receiver_group, index).await? else {
                continue;
            };
            return Ok(GetMessageResponse {
                stream: stream.to_string(),
                receiver_group: receiver_group.to_string(),
                receiver: receiver.to_string(),
                partition: Some(number),
                index: Some(message.index),
                value: Some(ByteBuf::from(message.value)),
                timestamp: Some(message.timestamp),
                assigned_partitions: remaining,
                status: Status::Ok,
            });
        }

        Ok(empty_get_response(
            stream,
            receiver_group,
            receiver,
            remaining,
            Status::EndOfStream,
        ))
    }

    /// Returns the receiver's current assignment, refreshing its liveness.
    pub async fn get_partitions(
        &self,
        stream: &str,
        receiver_group: &str,
        receiver: &str,
    ) -> Result<GetPartitionsResponse, BrokerError> {
        self.coordinator.knock(receiver_group, receiver).await;
        let assigned_partitions = self
            .coordinator
            .assignment(stream, receiver_group, receiver)
            .await;
        Ok(GetPartitionsResponse {
            stream: stream.to_string(),
            receiver_group: receiver_group.to_string(),
            receiver: receiver.to_string(),
            assigned_partitions,
        })
    }

    /// Acknowledges a message for the group; only the index right after the
    /// group's committed offset is accepted.
    pub async fn commit_message(
        &self,
        stream: &str,
        partition: u32,
        index: u64,
        receiver_group: &str,
    ) -> Result<CommitMessageResponse, BrokerError> {
        let partition = self.partitions.get(stream, partition).await?;
        partition.commit(index, receiver_group).await?;
        Ok(CommitMessageResponse {
            stream: stream.to_string(),
            receiver_group: receiver_group.to_string(),
            status: Status::Ok,
        })
    }

    /// Moves the group's offset on one partition, clamped to its head.
    pub async fn set_offset(
        &self,
        stream: &str,
        partition: u32,
        index: u64,
        receiver_group: &str,
    ) -> Result<SetOffsetResponse, BrokerError> {
        let handle = self.partitions.get(stream, partition).await?;
        handle.set_offset(receiver_group, index).await?;
        Ok(SetOffsetResponse {
            stream: stream.to_string(),
            partition,
            index,
            receiver_group: receiver_group.to_string(),
            status: Status::Ok,
        })
    }

    /// Reassigns partitions to live receivers; driven by the rebalance loop.
    pub async fn rebalance(&self) -> Result<(), BrokerError> {
        self.coordinator.rebalance(&self.registry).await
    }

    /// Prunes every on-disk partition by its stream's retention; driven by
    /// the prune loop.
    pub async fn prune_all(&self) -> Result<(), BrokerError> {
        for stream in self.registry.stream_names().await? {
            let ttl = self.config.ttl_for(&stream);
            if ttl == 0 {
                debug!("pruning disabled for stream {stream}");
                continue;
            }
            for number in self.registry.on_disk_partition_numbers(&stream).await? {
                info!("pruning stream {stream} ({number})");
                let partition = self.partitions.get(&stream, number).await?;
                let pruned = partition.prune(ttl).await?;
                if pruned > 0 {
                    info!("pruned {pruned} messages from {stream}/{number}");
                }
            }
        }
        Ok(())
    }
}

fn respond<T: Serialize>(
    format: WireFormat,
    params: &Params,
    result: Result<T, BrokerError>,
) -> Result<Vec<u8>, BrokerError> {
    match result {
        Ok(response) => format.encode(&response),
        Err(error) if error.is_operational() => {
            warn!("operation failed: {error}");
            format.encode(&ErrorResponse {
                stream: params.stream.clone(),
                receiver_group: params.receiver_group.clone(),
                error: error.to_string(),
                status: Status::Error,
            })
        }
        Err(error) => Err(error),
    }
}

fn empty_get_response(
    stream: &str,
    receiver_group: &str,
    receiver: &str,
    assigned_partitions: Vec<u32>,
    status: Status,
) -> GetMessageResponse {
    GetMessageResponse {
        stream: stream.to_string(),
        receiver_group: receiver_group.to_string(),
        receiver: receiver.to_string(),
        partition: None,
        index: None,
        value: None,
        timestamp: None,
        assigned_partitions,
        status,
    }
}
