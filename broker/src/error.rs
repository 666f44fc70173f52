use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("partition {partition} does not exist in stream {stream}")]
    PartitionNotFound { stream: String, partition: u32 },
    #[error("missing partitions in stream {stream}")]
    MissingPartitions { stream: String },
    #[error("trying to commit offset {offset} but {expected} was expected")]
    OutOfOrderCommit { offset: u64, expected: u64 },
    #[error("trying to commit offset {offset} beyond the head index")]
    CommitBeyondHead { offset: u64 },
    #[error("partition index capacity exceeded")]
    CapacityExceeded,
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),
    #[error("cannot decode stored value: {0}")]
    Codec(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl BrokerError {
    /// Failures that are part of normal broker use; the dispatcher reports
    /// them to the client in-band with an ERROR status instead of failing
    /// the request at the transport level.
    pub fn is_operational(&self) -> bool {
        matches!(
            self,
            BrokerError::PartitionNotFound { .. }
                | BrokerError::MissingPartitions { .. }
                | BrokerError::OutOfOrderCommit { .. }
                | BrokerError::CommitBeyondHead { .. }
                | BrokerError::CapacityExceeded
        )
    }
}
