use crate::codec;
use crate::error::BrokerError;
use crate::timestamp;
use serde::{Deserialize, Serialize};
use sled::Batch;
use std::path::Path;
use tokio::sync::Mutex;
use tracing::debug;

/// One-byte tags separating the three key spaces sharing a partition's
/// ordered store. Message keys append a big-endian u64 index, so the store
/// iterates them in ascending index order; offset keys append the UTF-8
/// receiver group name.
const MESSAGE: u8 = 0x00;
const INDEX: u8 = 0x01;
const OFFSET: u8 = 0x02;

/// A single message as stored in a partition's log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionItem {
    #[serde(with = "serde_bytes")]
    pub value: Vec<u8>,
    pub timestamp: u64,
}

/// A message handed to a consumer, together with its position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolledMessage {
    pub index: u64,
    pub value: Vec<u8>,
    pub timestamp: u64,
}

/// One append-only log of a stream.
///
/// The head index counts every append ever made; group offsets track the
/// last index each receiver group committed. Both are `None` while no entry
/// exists yet. All mutating operations, and reads that may fast-forward a
/// group offset over pruned messages, serialize on the partition mutex.
#[derive(Debug)]
pub struct Partition {
    pub stream: String,
    pub number: u32,
    store: Mutex<sled::Db>,
}

impl Partition {
    /// Opens the partition log at `<data_dir>/streams/<stream>/<number>`.
    ///
    /// With `create_if_missing` the directory is created first; otherwise a
    /// missing directory is an error, since partitions are materialized by
    /// the stream registry before they are opened for I/O.
    pub fn open(
        stream: &str,
        number: u32,
        data_dir: &Path,
        create_if_missing: bool,
    ) -> Result<Partition, BrokerError> {
        let path = data_dir
            .join("streams")
            .join(stream)
            .join(number.to_string());
        if create_if_missing {
            std::fs::create_dir_all(&path)?;
        } else if !path.is_dir() {
            return Err(BrokerError::PartitionNotFound {
                stream: stream.to_string(),
                partition: number,
            });
        }
        let store = sled::open(&path)?;
        Ok(Partition {
            stream: stream.to_string(),
            number,
            store: Mutex::new(store),
        })
    }

    /// Appends an item at the next index and returns that index. The message
    /// entry and the head-index bump are written in one atomic batch.
    pub async fn append(&self, item: &PartitionItem) -> Result<u64, BrokerError> {
        let store = self.store.lock().await;
        let index = match head_index(&store)? {
            Some(head) => head.checked_add(1).ok_or(BrokerError::CapacityExceeded)?,
            None => 0,
        };
        let mut batch = Batch::default();
        batch.insert(&message_key(index)[..], codec::pack(item)?);
        batch.insert(&[INDEX][..], &index.to_be_bytes()[..]);
        store.apply_batch(batch)?;
        store.flush_async().await?;
        Ok(index)
    }

    /// Reads a message for the group.
    ///
    /// An explicit index is a pure lookup. Otherwise the read starts right
    /// after the group's committed offset; when that message was pruned away
    /// and more lie ahead, the offset is advanced (and persisted) one hole
    /// at a time until a present message or the head is reached.
    pub async fn get(
        &self,
        receiver_group: &str,
        index: Option<u64>,
    ) -> Result<Option<PolledMessage>, BrokerError> {
        let store = self.store.lock().await;
        if let Some(index) = index {
            return Ok(load_item(&store, index)?.map(|item| polled(index, item)));
        }

        let head = head_index(&store)?;
        let mut target = match committed_offset(&store, receiver_group)? {
            Some(committed) => committed.checked_add(1).ok_or(BrokerError::CapacityExceeded)?,
            None => 0,
        };
        loop {
            if let Some(item) = load_item(&store, target)? {
                return Ok(Some(polled(target, item)));
            }
            match head {
                Some(head) if target < head => {
                    store.insert(offset_key(receiver_group), &target.to_be_bytes()[..])?;
                    target += 1;
                }
                _ => return Ok(None),
            }
        }
    }

    /// Acknowledges the message at `offset` for the group. Commits must
    /// arrive strictly in order: only `committed + 1` is accepted, and never
    /// past the head.
    pub async fn commit(&self, offset: u64, receiver_group: &str) -> Result<(), BrokerError> {
        let store = self.store.lock().await;
        let expected = match committed_offset(&store, receiver_group)? {
            Some(committed) => committed.checked_add(1).ok_or(BrokerError::CapacityExceeded)?,
            None => 0,
        };
        if offset != expected {
            return Err(BrokerError::OutOfOrderCommit { offset, expected });
        }
        if head_index(&store)?.map_or(true, |head| offset > head) {
            return Err(BrokerError::CommitBeyondHead { offset });
        }
        store.insert(offset_key(receiver_group), &offset.to_be_bytes()[..])?;
        store.flush_async().await?;
        Ok(())
    }

    /// Moves the group offset anywhere within the log; seeking past the head
    /// clamps to the head.
    pub async fn set_offset(&self, receiver_group: &str, offset: u64) -> Result<(), BrokerError> {
        let store = self.store.lock().await;
        match head_index(&store)? {
            Some(head) => {
                let clamped = offset.min(head);
                store.insert(offset_key(receiver_group), &clamped.to_be_bytes()[..])?;
            }
            None => {
                // An empty log has no committable position; clear the entry
                // so the group reads from the start once messages arrive.
                store.remove(offset_key(receiver_group))?;
            }
        }
        store.flush_async().await?;
        Ok(())
    }

    /// Deletes the prefix of messages older than `ttl_seconds`, stopping at
    /// the first fresh one. The head index and group offsets are left
    /// untouched; group reads skip the hole. Returns the number of deleted
    /// messages.
    pub async fn prune(&self, ttl_seconds: u64) -> Result<u64, BrokerError> {
        if ttl_seconds == 0 {
            return Ok(0);
        }
        let ttl_ms = ttl_seconds.saturating_mul(1000);
        let now = timestamp::timestamp_ms();

        let store = self.store.lock().await;
        let mut stale_keys = Vec::new();
        for entry in store.scan_prefix([MESSAGE]) {
            let (key, value) = entry?;
            let item = decode_item(&value)?;
            if now.saturating_sub(item.timestamp) < ttl_ms {
                break;
            }
            stale_keys.push(key);
        }
        let pruned = stale_keys.len() as u64;
        for key in stale_keys {
            debug!(
                "deleting {:?} from {}/{}",
                key.as_ref(),
                self.stream,
                self.number
            );
            store.remove(key)?;
        }
        if pruned > 0 {
            store.flush_async().await?;
        }
        Ok(pruned)
    }

    /// The highest index ever assigned, or `None` while the log is empty.
    pub async fn head_index(&self) -> Result<Option<u64>, BrokerError> {
        let store = self.store.lock().await;
        head_index(&store)
    }

    /// The last index the group committed, or `None` before any commit.
    pub async fn committed_offset(
        &self,
        receiver_group: &str,
    ) -> Result<Option<u64>, BrokerError> {
        let store = self.store.lock().await;
        committed_offset(&store, receiver_group)
    }
}

fn message_key(index: u64) -> [u8; 9] {
    let mut key = [0u8; 9];
    key[0] = MESSAGE;
    key[1..].copy_from_slice(&index.to_be_bytes());
    key
}

fn offset_key(receiver_group: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + receiver_group.len());
    key.push(OFFSET);
    key.extend_from_slice(receiver_group.as_bytes());
    key
}

fn head_index(store: &sled::Db) -> Result<Option<u64>, BrokerError> {
    store.get([INDEX])?.map(|value| decode_u64(&value)).transpose()
}

fn committed_offset(store: &sled::Db, receiver_group: &str) -> Result<Option<u64>, BrokerError> {
    store
        .get(offset_key(receiver_group))?
        .map(|value| decode_u64(&value))
        .transpose()
}

fn load_item(store: &sled::Db, index: u64) -> Result<Option<PartitionItem>, BrokerError> {
    store
        .get(message_key(index))?
        .map(|value| decode_item(&value))
        .transpose()
}

/// Stored values are MessagePack maps; values written by older deployments
/// may be wrapped once more as a raw MessagePack byte string.
fn decode_item(value: &[u8]) -> Result<PartitionItem, BrokerError> {
    if let Ok(item) = codec::unpack::<PartitionItem>(value) {
        return Ok(item);
    }
    let legacy: serde_bytes::ByteBuf = codec::unpack(value)?;
    codec::unpack(&legacy)
}

fn decode_u64(value: &sled::IVec) -> Result<u64, BrokerError> {
    value
        .as_ref()
        .try_into()
        .map(u64::from_be_bytes)
        .map_err(|_| BrokerError::Codec("stored index is not 8 bytes".to_string()))
}

fn polled(index: u64, item: PartitionItem) -> PolledMessage {
    PolledMessage {
        index,
        value: item.value,
        timestamp: item.timestamp,
    }
}
