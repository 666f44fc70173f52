use crate::error::BrokerError;
use crate::streams::registry::StreamRegistry;
use crate::timestamp;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// stream -> receiver group -> receiver -> assigned partition numbers.
type Assignments = HashMap<String, HashMap<String, HashMap<String, Vec<u32>>>>;

/// Tracks receiver liveness and partition assignments per
/// (stream, receiver group, receiver).
///
/// All state is in-memory: receivers re-register by knocking after a broker
/// restart, and the next rebalance pass rebuilds the assignments. The two
/// maps have their own mutexes; the rebalance pass holds the assignment
/// mutex for its whole duration so assignment updates become visible
/// atomically, while knocks only ever touch the last-seen mutex.
pub struct GroupCoordinator {
    receiver_timeout: u64,
    last_seen: Mutex<HashMap<String, HashMap<String, u64>>>,
    assignments: Mutex<Assignments>,
}

impl GroupCoordinator {
    pub fn new(receiver_timeout: u64) -> GroupCoordinator {
        GroupCoordinator {
            receiver_timeout,
            last_seen: Mutex::new(HashMap::new()),
            assignments: Mutex::new(HashMap::new()),
        }
    }

    /// Refreshes the liveness timestamp of a receiver.
    pub async fn knock(&self, receiver_group: &str, receiver: &str) {
        let mut last_seen = self.last_seen.lock().await;
        last_seen
            .entry(receiver_group.to_string())
            .or_default()
            .insert(receiver.to_string(), timestamp::timestamp_ms());
    }

    /// Returns a copy of the receiver's assigned partitions, registering the
    /// receiver (with an empty list) for the next rebalance when unknown.
    pub async fn assignment(
        &self,
        stream: &str,
        receiver_group: &str,
        receiver: &str,
    ) -> Vec<u32> {
        let mut assignments = self.assignments.lock().await;
        assignments
            .entry(stream.to_string())
            .or_default()
            .entry(receiver_group.to_string())
            .or_default()
            .entry(receiver.to_string())
            .or_default()
            .clone()
    }

    /// Reassigns every stream's partitions across the live receivers of each
    /// of its groups, then drops receivers that have not been seen within
    /// the receiver timeout, groups without receivers and streams without
    /// groups.
    pub async fn rebalance(&self, registry: &StreamRegistry) -> Result<(), BrokerError> {
        let now = timestamp::timestamp_ms();
        let mut assignments = self.assignments.lock().await;
        let seen = self.last_seen.lock().await.clone();
        debug!("rebalancing receiver groups");
        if !assignments.is_empty() {
            info!("assignments: {assignments:?}");
        }

        let mut expired: Vec<(String, String, String)> = Vec::new();
        for (stream, groups) in assignments.iter_mut() {
            let partitions = registry.partition_numbers(stream).await?;
            for (group, receivers) in groups.iter_mut() {
                let mut live = Vec::new();
                for receiver in receivers.keys() {
                    if self.is_live(&seen, group, receiver, now) {
                        live.push(receiver.clone());
                    } else {
                        expired.push((stream.clone(), group.clone(), receiver.clone()));
                    }
                }
                if live.is_empty() {
                    continue;
                }
                live.sort_unstable();
                split_partitions(&partitions, &live, receivers);
            }
        }

        for (stream, group, receiver) in &expired {
            info!("receiver {receiver:?} kicked from group {group:?} of stream {stream:?}");
            if let Some(receivers) = assignments
                .get_mut(stream)
                .and_then(|groups| groups.get_mut(group))
            {
                receivers.remove(receiver);
            }
        }
        if !expired.is_empty() {
            let mut last_seen = self.last_seen.lock().await;
            for (_, group, receiver) in &expired {
                if let Some(receivers) = last_seen.get_mut(group) {
                    receivers.remove(receiver);
                }
            }
            last_seen.retain(|_, receivers| !receivers.is_empty());
        }

        for groups in assignments.values_mut() {
            groups.retain(|_, receivers| !receivers.is_empty());
        }
        assignments.retain(|_, groups| !groups.is_empty());
        Ok(())
    }

    fn is_live(
        &self,
        seen: &HashMap<String, HashMap<String, u64>>,
        receiver_group: &str,
        receiver: &str,
        now: u64,
    ) -> bool {
        let last = seen
            .get(receiver_group)
            .and_then(|receivers| receivers.get(receiver))
            .copied()
            .unwrap_or(0);
        now.saturating_sub(last) / 1000 < self.receiver_timeout
    }
}

/// Splits the partition list across the live receivers in contiguous runs of
/// `total / receivers` each, then deals the remainder out one by one,
/// starting from the first receiver and wrapping from the tail. When there
/// are more receivers than partitions the surplus receivers end up with
/// empty lists, signaling that every partition is covered elsewhere.
fn split_partitions(
    partitions: &[u32],
    live: &[String],
    receivers: &mut HashMap<String, Vec<u32>>,
) {
    let receiver_count = live.len();
    let total = partitions.len().max(receiver_count);
    let step = total / receiver_count;
    let remainder = total % receiver_count;

    for index in (0..total - remainder).step_by(step) {
        let run: Vec<u32> = partitions.iter().skip(index).take(step).copied().collect();
        receivers.insert(live[index / step].clone(), run);
    }
    for index in (total - remainder)..total {
        let mut receiver_index = index as isize - total as isize + 1;
        if receiver_index < 0 {
            receiver_index += receiver_count as isize;
        }
        if let Some(assigned) = receivers.get_mut(&live[receiver_index as usize]) {
            assigned.push(partitions[index]);
        }
    }
}
