mod common;

use broker::partitions::partition::{Partition, PartitionItem};
use broker::timestamp::timestamp_ms;
use broker::BrokerError;
use common::TestSetup;

fn item(value: &[u8]) -> PartitionItem {
    PartitionItem {
        value: value.to_vec(),
        timestamp: timestamp_ms(),
    }
}

fn aged_item(value: &[u8], age_ms: u64) -> PartitionItem {
    PartitionItem {
        value: value.to_vec(),
        timestamp: timestamp_ms() - age_ms,
    }
}

async fn open_partition(setup: &TestSetup) -> Partition {
    Partition::open("events", 0, &setup.config.global.data_dir, true).unwrap()
}

#[tokio::test]
async fn append_assigns_consecutive_indexes() {
    let setup = TestSetup::init(1).await;
    let partition = open_partition(&setup).await;

    for expected in 0..4 {
        let index = partition.append(&item(b"payload")).await.unwrap();
        assert_eq!(index, expected);
    }
    assert_eq!(partition.head_index().await.unwrap(), Some(3));
}

#[tokio::test]
async fn group_read_starts_after_the_committed_offset() {
    let setup = TestSetup::init(1).await;
    let partition = open_partition(&setup).await;
    partition.append(&item(b"a")).await.unwrap();
    partition.append(&item(b"b")).await.unwrap();

    // Without a commit, reads keep returning the first message.
    let first = partition.get("group", None).await.unwrap().unwrap();
    assert_eq!(first.index, 0);
    assert_eq!(first.value, b"a");
    let again = partition.get("group", None).await.unwrap().unwrap();
    assert_eq!(again.index, 0);
    assert_eq!(partition.committed_offset("group").await.unwrap(), None);

    partition.commit(0, "group").await.unwrap();
    let second = partition.get("group", None).await.unwrap().unwrap();
    assert_eq!(second.index, 1);
    assert_eq!(second.value, b"b");

    partition.commit(1, "group").await.unwrap();
    assert_eq!(partition.get("group", None).await.unwrap(), None);
}

#[tokio::test]
async fn explicit_index_reads_do_not_move_offsets() {
    let setup = TestSetup::init(1).await;
    let partition = open_partition(&setup).await;
    partition.append(&item(b"a")).await.unwrap();
    partition.append(&item(b"b")).await.unwrap();

    let polled = partition.get("group", Some(1)).await.unwrap().unwrap();
    assert_eq!(polled.index, 1);
    assert_eq!(polled.value, b"b");
    assert_eq!(partition.get("group", Some(7)).await.unwrap(), None);
    assert_eq!(partition.committed_offset("group").await.unwrap(), None);
}

#[tokio::test]
async fn commits_must_arrive_in_order() {
    let setup = TestSetup::init(1).await;
    let partition = open_partition(&setup).await;
    partition.append(&item(b"x")).await.unwrap();

    partition.commit(0, "group").await.unwrap();

    let repeated = partition.commit(0, "group").await.unwrap_err();
    assert!(matches!(
        repeated,
        BrokerError::OutOfOrderCommit {
            offset: 0,
            expected: 1
        }
    ));
    assert_eq!(
        repeated.to_string(),
        "trying to commit offset 0 but 1 was expected"
    );

    // Nothing was appended at index 1 yet, so it cannot be committed.
    let premature = partition.commit(1, "group").await.unwrap_err();
    assert!(matches!(
        premature,
        BrokerError::CommitBeyondHead { offset: 1 }
    ));

    partition.append(&item(b"y")).await.unwrap();
    partition.commit(1, "group").await.unwrap();
    assert_eq!(partition.committed_offset("group").await.unwrap(), Some(1));
}

#[tokio::test]
async fn groups_commit_independently() {
    let setup = TestSetup::init(1).await;
    let partition = open_partition(&setup).await;
    partition.append(&item(b"a")).await.unwrap();
    partition.append(&item(b"b")).await.unwrap();

    partition.commit(0, "alpha").await.unwrap();
    partition.commit(1, "alpha").await.unwrap();

    let beta = partition.get("beta", None).await.unwrap().unwrap();
    assert_eq!(beta.index, 0);
    assert_eq!(partition.committed_offset("alpha").await.unwrap(), Some(1));
    assert_eq!(partition.committed_offset("beta").await.unwrap(), None);
}

#[tokio::test]
async fn set_offset_clamps_to_the_head() {
    let setup = TestSetup::init(1).await;
    let partition = open_partition(&setup).await;
    for value in [b"a", b"b", b"c", b"d", b"e"] {
        partition.append(&item(value)).await.unwrap();
    }

    partition.set_offset("group", 999).await.unwrap();
    assert_eq!(partition.committed_offset("group").await.unwrap(), Some(4));
    assert_eq!(partition.get("group", None).await.unwrap(), None);

    partition.set_offset("group", 1).await.unwrap();
    let polled = partition.get("group", None).await.unwrap().unwrap();
    assert_eq!(polled.index, 2);
    assert_eq!(polled.value, b"c");
}

#[tokio::test]
async fn set_offset_on_an_empty_log_clears_the_entry() {
    let setup = TestSetup::init(1).await;
    let partition = open_partition(&setup).await;

    partition.set_offset("group", 3).await.unwrap();
    assert_eq!(partition.committed_offset("group").await.unwrap(), None);
    assert_eq!(partition.get("group", None).await.unwrap(), None);
}

#[tokio::test]
async fn prune_deletes_the_expired_prefix_and_reads_skip_the_hole() {
    let setup = TestSetup::init(1).await;
    let partition = open_partition(&setup).await;
    partition.append(&aged_item(b"a", 10_000)).await.unwrap();
    partition.append(&aged_item(b"b", 10_000)).await.unwrap();
    partition.append(&aged_item(b"c", 10_000)).await.unwrap();

    let pruned = partition.prune(1).await.unwrap();
    assert_eq!(pruned, 3);

    // The head survives the prune; the reader fast-forwards over the hole
    // up to it and ends with the read position at the head.
    assert_eq!(partition.head_index().await.unwrap(), Some(2));
    assert_eq!(partition.get("group", None).await.unwrap(), None);
    assert_eq!(partition.committed_offset("group").await.unwrap(), Some(1));

    let index = partition.append(&item(b"d")).await.unwrap();
    assert_eq!(index, 3);
    let polled = partition.get("group", None).await.unwrap().unwrap();
    assert_eq!(polled.index, 3);
    assert_eq!(polled.value, b"d");
}

#[tokio::test]
async fn prune_stops_at_the_first_fresh_message() {
    let setup = TestSetup::init(1).await;
    let partition = open_partition(&setup).await;
    partition.append(&aged_item(b"stale", 60_000)).await.unwrap();
    partition.append(&aged_item(b"young", 5_000)).await.unwrap();
    partition.append(&item(b"fresh")).await.unwrap();

    let pruned = partition.prune(30).await.unwrap();
    assert_eq!(pruned, 1);

    let polled = partition.get("group", None).await.unwrap().unwrap();
    assert_eq!(polled.index, 1);
    assert_eq!(polled.value, b"young");
}

#[tokio::test]
async fn prune_with_zero_ttl_is_a_no_op() {
    let setup = TestSetup::init(1).await;
    let partition = open_partition(&setup).await;
    partition.append(&aged_item(b"old", 600_000)).await.unwrap();

    assert_eq!(partition.prune(0).await.unwrap(), 0);
    assert!(partition.get("group", None).await.unwrap().is_some());
}

#[tokio::test]
async fn offsets_survive_reopening_the_partition() {
    let setup = TestSetup::init(1).await;
    {
        let partition = open_partition(&setup).await;
        partition.append(&item(b"a")).await.unwrap();
        partition.append(&item(b"b")).await.unwrap();
        partition.commit(0, "group").await.unwrap();
    }

    let reopened = Partition::open("events", 0, &setup.config.global.data_dir, false).unwrap();
    assert_eq!(reopened.head_index().await.unwrap(), Some(1));
    assert_eq!(reopened.committed_offset("group").await.unwrap(), Some(0));
    let polled = reopened.get("group", None).await.unwrap().unwrap();
    assert_eq!(polled.index, 1);
}

#[tokio::test]
async fn opening_a_missing_partition_without_create_fails() {
    let setup = TestSetup::init(1).await;
    let error = Partition::open("events", 7, &setup.config.global.data_dir, false).unwrap_err();
    assert!(matches!(
        error,
        BrokerError::PartitionNotFound { partition: 7, .. }
    ));
}

#[tokio::test]
async fn legacy_double_packed_values_still_decode() {
    let setup = TestSetup::init(1).await;
    let path = setup.config.partition_path("events", 0);
    {
        // A legacy writer packed the item map, then stored that buffer
        // packed once more as a raw byte string.
        let store = sled::open(&path).unwrap();
        let inner = rmp_serde::to_vec_named(&PartitionItem {
            value: b"legacy".to_vec(),
            timestamp: timestamp_ms(),
        })
        .unwrap();
        let wrapped = rmp_serde::to_vec(&serde_bytes::ByteBuf::from(inner)).unwrap();
        let mut key = vec![0u8];
        key.extend_from_slice(&0u64.to_be_bytes());
        store.insert(key, wrapped).unwrap();
        store.insert([1u8], &0u64.to_be_bytes()).unwrap();
        store.flush().unwrap();
    }

    let partition = Partition::open("events", 0, &setup.config.global.data_dir, false).unwrap();
    let polled = partition.get("group", None).await.unwrap().unwrap();
    assert_eq!(polled.index, 0);
    assert_eq!(polled.value, b"legacy");
}

#[tokio::test]
async fn append_fails_once_the_index_space_is_exhausted() {
    let setup = TestSetup::init(1).await;
    let path = setup.config.partition_path("events", 0);
    {
        let store = sled::open(&path).unwrap();
        store.insert([1u8], &u64::MAX.to_be_bytes()).unwrap();
        store.flush().unwrap();
    }

    let partition = Partition::open("events", 0, &setup.config.global.data_dir, false).unwrap();
    let error = partition.append(&item(b"overflow")).await.unwrap_err();
    assert!(matches!(error, BrokerError::CapacityExceeded));
}
