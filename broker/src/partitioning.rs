//! Partition selection for produced messages.

use crate::error::BrokerError;
use rand::Rng;
use sha3::{Digest, Sha3_256};

/// Picks the target partition for a message: deterministically from the key
/// when one is given, uniformly at random otherwise.
///
/// The key-based choice sums the hex digits of the SHA3-256 digest of the
/// key and indexes the sorted partition list with the sum modulo the
/// partition count, so a key always lands in the same partition as long as
/// the partition set does not change.
pub fn pick_partition(numbers: &[u32], key: Option<&str>) -> Result<u32, BrokerError> {
    if numbers.is_empty() {
        return Err(BrokerError::BadRequest(
            "the stream has no partitions".to_string(),
        ));
    }
    let index = match key {
        Some(key) => {
            let digest = Sha3_256::digest(key.as_bytes());
            let sum: u64 = digest
                .iter()
                .map(|byte| u64::from((byte >> 4) + (byte & 0x0f)))
                .sum();
            (sum % numbers.len() as u64) as usize
        }
        None => rand::thread_rng().gen_range(0..numbers.len()),
    };
    Ok(numbers[index])
}

#[cfg(test)]
mod tests {
    use super::*;
    use sha3::{Digest, Sha3_256};

    #[test]
    fn keyed_choice_is_deterministic() {
        let numbers = [0, 1, 2];
        let first = pick_partition(&numbers, Some("hello")).unwrap();
        for _ in 0..10 {
            assert_eq!(pick_partition(&numbers, Some("hello")).unwrap(), first);
        }
    }

    #[test]
    fn keyed_choice_matches_the_hex_digit_sum() {
        // Recompute the expected partition from the lowercase hex rendering
        // of the digest, digit by digit, as clients do.
        let numbers = [0, 1, 2, 3, 4];
        for key in ["hello", "stopover", "receiver-17"] {
            let hex = format!("{:x}", Sha3_256::digest(key.as_bytes()));
            let sum: u64 = hex
                .chars()
                .map(|digit| u64::from(digit.to_digit(16).unwrap()))
                .sum();
            let expected = numbers[(sum % numbers.len() as u64) as usize];
            assert_eq!(pick_partition(&numbers, Some(key)).unwrap(), expected);
        }
    }

    #[test]
    fn random_choice_stays_within_the_set() {
        let numbers = [3, 5, 8];
        for _ in 0..50 {
            let picked = pick_partition(&numbers, None).unwrap();
            assert!(numbers.contains(&picked));
        }
    }

    #[test]
    fn empty_partition_set_is_rejected() {
        assert!(pick_partition(&[], None).is_err());
        assert!(pick_partition(&[], Some("hello")).is_err());
    }
}
