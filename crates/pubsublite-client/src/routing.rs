//! Partition routing.
//!
//! Two strategies, chosen per message:
//!
//! 1. **Keyed**: SHA-256 of the key, read as a 256-bit big-endian integer,
//!    modulo the partition count. The same key always lands on the same
//!    partition for a given count, which is what per-key ordering rests on.
//! 2. **Unkeyed**: round-robin over partitions, starting at a random
//!    partition so that many short-lived publishers do not all hammer
//!    partition 0.

use crate::error::{ClientError, Result};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug)]
pub struct RoutingPolicy {
    counter: AtomicU64,
}

impl Default for RoutingPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl RoutingPolicy {
    pub fn new() -> Self {
        Self::with_start(rand::random::<u64>())
    }

    /// Round-robin starting at `start` (mod the partition count).
    pub fn with_start(start: u64) -> Self {
        Self {
            counter: AtomicU64::new(start),
        }
    }

    /// Pick a partition in `[0, partition_count)`.
    ///
    /// Fails with `InvalidArgument` when `partition_count` is 0.
    pub fn route(&self, key: &[u8], partition_count: u32) -> Result<u32> {
        if partition_count == 0 {
            return Err(ClientError::InvalidArgument(
                "cannot route with a partition count of 0".to_string(),
            ));
        }
        if key.is_empty() {
            let next = self.counter.fetch_add(1, Ordering::Relaxed);
            return Ok((next % partition_count as u64) as u32);
        }
        Ok(Self::route_key(key, partition_count))
    }

    fn route_key(key: &[u8], partition_count: u32) -> u32 {
        let digest = Sha256::digest(key);
        // Horner's rule keeps the 256-bit remainder within u64.
        let modulus = partition_count as u64;
        let remainder = digest
            .iter()
            .fold(0u64, |acc, byte| (acc * 256 + *byte as u64) % modulus);
        remainder as u32
    }
}
