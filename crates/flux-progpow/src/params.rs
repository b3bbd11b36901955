//! Epoch parameters: cache/dataset sizing and seed hashes.
//!
//! Caches and datasets depend only on the epoch (30,000-block window).
//! Sizes start from a fixed base, grow linearly per epoch, and are then
//! rounded down so the item count is prime, which keeps the cyclic access
//! pattern of RandMemoHash and the dataset-parent walk well distributed.

use primal::is_prime;
use sha3::{Digest, Keccak256};

/// Blocks per epoch; one cache/dataset pair is shared by the whole epoch.
pub const EPOCH_LENGTH: u64 = 30_000;

/// Bytes per cache item (one Keccak-512 output).
pub const HASH_BYTES: usize = 64;

/// Words per cache item.
pub const HASH_WORDS: usize = HASH_BYTES / 4;

/// Bytes per full dataset item (two 64-byte halves).
pub const MIX_BYTES: usize = 128;

/// Number of cache parents mixed into each dataset item.
pub const DATASET_PARENTS: usize = 256;

/// RandMemoHash rounds applied while generating the cache.
pub const CACHE_ROUNDS: usize = 3;

const CACHE_BYTES_INIT: u64 = 1 << 24;
const CACHE_BYTES_GROWTH: u64 = 1 << 17;
const DATASET_BYTES_INIT: u64 = 1 << 30;
const DATASET_BYTES_GROWTH: u64 = 1 << 23;

/// Cache size used by unit tests and `PowMode::Test` engines.
pub const TEST_CACHE_BYTES: usize = 1024;

/// Dataset size used by unit tests and `PowMode::Test` engines.
pub const TEST_DATASET_BYTES: usize = 32 * 1024;

/// Epoch number for a block.
pub fn epoch(block_number: u64) -> u64 {
    block_number / EPOCH_LENGTH
}

/// Cache size in bytes for an epoch.
///
/// Starts from `16 MiB + 128 KiB * epoch` and steps down by whole items
/// until the item count is prime. This reproduces the historic Ethash
/// size table for every epoch, so no table needs to be baked in.
pub fn cache_size(epoch: u64) -> usize {
    let mut sz = CACHE_BYTES_INIT + CACHE_BYTES_GROWTH * epoch - HASH_BYTES as u64;
    while !is_prime(sz / HASH_BYTES as u64) {
        sz -= 2 * HASH_BYTES as u64;
    }
    sz as usize
}

/// Dataset size in bytes for an epoch.
///
/// Same construction as [`cache_size`] over 128-byte items, starting from
/// `1 GiB + 8 MiB * epoch`.
pub fn dataset_size(epoch: u64) -> usize {
    let mut sz = DATASET_BYTES_INIT + DATASET_BYTES_GROWTH * epoch - MIX_BYTES as u64;
    while !is_prime(sz / MIX_BYTES as u64) {
        sz -= 2 * MIX_BYTES as u64;
    }
    sz as usize
}

/// Seed hash for an epoch: 32 zero bytes at epoch 0, then one extra
/// Keccak-256 application per epoch.
pub fn seed_hash(epoch: u64) -> [u8; 32] {
    let mut seed = [0u8; 32];
    for _ in 0..epoch {
        let mut hasher = Keccak256::new();
        hasher.update(seed);
        seed.copy_from_slice(&hasher.finalize());
    }
    seed
}
