//! Dataset item generation, full dataset builds, and the cDag.

use rayon::prelude::*;
use sha3::{Digest, Keccak512};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tracing::debug;

use crate::params::{DATASET_PARENTS, HASH_WORDS};

const FNV_PRIME: u32 = 0x0100_0193;

fn fnv1(a: u32, b: u32) -> u32 {
    a.wrapping_mul(FNV_PRIME) ^ b
}

fn keccak_512_words(words: &[u32; HASH_WORDS]) -> [u32; HASH_WORDS] {
    let mut bytes = [0u8; 64];
    for (chunk, word) in bytes.chunks_exact_mut(4).zip(words.iter()) {
        chunk.copy_from_slice(&word.to_le_bytes());
    }
    let mut hasher = Keccak512::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = [0u32; HASH_WORDS];
    for (word, chunk) in out.iter_mut().zip(digest.chunks_exact(4)) {
        *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    out
}

/// Compute one 64-byte dataset item from the epoch cache.
///
/// The item starts as a cache row keyed by `index`, is de-correlated with
/// a Keccak-512, then folds in [`DATASET_PARENTS`] pseudo-randomly
/// addressed cache rows with FNV1 before a final Keccak-512.
pub fn calc_dataset_item(cache: &[u32], index: usize) -> [u32; HASH_WORDS] {
    let rows = cache.len() / HASH_WORDS;

    let mut mix = [0u32; HASH_WORDS];
    mix.copy_from_slice(&cache[(index % rows) * HASH_WORDS..(index % rows + 1) * HASH_WORDS]);
    mix[0] ^= index as u32;
    let mut mix = keccak_512_words(&mix);

    for j in 0..DATASET_PARENTS {
        let parent = fnv1(index as u32 ^ j as u32, mix[j % HASH_WORDS]) as usize % rows;
        for k in 0..HASH_WORDS {
            mix[k] = fnv1(mix[k], cache[parent * HASH_WORDS + k]);
        }
    }

    keccak_512_words(&mix)
}

/// Materialise the cDag: the first [`crate::PROGPOW_CACHE_WORDS`] words
/// of the dataset, read by every ProgPow hash on both the light and full
/// paths.
pub fn generate_cdag(cdag: &mut [u32], cache: &[u32], epoch: u64) {
    let start = Instant::now();
    for (i, chunk) in cdag.chunks_exact_mut(HASH_WORDS).enumerate() {
        chunk.copy_from_slice(&calc_dataset_item(cache, i));
    }
    debug!(
        epoch,
        words = cdag.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Generated cDag"
    );
}

/// Generate the full dataset into `dataset` from the epoch cache.
///
/// Items are independent functions of the read-only cache, so generation
/// shards freely across the rayon pool. Progress is reported in 1% ticks
/// so long builds (minutes at mainnet sizes) stay observable.
pub fn generate_dataset(dataset: &mut [u32], cache: &[u32], epoch: u64) {
    let start = Instant::now();
    let items = dataset.len() / HASH_WORDS;
    let done = AtomicUsize::new(0);
    let tick = (items / 100).max(1);

    dataset
        .par_chunks_exact_mut(HASH_WORDS)
        .enumerate()
        .for_each(|(i, chunk)| {
            chunk.copy_from_slice(&calc_dataset_item(cache, i));
            let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
            if finished % tick == 0 {
                debug!(
                    epoch,
                    percent = finished * 100 / items,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Generating dataset"
                );
            }
        });

    debug!(
        epoch,
        items,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Generated dataset"
    );
}
