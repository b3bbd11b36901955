//! Epoch cache generation (RandMemoHash).

use sha3::{Digest, Keccak512};
use std::time::Instant;
use tracing::debug;

use crate::params::{CACHE_ROUNDS, HASH_BYTES, HASH_WORDS};

fn keccak_512(data: &[u8]) -> [u8; 64] {
    let mut hasher = Keccak512::new();
    hasher.update(data);
    let mut out = [0u8; 64];
    out.copy_from_slice(&hasher.finalize());
    out
}

fn read_item(cache: &[u32], index: usize) -> [u8; 64] {
    let mut out = [0u8; 64];
    for (chunk, word) in out
        .chunks_exact_mut(4)
        .zip(&cache[index * HASH_WORDS..(index + 1) * HASH_WORDS])
    {
        chunk.copy_from_slice(&word.to_le_bytes());
    }
    out
}

fn write_item(cache: &mut [u32], index: usize, bytes: &[u8; 64]) {
    for (word, chunk) in cache[index * HASH_WORDS..(index + 1) * HASH_WORDS]
        .iter_mut()
        .zip(bytes.chunks_exact(4))
    {
        *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
}

/// Populate an epoch cache in place from its seed hash.
///
/// The cache is a word array whose length must be a multiple of 16 (one
/// 64-byte item per 16 words). Generation first fills the cache as a
/// Keccak-512 chain seeded by `seed`, then applies [`CACHE_ROUNDS`] rounds
/// of Sergio Demian Lerner's RandMemoHash: each item is replaced by the
/// hash of its predecessor XORed with a pseudo-randomly addressed item.
pub fn generate_cache(cache: &mut [u32], epoch: u64, seed: &[u8; 32]) {
    let start = Instant::now();
    let items = cache.len() / HASH_WORDS;

    let mut item = keccak_512(seed);
    write_item(cache, 0, &item);
    for i in 1..items {
        item = keccak_512(&item);
        write_item(cache, i, &item);
    }

    let mut temp = [0u8; HASH_BYTES];
    for _ in 0..CACHE_ROUNDS {
        for i in 0..items {
            let src = read_item(cache, (i + items - 1) % items);
            let xor_index = cache[i * HASH_WORDS] as usize % items;
            let xor = read_item(cache, xor_index);
            for j in 0..HASH_BYTES {
                temp[j] = src[j] ^ xor[j];
            }
            write_item(cache, i, &keccak_512(&temp));
        }
    }

    debug!(
        epoch,
        items,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Generated epoch cache"
    );
}
