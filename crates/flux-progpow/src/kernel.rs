//! The ProgPow hash kernel.
//!
//! A hash evolves 16 lanes of 32 u32 registers. Every 10-block period
//! seeds a KISS99 PRNG that emits one random program: per main-loop
//! iteration, 11 cDag reads, 18 random math ops, and 4 dataset-word
//! merges, with source/destination registers drawn from Fisher-Yates
//! shuffled sequences re-seeded every iteration, so each iteration's
//! sources and destinations form a fresh register permutation. All
//! arithmetic is u32 wrapping; all byte order is little-endian.

use crate::dataset::calc_dataset_item;
use crate::keccak::{keccak_f800_long, keccak_f800_short};
use crate::params::{HASH_WORDS, MIX_BYTES};

/// Parallel lanes per hash.
pub const PROGPOW_LANES: usize = 16;
/// 32-bit registers per lane.
pub const PROGPOW_REGS: usize = 32;
/// Dataset words loaded per lane per main-loop iteration.
pub const PROGPOW_DAG_LOADS: usize = 4;
/// cDag size in bytes.
pub const PROGPOW_CACHE_BYTES: usize = 16 * 1024;
/// cDag size in words.
pub const PROGPOW_CACHE_WORDS: usize = PROGPOW_CACHE_BYTES / 4;
/// Main-loop iterations per hash.
pub const PROGPOW_CNT_DAG: usize = 64;
/// cDag accesses per iteration.
pub const PROGPOW_CNT_CACHE: usize = 11;
/// Random math ops per iteration.
pub const PROGPOW_CNT_MATH: usize = 18;
/// Blocks sharing one random program.
pub const PROGPOW_PERIOD_LENGTH: u64 = 10;

const FNV_PRIME: u32 = 0x0100_0193;
const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;

fn fnv1a(h: &mut u32, d: u32) -> u32 {
    *h = (*h ^ d).wrapping_mul(FNV_PRIME);
    *h
}

/// Marsaglia's KISS99 generator; ProgPow requires its output bit-exact.
#[derive(Clone, Copy, Debug)]
struct Kiss99 {
    z: u32,
    w: u32,
    jsr: u32,
    jcong: u32,
}

impl Kiss99 {
    fn next(&mut self) -> u32 {
        self.z = 36969u32.wrapping_mul(self.z & 65535).wrapping_add(self.z >> 16);
        self.w = 18000u32.wrapping_mul(self.w & 65535).wrapping_add(self.w >> 16);
        let mwc = (self.z << 16).wrapping_add(self.w);
        self.jcong = self.jcong.wrapping_mul(69069).wrapping_add(1234567);
        self.jsr ^= self.jsr << 17;
        self.jsr ^= self.jsr >> 13;
        self.jsr ^= self.jsr << 5;
        (mwc ^ self.jcong).wrapping_add(self.jsr)
    }

    /// Seed from a 64-bit value by chaining FNV1a over its halves.
    fn from_seed(seed: u64) -> Self {
        let mut h = FNV_OFFSET_BASIS;
        let z = fnv1a(&mut h, seed as u32);
        let w = fnv1a(&mut h, (seed >> 32) as u32);
        let jsr = fnv1a(&mut h, seed as u32);
        let jcong = fnv1a(&mut h, (seed >> 32) as u32);
        Kiss99 { z, w, jsr, jcong }
    }
}

/// Initialise one lane's 32 mix registers from the hash seed.
fn fill_mix(seed: u64, lane_id: u32) -> [u32; PROGPOW_REGS] {
    let mut h = FNV_OFFSET_BASIS;
    let z = fnv1a(&mut h, seed as u32);
    let w = fnv1a(&mut h, (seed >> 32) as u32);
    let jsr = fnv1a(&mut h, lane_id);
    let jcong = fnv1a(&mut h, lane_id);
    let mut rng = Kiss99 { z, w, jsr, jcong };

    let mut mix = [0u32; PROGPOW_REGS];
    for reg in mix.iter_mut() {
        *reg = rng.next();
    }
    mix
}

/// The random math op table, selected by `r % 11`.
fn progpow_math(a: u32, b: u32, r: u32) -> u32 {
    match r % 11 {
        0 => a.wrapping_add(b),
        1 => a.wrapping_mul(b),
        2 => ((u64::from(a) * u64::from(b)) >> 32) as u32,
        3 => a.min(b),
        4 => a.rotate_left(b % 32),
        5 => a.rotate_right(b % 32),
        6 => a & b,
        7 => a | b,
        8 => a ^ b,
        9 => a.leading_zeros() + b.leading_zeros(),
        _ => a.count_ones() + b.count_ones(),
    }
}

/// The merge op table, selected by `r % 4`. Merges preserve entropy from
/// the accumulator, so a register never degenerates to a constant.
fn merge(a: u32, b: u32, r: u32) -> u32 {
    match r % 4 {
        0 => a.wrapping_mul(33).wrapping_add(b),
        1 => (a ^ b).wrapping_mul(33),
        2 => a.rotate_left(((r >> 16) % 31) + 1) ^ b,
        _ => a.rotate_right(((r >> 16) % 31) + 1) ^ b,
    }
}

#[derive(Clone, Copy, Debug)]
struct CacheOp {
    src: usize,
    dst: usize,
    merge_r: u32,
}

#[derive(Clone, Copy, Debug)]
struct MathOp {
    src1: usize,
    src2: usize,
    math_r: u32,
    dst: usize,
    merge_r: u32,
}

#[derive(Clone, Copy, Debug)]
struct DagMerge {
    dst: usize,
    merge_r: u32,
}

#[derive(Clone, Debug)]
struct LoopProgram {
    addr_reg: usize,
    cache_ops: [CacheOp; PROGPOW_CNT_CACHE],
    math_ops: [MathOp; PROGPOW_CNT_MATH],
    dag_merges: [DagMerge; PROGPOW_DAG_LOADS],
}

/// The fully expanded random program for one 10-block period.
///
/// Every hash within the period executes the same instruction sequence
/// and dataset-offset schedule; only the seed-derived register contents
/// differ.
#[derive(Clone, Debug)]
pub struct ProgpowProgram {
    loops: Vec<LoopProgram>,
}

impl ProgpowProgram {
    /// Expand the program for the period containing `block_number`.
    pub fn for_block(block_number: u64) -> Self {
        Self::for_period(block_number / PROGPOW_PERIOD_LENGTH)
    }

    /// Expand the program for an explicit period number.
    pub fn for_period(period: u64) -> Self {
        let mut rng = Kiss99::from_seed(period);

        let mut loops = Vec::with_capacity(PROGPOW_CNT_DAG);
        for _ in 0..PROGPOW_CNT_DAG {
            // Re-seed the register sequences for this iteration with
            // fresh Fisher-Yates shuffles. 11 cache dsts + 18 math dsts
            // + 3 dag dsts = 32, so the iteration's destination set is
            // exactly this shuffle's register permutation.
            let mut seq_dst = [0usize; PROGPOW_REGS];
            let mut seq_cache = [0usize; PROGPOW_REGS];
            for i in 0..PROGPOW_REGS {
                seq_dst[i] = i;
                seq_cache[i] = i;
            }
            for i in (1..PROGPOW_REGS).rev() {
                let j = rng.next() as usize % (i + 1);
                seq_dst.swap(i, j);
                let j = rng.next() as usize % (i + 1);
                seq_cache.swap(i, j);
            }

            let mut dst_cnt = 0usize;
            let mut cache_cnt = 0usize;
            let next_dst = |rng_dst: &mut usize| {
                let dst = seq_dst[*rng_dst % PROGPOW_REGS];
                *rng_dst += 1;
                dst
            };

            let addr_reg = rng.next() as usize % PROGPOW_REGS;

            let mut cache_ops = [CacheOp {
                src: 0,
                dst: 0,
                merge_r: 0,
            }; PROGPOW_CNT_CACHE];
            let mut math_ops = [MathOp {
                src1: 0,
                src2: 0,
                math_r: 0,
                dst: 0,
                merge_r: 0,
            }; PROGPOW_CNT_MATH];

            for i in 0..PROGPOW_CNT_CACHE.max(PROGPOW_CNT_MATH) {
                if i < PROGPOW_CNT_CACHE {
                    let src = seq_cache[cache_cnt % PROGPOW_REGS];
                    cache_cnt += 1;
                    let dst = next_dst(&mut dst_cnt);
                    cache_ops[i] = CacheOp {
                        src,
                        dst,
                        merge_r: rng.next(),
                    };
                }
                if i < PROGPOW_CNT_MATH {
                    // Draw a distinct source pair without discarding PRNG
                    // output: one draw picks from the 32*31 ordered pairs.
                    let src_rnd = rng.next() as usize % (PROGPOW_REGS * (PROGPOW_REGS - 1));
                    let src1 = src_rnd % PROGPOW_REGS;
                    let mut src2 = src_rnd / PROGPOW_REGS;
                    if src2 >= src1 {
                        src2 += 1;
                    }
                    let math_r = rng.next();
                    let dst = next_dst(&mut dst_cnt);
                    math_ops[i] = MathOp {
                        src1,
                        src2,
                        math_r,
                        dst,
                        merge_r: rng.next(),
                    };
                }
            }

            let mut dag_merges = [DagMerge { dst: 0, merge_r: 0 }; PROGPOW_DAG_LOADS];
            dag_merges[0] = DagMerge {
                dst: 0,
                merge_r: rng.next(),
            };
            for dag_merge in dag_merges.iter_mut().skip(1) {
                let dst = next_dst(&mut dst_cnt);
                *dag_merge = DagMerge {
                    dst,
                    merge_r: rng.next(),
                };
            }

            loops.push(LoopProgram {
                addr_reg,
                cache_ops,
                math_ops,
                dag_merges,
            });
        }

        ProgpowProgram { loops }
    }
}

/// Core hash over an abstract 64-byte dataset item lookup.
///
/// `lookup` is addressed in 64-byte items, mirroring the dataset layout;
/// one main-loop access reads a 128-byte item as two consecutive halves.
fn progpow<F>(
    header_hash: &[u8; 32],
    nonce: u64,
    block_number: u64,
    dataset_items: usize,
    c_dag: &[u32],
    lookup: F,
) -> ([u8; 32], [u8; 32])
where
    F: Fn(usize) -> [u32; HASH_WORDS],
{
    debug_assert_eq!(c_dag.len(), PROGPOW_CACHE_WORDS);

    let program = ProgpowProgram::for_block(block_number);
    let seed = keccak_f800_short(header_hash, nonce, &[0u32; 8]);

    let mut mix = [[0u32; PROGPOW_REGS]; PROGPOW_LANES];
    for (lane_id, lane) in mix.iter_mut().enumerate() {
        *lane = fill_mix(seed, lane_id as u32);
    }

    for (i, prog) in program.loops.iter().enumerate() {
        // One lane picks the dataset item for everyone this iteration.
        let item_index = mix[i % PROGPOW_LANES][prog.addr_reg] as usize % dataset_items;
        let mut item = [0u32; 2 * HASH_WORDS];
        item[..HASH_WORDS].copy_from_slice(&lookup(2 * item_index));
        item[HASH_WORDS..].copy_from_slice(&lookup(2 * item_index + 1));

        for (lane_id, lane) in mix.iter_mut().enumerate() {
            let mut data_dag = [0u32; PROGPOW_DAG_LOADS];
            for (j, word) in data_dag.iter_mut().enumerate() {
                *word = item[(lane_id * PROGPOW_DAG_LOADS + j) % (2 * HASH_WORDS)];
            }

            for op in &prog.cache_ops {
                let data = c_dag[lane[op.src] as usize % PROGPOW_CACHE_WORDS];
                lane[op.dst] = merge(lane[op.dst], data, op.merge_r);
            }
            for op in &prog.math_ops {
                let data = progpow_math(lane[op.src1], lane[op.src2], op.math_r);
                lane[op.dst] = merge(lane[op.dst], data, op.merge_r);
            }
            for (j, dag_merge) in prog.dag_merges.iter().enumerate() {
                lane[dag_merge.dst] = merge(lane[dag_merge.dst], data_dag[j], dag_merge.merge_r);
            }
        }
    }

    // Reduce each lane to one word, then the 16 lane words to 8.
    let mut lane_digest = [0u32; PROGPOW_LANES];
    for (digest, lane) in lane_digest.iter_mut().zip(mix.iter()) {
        let mut h = FNV_OFFSET_BASIS;
        for &reg in lane.iter() {
            fnv1a(&mut h, reg);
        }
        *digest = h;
    }
    let mut mix_hash = [FNV_OFFSET_BASIS; 8];
    for (lane_id, &digest) in lane_digest.iter().enumerate() {
        fnv1a(&mut mix_hash[lane_id % 8], digest);
    }

    let mut digest_bytes = [0u8; 32];
    for (chunk, word) in digest_bytes.chunks_exact_mut(4).zip(mix_hash.iter()) {
        chunk.copy_from_slice(&word.to_le_bytes());
    }
    let result = keccak_f800_long(header_hash, seed, &mix_hash);
    (digest_bytes, result)
}

/// Light verification path: dataset items are regenerated on the fly
/// from the epoch cache. Returns `(mix_digest, result)`.
pub fn progpow_light(
    dataset_size: usize,
    cache: &[u32],
    header_hash: &[u8; 32],
    nonce: u64,
    block_number: u64,
    c_dag: &[u32],
) -> ([u8; 32], [u8; 32]) {
    let dataset_items = dataset_size / MIX_BYTES;
    progpow(header_hash, nonce, block_number, dataset_items, c_dag, |i| {
        calc_dataset_item(cache, i)
    })
}

/// Full mining path: dataset items are read from the prebuilt dataset.
/// Bit-identical to [`progpow_light`] for the same inputs.
pub fn progpow_full(
    dataset: &[u32],
    header_hash: &[u8; 32],
    nonce: u64,
    block_number: u64,
    c_dag: &[u32],
) -> ([u8; 32], [u8; 32]) {
    let dataset_items = dataset.len() / (MIX_BYTES / 4);
    progpow(header_hash, nonce, block_number, dataset_items, c_dag, |i| {
        let mut item = [0u32; HASH_WORDS];
        item.copy_from_slice(&dataset[i * HASH_WORDS..(i + 1) * HASH_WORDS]);
        item
    })
}
