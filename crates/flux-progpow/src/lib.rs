//! # flux-progpow
//!
//! ProgPow proof-of-work algorithm for the Yottaflux blockchain.
//!
//! This crate provides:
//! - Epoch parameters (cache/dataset sizes, seed hashes)
//! - Epoch cache generation (RandMemoHash)
//! - Dataset item and cDag generation
//! - The ProgPow hash kernel (light and full verification paths)
//! - A shared per-epoch artifact manager with single-flight builds
//!
//! ## ProgPow
//!
//! ProgPow is a GPU-tuned extension of Ethash: a period-seeded random
//! program mixes 16 lanes of 32 registers each, reading from a small
//! 16 KiB cache (the cDag) every operation and from the GB-scale dataset
//! once per loop iteration. The dataset depends only on the 30,000-block
//! epoch; the random program depends only on the 10-block period, so all
//! blocks in a period share one instruction sequence.
//!
//! The light verification path regenerates dataset items on the fly from
//! the MB-scale cache; the full path reads a prebuilt dataset. Both paths
//! produce bit-identical results.

mod cache;
mod dataset;
mod keccak;
mod kernel;
mod manager;
pub mod params;

pub use cache::generate_cache;
pub use dataset::{calc_dataset_item, generate_cdag, generate_dataset};
pub use keccak::{keccak_f800_long, keccak_f800_short};
pub use kernel::{
    progpow_full, progpow_light, ProgpowProgram, PROGPOW_CACHE_BYTES, PROGPOW_CACHE_WORDS,
    PROGPOW_CNT_CACHE, PROGPOW_CNT_DAG, PROGPOW_CNT_MATH, PROGPOW_DAG_LOADS, PROGPOW_LANES,
    PROGPOW_PERIOD_LENGTH, PROGPOW_REGS,
};
pub use manager::{Cache, Dataset, EpochManager};
