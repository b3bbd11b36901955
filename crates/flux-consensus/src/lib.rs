//! # flux-consensus
//!
//! Consensus rules for the Yottaflux blockchain.
//!
//! This crate provides:
//! - The ProgPow consensus engine: header, uncle, and seal verification
//! - Concurrent batch header verification with in-order results
//! - Difficulty adjustment (Byzantium-style, no difficulty bomb)
//! - The block reward schedule and reward accumulation
//! - EIP-1559 base-fee and gas-limit header rules
//!
//! The engine reads chain data through the [`ChainHeaderReader`] and
//! [`ChainReader`] capabilities and credits rewards through [`StateDb`];
//! storage, state, and transaction execution live elsewhere.

mod difficulty;
mod eip1559;
mod engine;
mod error;
pub mod params;
mod rewards;
mod types;

pub use difficulty::{calc_difficulty, calc_difficulty_bounded};
pub use eip1559::{calc_base_fee, verify_eip1559_header, verify_gas_limit};
pub use engine::{
    difficulty_to_target, meets_difficulty, PowMode, Progpow, ProgpowConfig, VerifyAbort,
};
pub use error::{ConsensusError, ConsensusResult};
pub use rewards::{accumulate_rewards, calc_block_reward};
pub use types::{
    empty_uncle_hash, keccak256, Address, Block, ChainConfig, ChainHeaderReader, ChainReader,
    Header, ProgpowChainConfig, StateDb,
};
