//! Yottaflux protocol constants.

use ethereum_types::U256;

/// Maximum header extra-data size in bytes.
pub const MAXIMUM_EXTRA_DATA_SIZE: usize = 32;

/// Absolute gas limit cap (2^63 - 1).
pub const MAX_GAS_LIMIT: u64 = 0x7fff_ffff_ffff_ffff;

/// Minimum gas limit a block may carry.
pub const MIN_GAS_LIMIT: u64 = 5_000;

/// Per-block gas-limit adjustment bound divisor.
pub const GAS_LIMIT_BOUND_DIVISOR: u64 = 1_024;

/// Difficulty adjustment bound divisor.
pub const DIFFICULTY_BOUND_DIVISOR: u64 = 2_048;

/// Floor for the difficulty adjustment.
pub const MINIMUM_DIFFICULTY: u64 = 131_072;

/// Seconds a header may run ahead of wall-clock time.
pub const ALLOWED_FUTURE_BLOCK_TIME_SECS: u64 = 15;

/// Maximum uncles per block.
pub const MAX_UNCLES: usize = 2;

/// Ancestor window within which an uncle's parent must fall.
pub const UNCLE_ANCESTOR_WINDOW: u64 = 7;

/// Blocks per year at the 15-second target interval.
pub const BLOCKS_PER_YEAR: u64 = 2_102_400;

/// Last block (exclusive) of the 2x early-miner bonus.
pub const EARLY_BONUS_END_BLOCK: u64 = 150_000;

/// First block of the fixed tail emission (20 years in).
pub const TAIL_EMISSION_START_BLOCK: u64 = 20 * BLOCKS_PER_YEAR;

/// EIP-1559 gas-target elasticity.
pub const ELASTICITY_MULTIPLIER: u64 = 2;

/// EIP-1559 base-fee max change denominator.
pub const BASE_FEE_CHANGE_DENOMINATOR: u64 = 8;

/// Base fee of the first London block, in zaps.
pub const INITIAL_BASE_FEE: u64 = 1_000_000_000;

/// One Flux in zaps (the base unit).
pub fn flux() -> U256 {
    U256::from(1_000_000_000_000_000_000u64)
}

/// Initial block reward: 4708 Flux.
pub fn initial_block_reward() -> U256 {
    U256::from(4_708u64) * flux()
}

/// Fixed per-block reward after [`TAIL_EMISSION_START_BLOCK`]:
/// 105,000,000 Flux per year spread over [`BLOCKS_PER_YEAR`] blocks.
pub fn tail_emission_per_block() -> U256 {
    U256::from(105_000_000u64) * flux() / U256::from(BLOCKS_PER_YEAR)
}

/// Difficulty floor as a [`U256`].
pub fn minimum_difficulty() -> U256 {
    U256::from(MINIMUM_DIFFICULTY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_emission_is_roughly_fifty_flux() {
        let per_block = tail_emission_per_block();
        assert!(per_block > U256::from(49u64) * flux());
        assert!(per_block < U256::from(50u64) * flux());
    }

    #[test]
    fn derived_constants() {
        assert_eq!(TAIL_EMISSION_START_BLOCK, 42_048_000);
        assert_eq!(initial_block_reward(), U256::from(4708u64) * flux());
    }
}
