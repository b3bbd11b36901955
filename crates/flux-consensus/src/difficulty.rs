//! Difficulty adjustment.
//!
//! Yottaflux uses the Byzantium-style adjustment with a /10 gap divisor
//! (targeting 15-second blocks) and no exponential difficulty bomb:
//!
//! `diff = parent_diff
//!       + parent_diff / 2048 * clamp((2 if uncles else 1) - gap / 10, -99)`
//!
//! clamped from below by the minimum difficulty.

use ethereum_types::U256;

use crate::params::{minimum_difficulty, DIFFICULTY_BOUND_DIVISOR};
use crate::types::Header;

/// Difficulty for a block created at `time` on top of `parent`.
pub fn calc_difficulty(time: u64, parent: &Header) -> U256 {
    let gap = time.saturating_sub(parent.time) / 10;
    let base: i64 = if parent.has_uncles() { 2 } else { 1 };
    // The gap term can exceed i64 only for absurd timestamps; the clamp
    // makes anything past 99 equivalent anyway.
    let x = (base - gap.min(1_000) as i64).max(-99);

    let adjustment = parent.difficulty / U256::from(DIFFICULTY_BOUND_DIVISOR);
    let diff = if x >= 0 {
        parent
            .difficulty
            .saturating_add(adjustment * U256::from(x as u64))
    } else {
        parent
            .difficulty
            .saturating_sub(adjustment * U256::from((-x) as u64))
    };

    diff.max(minimum_difficulty())
}

/// [`calc_difficulty`] with explicit floor and ceiling clamps. The floor
/// is already applied by the base calculation; this wrapper exists for
/// callers (and fuzzers) that feed unconstrained inputs.
pub fn calc_difficulty_bounded(time: u64, parent: &Header) -> U256 {
    calc_difficulty(time, parent).clamp(minimum_difficulty(), U256::MAX)
}
