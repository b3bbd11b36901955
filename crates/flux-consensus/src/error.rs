//! Error types for consensus validation.

use ethereum_types::{H256, U256};
use thiserror::Error;

/// Consensus validation errors.
///
/// Per-header errors are final for that header; [`ConsensusError::UnknownAncestor`]
/// is the one recoverable case (the caller may fetch the parent and retry).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsensusError {
    /// Parent header not known to the chain reader.
    #[error("unknown ancestor")]
    UnknownAncestor,

    /// Header timestamp is not after the parent's.
    #[error("timestamp older than parent")]
    OlderBlockTime,

    /// Header timestamp is too far in the future.
    #[error("block in the future: time {time}, limit {limit}")]
    FutureBlock { time: u64, limit: u64 },

    /// Extra-data section exceeds the protocol bound.
    #[error("extra-data too long: {len} > {max}")]
    ExtraDataTooLong { len: usize, max: usize },

    /// Block number is not parent's plus one.
    #[error("invalid block number: have {have}, parent {parent}")]
    InvalidNumber { have: u64, parent: u64 },

    /// Claimed difficulty does not match the adjustment algorithm.
    #[error("invalid difficulty: have {have}, want {want}")]
    InvalidDifficulty { have: U256, want: U256 },

    /// Sealed header carries a non-positive difficulty.
    #[error("non-positive difficulty")]
    NonPositiveDifficulty,

    /// Gas limit violates the absolute cap or the parent-relative bound.
    #[error("invalid gas limit: have {have}, limit {limit}")]
    InvalidGasLimit { have: u64, limit: u64 },

    /// Gas used exceeds the gas limit.
    #[error("invalid gas used: have {have}, gas limit {limit}")]
    InvalidGasUsed { have: u64, limit: u64 },

    /// EIP-1559 base-fee rules violated.
    #[error("invalid base fee: {0}")]
    InvalidBaseFee(String),

    /// More uncles than the protocol allows.
    #[error("too many uncles")]
    TooManyUncles,

    /// Uncle included (or rewarded) more than once.
    #[error("duplicate uncle {hash}")]
    DuplicateUncle { hash: H256 },

    /// Uncle is a direct ancestor of the including block.
    #[error("uncle is ancestor {hash}")]
    UncleIsAncestor { hash: H256 },

    /// Uncle's parent is not within the recent ancestor window.
    #[error("uncle's parent is not ancestor {hash}")]
    DanglingUncle { hash: H256 },

    /// Kernel mix digest does not match the header's.
    #[error("invalid mix digest")]
    InvalidMixDigest,

    /// Kernel result does not meet the difficulty target.
    #[error("invalid proof-of-work")]
    InvalidPoW,
}

/// Result type for consensus operations.
pub type ConsensusResult<T> = Result<T, ConsensusError>;
