//! Error types for sealing and remote mining.

use thiserror::Error;

/// Mining lifecycle errors; both are recoverable by the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MiningError {
    /// No sealing work has been pushed yet.
    #[error("no mining work available yet")]
    NoMiningWork,

    /// The engine has been closed.
    #[error("progpow engine stopped")]
    EngineStopped,
}

/// Result type for mining operations.
pub type MiningResult<T> = Result<T, MiningError>;
