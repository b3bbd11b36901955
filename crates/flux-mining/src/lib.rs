//! # flux-mining
//!
//! Sealing support for the Yottaflux blockchain.
//!
//! This crate provides:
//! - A multi-threaded sealing loop over the ProgPow kernel
//! - Replace/cancel semantics for successive sealing tasks
//! - A remote-mining work registry (get-work / submit-work)
//! - Local and contributed hashrate aggregation
//!
//! Sealing uses the full dataset whenever the epoch's background build
//! has finished and falls back to the light path otherwise, so a fresh
//! node starts mining immediately (slowly) instead of stalling for the
//! dataset.

mod api;
mod error;
mod hashrate;
mod sealer;

pub use api::Api;
pub use error::{MiningError, MiningResult};
pub use hashrate::HashrateMeter;
pub use sealer::Sealer;
