//! Hex-encoded remote-mining surface, mirroring the `eth_getWork` /
//! `eth_submitWork` / `eth_submitHashrate` wire conventions. The JSON-RPC
//! transport itself lives outside this crate; handlers delegate here.

use ethereum_types::H256;
use std::sync::Arc;

use crate::error::MiningResult;
use crate::sealer::Sealer;

/// Remote-mining API facade over a [`Sealer`].
pub struct Api {
    sealer: Arc<Sealer>,
}

impl Api {
    /// API over the given sealer.
    pub fn new(sealer: Arc<Sealer>) -> Self {
        Api { sealer }
    }

    /// Current work as `[seal_hash, seed_hash, target, block_number]`,
    /// all 0x-prefixed hex. The target is the full 32-byte boundary.
    pub fn get_work(&self) -> MiningResult<[String; 4]> {
        let (seal_hash, seed_hash, target, number) = self.sealer.get_work()?;
        let mut boundary = [0u8; 32];
        target.to_big_endian(&mut boundary);
        Ok([
            format!("{seal_hash:#x}"),
            format!("{seed_hash:#x}"),
            format!("0x{}", hex::encode(boundary)),
            format!("{number:#x}"),
        ])
    }

    /// Submit an externally mined solution. Returns whether it was
    /// accepted; malformed hex is rejected as `false`.
    pub fn submit_work(&self, nonce: &str, seal_hash: &str, mix_digest: &str) -> bool {
        let (Some(nonce), Some(seal_hash), Some(mix_digest)) =
            (parse_u64(nonce), parse_h256(seal_hash), parse_h256(mix_digest))
        else {
            return false;
        };
        self.sealer.submit_work(nonce, seal_hash, mix_digest)
    }

    /// Report a remote miner's hashrate under a caller-chosen id.
    pub fn submit_hashrate(&self, rate: &str, id: &str) -> bool {
        let (Some(rate), Some(id)) = (parse_u64(rate), parse_h256(id)) else {
            return false;
        };
        self.sealer.submit_hashrate(rate, id)
    }
}

fn strip_0x(s: &str) -> &str {
    s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s)
}

fn parse_u64(s: &str) -> Option<u64> {
    u64::from_str_radix(strip_0x(s), 16).ok()
}

fn parse_h256(s: &str) -> Option<H256> {
    let bytes = hex::decode(strip_0x(s)).ok()?;
    if bytes.len() != 32 {
        return None;
    }
    Some(H256::from_slice(&bytes))
}
