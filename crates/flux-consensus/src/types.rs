//! Header and block types plus the chain/state capabilities the engine
//! consumes.
//!
//! The engine never owns storage or state: it reads headers and blocks
//! through [`ChainHeaderReader`]/[`ChainReader`] and credits rewards
//! through [`StateDb`], all provided by the caller.

use ethereum_types::{Bloom, H160, H256, H64, U256};
use rlp::RlpStream;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

/// A 20-byte account address.
pub type Address = H160;

/// Keccak-256 convenience wrapper.
pub fn keccak256(data: &[u8]) -> H256 {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    H256::from_slice(&hasher.finalize())
}

/// Hash of an RLP-encoded empty list: the uncle hash of a block with no
/// uncles. The difficulty adjustment keys its uncle bonus off this value.
pub fn empty_uncle_hash() -> H256 {
    keccak256(&rlp::EMPTY_LIST_RLP)
}

/// A Yottaflux block header.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Header {
    /// Parent block hash.
    pub parent_hash: H256,
    /// Hash of the RLP-encoded uncle list.
    pub uncle_hash: H256,
    /// Beneficiary of the mining reward.
    pub coinbase: Address,
    /// State trie root.
    pub state_root: H256,
    /// Transaction trie root.
    pub tx_root: H256,
    /// Receipt trie root.
    pub receipt_root: H256,
    /// Bloom filter over the block's logs.
    pub logs_bloom: Bloom,
    /// Claimed difficulty; must match the adjustment algorithm.
    pub difficulty: U256,
    /// Block height.
    pub number: u64,
    /// Gas limit for the block.
    pub gas_limit: u64,
    /// Gas consumed by the block.
    pub gas_used: u64,
    /// Unix timestamp in seconds.
    pub time: u64,
    /// Arbitrary extra data, at most 32 bytes.
    pub extra_data: Vec<u8>,
    /// ProgPow mix digest committed by the sealer.
    pub mix_digest: H256,
    /// ProgPow nonce (big-endian 8 bytes on the wire).
    pub nonce: u64,
    /// EIP-1559 base fee; present only after the London fork.
    pub base_fee: Option<U256>,
}

impl Header {
    fn rlp_append(&self, s: &mut RlpStream, with_seal: bool) {
        let mut fields = 13;
        if with_seal {
            fields += 2;
        }
        if self.base_fee.is_some() {
            fields += 1;
        }
        s.begin_list(fields);
        s.append(&self.parent_hash);
        s.append(&self.uncle_hash);
        s.append(&self.coinbase);
        s.append(&self.state_root);
        s.append(&self.tx_root);
        s.append(&self.receipt_root);
        s.append(&self.logs_bloom);
        s.append(&self.difficulty);
        s.append(&self.number);
        s.append(&self.gas_limit);
        s.append(&self.gas_used);
        s.append(&self.time);
        s.append(&self.extra_data);
        if with_seal {
            s.append(&self.mix_digest);
            s.append(&H64::from(self.nonce.to_be_bytes()));
        }
        if let Some(base_fee) = self.base_fee {
            s.append(&base_fee);
        }
    }

    /// Full header hash (identity on the wire), including the seal.
    pub fn hash(&self) -> H256 {
        let mut s = RlpStream::new();
        self.rlp_append(&mut s, true);
        keccak256(&s.out())
    }

    /// The value miners hash against: the header RLP without nonce and
    /// mix digest.
    pub fn seal_hash(&self) -> H256 {
        let mut s = RlpStream::new();
        self.rlp_append(&mut s, false);
        keccak256(&s.out())
    }

    /// Whether the parent block carried uncles, judged by this header's
    /// uncle-hash field.
    pub fn has_uncles(&self) -> bool {
        self.uncle_hash != empty_uncle_hash()
    }
}

/// A block as seen by the consensus engine: header plus uncle headers.
/// Transactions are outside the engine's scope.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Block {
    /// The block's own header.
    pub header: Header,
    /// Included uncle headers.
    pub uncles: Vec<Header>,
}

impl Block {
    /// Block built from a bare header.
    pub fn with_header(header: Header) -> Self {
        Block {
            header,
            uncles: Vec::new(),
        }
    }

    /// Block identity hash.
    pub fn hash(&self) -> H256 {
        self.header.hash()
    }

    /// Block height.
    pub fn number(&self) -> u64 {
        self.header.number
    }

    /// Copy of this block carrying the given seal.
    pub fn with_seal(&self, nonce: u64, mix_digest: H256) -> Block {
        let mut sealed = self.clone();
        sealed.header.nonce = nonce;
        sealed.header.mix_digest = mix_digest;
        sealed
    }
}

/// Fund addresses credited by the reward split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgpowChainConfig {
    /// Staking reward pool.
    pub staker_fund_address: Address,
    /// Development fund.
    pub dev_fund_address: Address,
    /// Community fund (year 1 only).
    pub community_fund_address: Address,
}

/// Chain-level configuration consumed by the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    /// London (EIP-1559) activation block; `None` disables the fork.
    pub london_block: Option<u64>,
    /// ProgPow fund addresses; fund shares are skipped when absent.
    pub progpow: Option<ProgpowChainConfig>,
}

impl ChainConfig {
    /// Whether EIP-1559 rules apply at the given height.
    pub fn is_london(&self, number: u64) -> bool {
        self.london_block.map(|fork| number >= fork).unwrap_or(false)
    }
}

/// Read access to headers, as provided by the chain database.
pub trait ChainHeaderReader: Send + Sync {
    /// The active chain configuration.
    fn config(&self) -> &ChainConfig;

    /// Header with the given hash at the given height, if known.
    fn header(&self, hash: &H256, number: u64) -> Option<Header>;
}

/// Read access to full blocks, needed for uncle verification.
pub trait ChainReader: ChainHeaderReader {
    /// Block with the given hash at the given height, if known.
    fn block(&self, hash: &H256, number: u64) -> Option<Block>;
}

/// Account-balance mutation capability used by reward accumulation.
pub trait StateDb {
    /// Credit `amount` to `address`.
    fn add_balance(&mut self, address: &Address, amount: U256);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_uncle_hash_matches_known_constant() {
        let expected = "1dcc4de8dec75d7aab85b567b6ccd41ad312451b948a7413f0a142fd40d49347";
        assert_eq!(hex::encode(empty_uncle_hash()), expected);
    }

    #[test]
    fn seal_hash_excludes_nonce_and_mix_digest() {
        let mut header = Header {
            number: 1,
            difficulty: U256::from(100),
            ..Default::default()
        };
        let unsealed = header.seal_hash();
        header.nonce = 0xdead_beef;
        header.mix_digest = H256::repeat_byte(0xaa);
        assert_eq!(header.seal_hash(), unsealed);
        assert_ne!(header.hash(), unsealed);
    }

    #[test]
    fn seal_hash_is_header_sensitive() {
        let h1 = Header {
            number: 1,
            difficulty: U256::from(100),
            ..Default::default()
        };
        let h2 = Header {
            number: 2,
            difficulty: U256::from(100),
            ..Default::default()
        };
        assert_ne!(h1.seal_hash(), H256::zero());
        assert_ne!(h1.seal_hash(), h2.seal_hash());
        assert_eq!(h1.seal_hash(), h1.clone().seal_hash());
    }

    #[test]
    fn base_fee_changes_the_seal_hash() {
        let header = Header {
            number: 10,
            ..Default::default()
        };
        let mut london = header.clone();
        london.base_fee = Some(U256::from(1_000_000_000u64));
        assert_ne!(header.seal_hash(), london.seal_hash());
    }

    #[test]
    fn with_seal_replaces_only_the_seal() {
        let block = Block::with_header(Header {
            number: 7,
            ..Default::default()
        });
        let sealed = block.with_seal(42, H256::repeat_byte(1));
        assert_eq!(sealed.header.nonce, 42);
        assert_eq!(sealed.header.mix_digest, H256::repeat_byte(1));
        assert_eq!(sealed.header.number, 7);
        assert_eq!(sealed.header.seal_hash(), block.header.seal_hash());
    }

    #[test]
    fn london_activation() {
        let config = ChainConfig {
            london_block: Some(100),
            progpow: None,
        };
        assert!(!config.is_london(99));
        assert!(config.is_london(100));
        assert!(!ChainConfig::default().is_london(u64::MAX));
    }
}
