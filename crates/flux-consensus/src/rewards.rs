//! Block reward schedule and accumulation.
//!
//! Emission: 4708 Flux per block, doubled for the first 150,000 blocks,
//! halved every year (2,102,400 blocks), and replaced by a fixed tail
//! emission after 20 years. The reward splits among the miner and the
//! staker/dev/community funds: 70/10/10/10 during year 1, 75/15/10/0
//! afterwards. Uncle miners are paid out of thin air on top, and the
//! including miner collects an inclusion bonus per uncle.

use ethereum_types::U256;

use crate::params::{
    initial_block_reward, tail_emission_per_block, BLOCKS_PER_YEAR, EARLY_BONUS_END_BLOCK,
    TAIL_EMISSION_START_BLOCK,
};
use crate::types::{ChainConfig, Header, StateDb};

/// Reward split percentages, numerators out of 100.
struct Split {
    miner: u64,
    staker: u64,
    dev: u64,
    community: u64,
}

const YEAR_1_SPLIT: Split = Split {
    miner: 70,
    staker: 10,
    dev: 10,
    community: 10,
};

const POST_YEAR_1_SPLIT: Split = Split {
    miner: 75,
    staker: 15,
    dev: 10,
    community: 0,
};

/// Total block reward for a block number; a pure function of the number.
pub fn calc_block_reward(block_number: u64) -> U256 {
    if block_number >= TAIL_EMISSION_START_BLOCK {
        return tail_emission_per_block();
    }

    let era = block_number / BLOCKS_PER_YEAR;
    let mut reward = initial_block_reward() >> era;

    if block_number < EARLY_BONUS_END_BLOCK {
        reward = reward * U256::from(2u64);
    }
    reward
}

fn pct(reward: U256, numerator: u64) -> U256 {
    reward * U256::from(numerator) / U256::from(100u64)
}

/// Credit the block reward split and uncle rewards to the state.
///
/// Integer division throughout; the sub-percent remainder stays
/// unallocated. Fund shares are credited only when the chain config
/// carries fund addresses.
pub fn accumulate_rewards(
    config: &ChainConfig,
    state: &mut dyn StateDb,
    header: &Header,
    uncles: &[Header],
) {
    let block_reward = calc_block_reward(header.number);
    let split = if header.number < BLOCKS_PER_YEAR {
        YEAR_1_SPLIT
    } else {
        POST_YEAR_1_SPLIT
    };

    let mut miner_share = pct(block_reward, split.miner);

    for uncle in uncles {
        // (uncle.number + 8 - header.number) * reward / 8, i.e. 7/8 for a
        // depth-1 uncle down to 1/8 at the window edge.
        let depth_weight = U256::from(uncle.number + 8 - header.number);
        let uncle_reward = depth_weight * block_reward / U256::from(8u64);
        state.add_balance(&uncle.coinbase, uncle_reward);

        miner_share += block_reward / U256::from(32u64);
    }

    state.add_balance(&header.coinbase, miner_share);

    if let Some(progpow) = &config.progpow {
        let staker_share = pct(block_reward, split.staker);
        if !staker_share.is_zero() {
            state.add_balance(&progpow.staker_fund_address, staker_share);
        }
        let dev_share = pct(block_reward, split.dev);
        if !dev_share.is_zero() {
            state.add_balance(&progpow.dev_fund_address, dev_share);
        }
        let community_share = pct(block_reward, split.community);
        if !community_share.is_zero() {
            state.add_balance(&progpow.community_fund_address, community_share);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::flux;
    use crate::types::{Address, ProgpowChainConfig};
    use ethereum_types::H160;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MemoryState {
        balances: HashMap<Address, U256>,
    }

    impl StateDb for MemoryState {
        fn add_balance(&mut self, address: &Address, amount: U256) {
            *self.balances.entry(*address).or_default() += amount;
        }
    }

    impl MemoryState {
        fn balance(&self, address: &Address) -> U256 {
            self.balances.get(address).copied().unwrap_or_default()
        }
    }

    fn funds() -> (ChainConfig, Address, Address, Address) {
        let staker = H160::repeat_byte(0x44);
        let dev = H160::repeat_byte(0x22);
        let community = H160::repeat_byte(0x33);
        let config = ChainConfig {
            london_block: None,
            progpow: Some(ProgpowChainConfig {
                staker_fund_address: staker,
                dev_fund_address: dev,
                community_fund_address: community,
            }),
        };
        (config, staker, dev, community)
    }

    fn header_at(number: u64, coinbase: Address) -> Header {
        Header {
            number,
            coinbase,
            ..Default::default()
        }
    }

    #[test]
    fn reward_schedule_key_blocks() {
        assert_eq!(calc_block_reward(0), U256::from(9_416u64) * flux());
        assert_eq!(calc_block_reward(1), U256::from(9_416u64) * flux());
        assert_eq!(calc_block_reward(149_999), U256::from(9_416u64) * flux());
        assert_eq!(calc_block_reward(150_000), U256::from(4_708u64) * flux());
        assert_eq!(calc_block_reward(2_102_399), U256::from(4_708u64) * flux());
        assert_eq!(calc_block_reward(2_102_400), U256::from(2_354u64) * flux());
        assert_eq!(calc_block_reward(4_204_800), U256::from(1_177u64) * flux());
        assert_eq!(calc_block_reward(42_048_000), tail_emission_per_block());
        assert_eq!(calc_block_reward(100_000_000), tail_emission_per_block());
    }

    #[test]
    fn reward_halves_every_era() {
        let initial = initial_block_reward();
        for era in 0..10u64 {
            let mut block = era * BLOCKS_PER_YEAR;
            if block >= TAIL_EMISSION_START_BLOCK {
                break;
            }
            if era == 0 {
                block = EARLY_BONUS_END_BLOCK;
            }
            assert_eq!(calc_block_reward(block), initial >> era, "era {era}");
        }
    }

    #[test]
    fn year_1_split_is_70_10_10_10() {
        let (config, staker, dev, community) = funds();
        let miner = H160::repeat_byte(0x11);
        let mut state = MemoryState::default();

        let header = header_at(200_000, miner);
        accumulate_rewards(&config, &mut state, &header, &[]);

        let reward = calc_block_reward(200_000);
        assert_eq!(state.balance(&miner), pct(reward, 70));
        assert_eq!(state.balance(&staker), pct(reward, 10));
        assert_eq!(state.balance(&dev), pct(reward, 10));
        assert_eq!(state.balance(&community), pct(reward, 10));
    }

    #[test]
    fn post_year_1_split_is_75_15_10_0() {
        let (config, staker, dev, community) = funds();
        let miner = H160::repeat_byte(0x11);
        let mut state = MemoryState::default();

        let number = BLOCKS_PER_YEAR + 1_000;
        accumulate_rewards(&config, &mut state, &header_at(number, miner), &[]);

        let reward = calc_block_reward(number);
        assert_eq!(state.balance(&miner), pct(reward, 75));
        assert_eq!(state.balance(&staker), pct(reward, 15));
        assert_eq!(state.balance(&dev), pct(reward, 10));
        assert_eq!(state.balance(&community), U256::zero());
    }

    #[test]
    fn tail_emission_uses_post_year_1_split() {
        let (config, staker, dev, community) = funds();
        let miner = H160::repeat_byte(0x11);
        let mut state = MemoryState::default();

        let number = TAIL_EMISSION_START_BLOCK + 1_000;
        accumulate_rewards(&config, &mut state, &header_at(number, miner), &[]);

        let reward = tail_emission_per_block();
        assert_eq!(state.balance(&miner), pct(reward, 75));
        assert_eq!(state.balance(&staker), pct(reward, 15));
        assert_eq!(state.balance(&dev), pct(reward, 10));
        assert_eq!(state.balance(&community), U256::zero());
    }

    #[test]
    fn uncle_rewards_and_inclusion_bonus() {
        let (config, staker, _, _) = funds();
        let miner = H160::repeat_byte(0x11);
        let uncle_miner = H160::repeat_byte(0x55);
        let mut state = MemoryState::default();

        let header = header_at(200_000, miner);
        let uncles = vec![header_at(199_999, uncle_miner)];
        accumulate_rewards(&config, &mut state, &header, &uncles);

        let reward = calc_block_reward(200_000);
        // Depth-1 uncle: (199_999 + 8 - 200_000) / 8 = 7/8 of the reward.
        assert_eq!(
            state.balance(&uncle_miner),
            U256::from(7u64) * reward / U256::from(8u64)
        );
        assert_eq!(
            state.balance(&miner),
            pct(reward, 70) + reward / U256::from(32u64)
        );
        // Fund shares are unaffected by uncles.
        assert_eq!(state.balance(&staker), pct(reward, 10));
    }

    #[test]
    fn missing_fund_config_skips_fund_shares() {
        let miner = H160::repeat_byte(0x11);
        let mut state = MemoryState::default();
        let config = ChainConfig::default();

        accumulate_rewards(&config, &mut state, &header_at(200_000, miner), &[]);

        let reward = calc_block_reward(200_000);
        assert_eq!(state.balance(&miner), pct(reward, 70));
        assert_eq!(state.balances.len(), 1);
    }

    #[test]
    fn early_bonus_doubles_the_split_base() {
        let (config, _, _, _) = funds();
        let miner = H160::repeat_byte(0x11);
        let mut state = MemoryState::default();

        accumulate_rewards(&config, &mut state, &header_at(100, miner), &[]);

        let reward = calc_block_reward(100);
        assert_eq!(reward, initial_block_reward() * U256::from(2u64));
        assert_eq!(state.balance(&miner), pct(reward, 70));
    }
}
