//! Gas-limit and EIP-1559 base-fee header rules.

use ethereum_types::U256;

use crate::error::{ConsensusError, ConsensusResult};
use crate::params::{
    BASE_FEE_CHANGE_DENOMINATOR, ELASTICITY_MULTIPLIER, GAS_LIMIT_BOUND_DIVISOR, INITIAL_BASE_FEE,
    MIN_GAS_LIMIT,
};
use crate::types::{ChainConfig, Header};

/// Pre-London rule: the gas limit may move by at most a 1/1024 fraction
/// of the parent's and never below the minimum.
pub fn verify_gas_limit(parent_gas_limit: u64, gas_limit: u64) -> ConsensusResult<()> {
    let diff = parent_gas_limit.abs_diff(gas_limit);
    let limit = parent_gas_limit / GAS_LIMIT_BOUND_DIVISOR;
    if diff >= limit {
        return Err(ConsensusError::InvalidGasLimit {
            have: gas_limit,
            limit: parent_gas_limit + limit,
        });
    }
    if gas_limit < MIN_GAS_LIMIT {
        return Err(ConsensusError::InvalidGasLimit {
            have: gas_limit,
            limit: MIN_GAS_LIMIT,
        });
    }
    Ok(())
}

/// Expected base fee for a header whose parent is `parent`.
pub fn calc_base_fee(config: &ChainConfig, parent: &Header) -> U256 {
    // The first London block starts from the protocol's initial base fee.
    if !config.is_london(parent.number) {
        return U256::from(INITIAL_BASE_FEE);
    }

    let parent_base_fee = parent.base_fee.unwrap_or_default();
    let gas_target = parent.gas_limit / ELASTICITY_MULTIPLIER;

    if parent.gas_used == gas_target {
        return parent_base_fee;
    }

    if parent.gas_used > gas_target {
        let delta = parent_base_fee * U256::from(parent.gas_used - gas_target)
            / U256::from(gas_target)
            / U256::from(BASE_FEE_CHANGE_DENOMINATOR);
        parent_base_fee + delta.max(U256::one())
    } else {
        let delta = parent_base_fee * U256::from(gas_target - parent.gas_used)
            / U256::from(gas_target)
            / U256::from(BASE_FEE_CHANGE_DENOMINATOR);
        parent_base_fee.saturating_sub(delta)
    }
}

/// Post-London header rules: gas-limit bound against the (elasticity
/// adjusted) parent limit plus the base-fee formula.
pub fn verify_eip1559_header(
    config: &ChainConfig,
    parent: &Header,
    header: &Header,
) -> ConsensusResult<()> {
    // At the fork block the target doubles, so compare against the
    // scaled parent limit.
    let mut parent_gas_limit = parent.gas_limit;
    if !config.is_london(parent.number) {
        parent_gas_limit = parent.gas_limit * ELASTICITY_MULTIPLIER;
    }
    verify_gas_limit(parent_gas_limit, header.gas_limit)?;

    let base_fee = header
        .base_fee
        .ok_or_else(|| ConsensusError::InvalidBaseFee("missing after London fork".into()))?;
    let expected = calc_base_fee(config, parent);
    if base_fee != expected {
        return Err(ConsensusError::InvalidBaseFee(format!(
            "have {base_fee}, want {expected}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn london_config() -> ChainConfig {
        ChainConfig {
            london_block: Some(100),
            progpow: None,
        }
    }

    fn london_parent(gas_limit: u64, gas_used: u64, base_fee: u64) -> Header {
        Header {
            number: 200,
            gas_limit,
            gas_used,
            base_fee: Some(U256::from(base_fee)),
            ..Default::default()
        }
    }

    #[test]
    fn gas_limit_bound() {
        assert!(verify_gas_limit(1_000_000, 1_000_000).is_ok());
        assert!(verify_gas_limit(1_000_000, 1_000_900).is_ok());
        assert!(verify_gas_limit(1_000_000, 1_001_000).is_err());
        assert!(verify_gas_limit(1_000_000, 999_100).is_ok());
        assert!(verify_gas_limit(1_000_000, 998_000).is_err());
        assert!(verify_gas_limit(5_100, 4_999).is_err());
    }

    #[test]
    fn base_fee_stays_at_target_usage() {
        let parent = london_parent(20_000_000, 10_000_000, INITIAL_BASE_FEE);
        assert_eq!(
            calc_base_fee(&london_config(), &parent),
            U256::from(INITIAL_BASE_FEE)
        );
    }

    #[test]
    fn base_fee_rises_when_blocks_are_full() {
        let parent = london_parent(20_000_000, 20_000_000, INITIAL_BASE_FEE);
        // Full block: +12.5%.
        assert_eq!(
            calc_base_fee(&london_config(), &parent),
            U256::from(INITIAL_BASE_FEE + INITIAL_BASE_FEE / 8)
        );
    }

    #[test]
    fn base_fee_falls_when_blocks_are_empty() {
        let parent = london_parent(20_000_000, 0, INITIAL_BASE_FEE);
        assert_eq!(
            calc_base_fee(&london_config(), &parent),
            U256::from(INITIAL_BASE_FEE - INITIAL_BASE_FEE / 8)
        );
    }

    #[test]
    fn fork_block_uses_initial_base_fee() {
        let parent = Header {
            number: 99,
            gas_limit: 10_000_000,
            ..Default::default()
        };
        assert_eq!(
            calc_base_fee(&london_config(), &parent),
            U256::from(INITIAL_BASE_FEE)
        );
    }

    #[test]
    fn missing_base_fee_is_rejected() {
        let parent = london_parent(20_000_000, 10_000_000, INITIAL_BASE_FEE);
        let header = Header {
            number: 201,
            gas_limit: 20_000_000,
            base_fee: None,
            ..Default::default()
        };
        assert!(matches!(
            verify_eip1559_header(&london_config(), &parent, &header),
            Err(ConsensusError::InvalidBaseFee(_))
        ));
    }

    #[test]
    fn wrong_base_fee_is_rejected_and_right_one_accepted() {
        let config = london_config();
        let parent = london_parent(20_000_000, 20_000_000, INITIAL_BASE_FEE);

        let mut header = Header {
            number: 201,
            gas_limit: 20_000_000,
            base_fee: Some(calc_base_fee(&config, &parent)),
            ..Default::default()
        };
        assert!(verify_eip1559_header(&config, &parent, &header).is_ok());

        header.base_fee = Some(U256::from(INITIAL_BASE_FEE));
        assert!(verify_eip1559_header(&config, &parent, &header).is_err());
    }
}
