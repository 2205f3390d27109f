//! Genesis block construction.
//!
//! Genesis is derived from the [`ChainConfig`] alone, so every node with the
//! same configuration computes the identical block. It carries the minimum
//! difficulty, the default gas limit and no seal.

use crate::config::ChainConfig;
use crate::constants::{GENESIS_GAS_LIMIT, GENESIS_TIMESTAMP};
use crate::types::{Block, Hash256, Header};

/// Message embedded in the genesis extra data.
pub const GENESIS_MESSAGE: &[u8] = b"forge genesis";

/// The genesis header for `config`.
///
/// Authority chains store the initial signer set in the extra data after the
/// vanity prefix so the genesis hash commits to it.
pub fn genesis_header(config: &ChainConfig) -> Header {
    let mut extra_data = GENESIS_MESSAGE.to_vec();
    if let Some(authority) = &config.authority {
        extra_data.resize(crate::constants::EXTRA_VANITY, 0);
        for signer in &authority.signers {
            extra_data.extend_from_slice(signer.as_bytes());
        }
    }

    Header {
        difficulty: config.difficulty.minimum,
        number: 0,
        gas_limit: GENESIS_GAS_LIMIT.clamp(config.limits.min_gas_limit, config.limits.max_gas_limit),
        timestamp: GENESIS_TIMESTAMP,
        extra_data,
        ..Header::default()
    }
}

/// The genesis block for `config`: the genesis header with an empty body.
pub fn genesis_block(config: &ChainConfig) -> Block {
    Block {
        header: genesis_header(config),
        transactions: Vec::new(),
        uncles: Vec::new(),
    }
}

/// Hash of the genesis block for `config`.
pub fn genesis_hash(config: &ChainConfig) -> Hash256 {
    genesis_header(config).hash()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthorityConfig;
    use crate::types::Address;

    #[test]
    fn genesis_is_deterministic() {
        let cfg = ChainConfig::default();
        assert_eq!(genesis_hash(&cfg), genesis_hash(&cfg));
    }

    #[test]
    fn genesis_has_no_parent_and_empty_body() {
        let block = genesis_block(&ChainConfig::default());
        assert_eq!(block.header.parent_hash, Hash256::ZERO);
        assert_eq!(block.number(), 0);
        assert!(block.body_matches_header().unwrap());
    }

    #[test]
    fn genesis_uses_minimum_difficulty() {
        let cfg = ChainConfig::default();
        assert_eq!(genesis_header(&cfg).difficulty, cfg.difficulty.minimum);
    }

    #[test]
    fn genesis_gas_limit_respects_bounds() {
        let mut cfg = ChainConfig::default();
        cfg.limits.max_gas_limit = 1_000_000;
        assert_eq!(genesis_header(&cfg).gas_limit, 1_000_000);
    }

    #[test]
    fn authority_genesis_commits_to_signers() {
        let with = |signers: Vec<Address>| ChainConfig {
            authority: Some(AuthorityConfig {
                signers,
                ..AuthorityConfig::default()
            }),
            ..ChainConfig::default()
        };
        let a = with(vec![Address([1; 20])]);
        let b = with(vec![Address([2; 20])]);
        assert_eq!(genesis_header(&a).extra_data.len(), 32 + 20);
        assert_ne!(genesis_hash(&a), genesis_hash(&b));
    }
}
