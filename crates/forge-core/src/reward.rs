//! Block and uncle reward schedule.
//!
//! The base reward comes from the last [`RewardEpoch`](crate::config::RewardEpoch)
//! whose `from_block` is at or below the block number. For a block at height
//! `n` with base reward `R`:
//!
//! - each uncle at height `u` pays its coinbase `(u + depth_divisor - n) * R / depth_divisor`
//! - the block coinbase receives `R + uncles * R / inclusion_divisor`
//!
//! With the default divisors (8 and 32) an uncle one block behind earns 7/8
//! of the base reward and the including miner earns an extra 1/32 per uncle.

use crate::config::RewardSchedule;
use crate::types::{Address, Header, U256};

impl RewardSchedule {
    /// Base reward for a block at `number`. Zero before the first epoch.
    pub fn reward_at(&self, number: u64) -> U256 {
        self.epochs
            .iter()
            .take_while(|epoch| epoch.from_block <= number)
            .last()
            .map(|epoch| epoch.reward)
            .unwrap_or_default()
    }

    /// Reward paid to the miner of an uncle at `uncle_number` included at `number`.
    pub fn uncle_reward(&self, base: U256, uncle_number: u64, number: u64) -> U256 {
        let divisor = self.uncle_depth_divisor.max(1);
        let depth_factor = uncle_number
            .saturating_add(divisor)
            .saturating_sub(number);
        base.saturating_mul(U256::from(depth_factor)) / U256::from(divisor)
    }

    /// Bonus paid to the block miner for each included uncle.
    pub fn inclusion_reward(&self, base: U256) -> U256 {
        base / U256::from(self.uncle_inclusion_divisor.max(1))
    }
}

/// Every balance credit a block at `header` with `uncles` earns, uncles first
/// and the block coinbase last.
pub fn block_rewards(schedule: &RewardSchedule, header: &Header, uncles: &[Header]) -> Vec<(Address, U256)> {
    let base = schedule.reward_at(header.number);
    let mut credits = Vec::with_capacity(uncles.len() + 1);
    let mut miner = base;
    for uncle in uncles {
        credits.push((
            uncle.coinbase,
            schedule.uncle_reward(base, uncle.number, header.number),
        ));
        miner = miner.saturating_add(schedule.inclusion_reward(base));
    }
    credits.push((header.coinbase, miner));
    credits
}
