//! Chain configuration consulted by the difficulty, validation and reward rules.
//!
//! A [`ChainConfig`] is immutable once built. It can be constructed in code
//! (every section has a `Default`) or loaded from a TOML/JSON file with
//! [`ChainConfig::from_file`], which layers `FORGE__`-prefixed environment
//! variables on top (e.g. `FORGE__UNCLES__MAX_UNCLES=1`).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::ConfigError;
use crate::types::{Address, U256};

/// Top-level protocol parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Network identifier.
    pub chain_id: u64,
    pub difficulty: DifficultyConfig,
    pub rewards: RewardSchedule,
    pub uncles: UncleConfig,
    pub limits: HeaderLimits,
    /// Present only on authority (proof-of-authority) chains.
    pub authority: Option<AuthorityConfig>,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            chain_id: 1,
            difficulty: DifficultyConfig::default(),
            rewards: RewardSchedule::default(),
            uncles: UncleConfig::default(),
            limits: HeaderLimits::default(),
            authority: None,
        }
    }
}

/// Parameters of the difficulty adjustment rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DifficultyConfig {
    /// Per-step adjustment is `parent_difficulty / bound_divisor`.
    pub bound_divisor: u64,
    /// Seconds of elapsed time per downward adjustment unit.
    pub duration_step: u64,
    /// Cap on downward adjustment units per block.
    pub max_downward_steps: u64,
    /// Floor the difficulty never drops below.
    pub minimum: U256,
    /// Scheduled exponential term keyed to block height; `None` disables it.
    pub bomb: Option<BombSchedule>,
}

impl Default for DifficultyConfig {
    fn default() -> Self {
        Self {
            bound_divisor: DIFFICULTY_BOUND_DIVISOR,
            duration_step: DURATION_STEP_SECS,
            max_downward_steps: MAX_DOWNWARD_STEPS,
            minimum: U256::from(MINIMUM_DIFFICULTY),
            bomb: Some(BombSchedule::default()),
        }
    }
}

/// Scheduled difficulty term: `2^(period_count - 2)` once `period_count > 1`,
/// where `period_count = (number - delay) / period`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BombSchedule {
    pub delay: u64,
    pub period: u64,
}

impl Default for BombSchedule {
    fn default() -> Self {
        Self {
            delay: BOMB_DELAY,
            period: BOMB_PERIOD,
        }
    }
}

/// Base reward from a given block onwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardEpoch {
    pub from_block: u64,
    pub reward: U256,
}

/// Block and uncle reward policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardSchedule {
    /// Ordered by `from_block`; the last epoch at or below a height applies.
    pub epochs: Vec<RewardEpoch>,
    pub uncle_depth_divisor: u64,
    pub uncle_inclusion_divisor: u64,
}

impl Default for RewardSchedule {
    fn default() -> Self {
        Self {
            epochs: vec![RewardEpoch {
                from_block: 0,
                reward: U256::from(BLOCK_REWARD),
            }],
            uncle_depth_divisor: UNCLE_DEPTH_DIVISOR,
            uncle_inclusion_divisor: UNCLE_INCLUSION_DIVISOR,
        }
    }
}

/// Uncle inclusion limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UncleConfig {
    pub max_uncles: usize,
    pub generations: u64,
}

impl Default for UncleConfig {
    fn default() -> Self {
        Self {
            max_uncles: MAX_UNCLES,
            generations: UNCLE_GENERATIONS,
        }
    }
}

/// Structural bounds on header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderLimits {
    pub max_extra_data: usize,
    pub allowed_future_secs: u64,
    pub min_gas_limit: u64,
    pub max_gas_limit: u64,
    pub gas_limit_bound_divisor: u64,
}

impl Default for HeaderLimits {
    fn default() -> Self {
        Self {
            max_extra_data: MAX_EXTRA_DATA,
            allowed_future_secs: ALLOWED_FUTURE_SECS,
            min_gas_limit: MIN_GAS_LIMIT,
            max_gas_limit: MAX_GAS_LIMIT,
            gas_limit_bound_divisor: GAS_LIMIT_BOUND_DIVISOR,
        }
    }
}

/// Proof-of-authority parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorityConfig {
    /// Minimum seconds between consecutive blocks.
    pub period: u64,
    /// Authorised signers in turn order.
    pub signers: Vec<Address>,
    /// Base delay for out-of-turn signers.
    pub wiggle_ms: u64,
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            period: AUTHORITY_PERIOD_SECS,
            signers: Vec::new(),
            wiggle_ms: AUTHORITY_WIGGLE_MS,
        }
    }
}

impl ChainConfig {
    /// Load a configuration file (format inferred from the extension) with
    /// environment overrides, falling back to defaults for missing keys.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::from(path))
            .add_source(
                ::config::Environment::with_prefix("FORGE")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;
        let cfg: ChainConfig = settings.try_deserialize()?;
        cfg.validate()?;
        tracing::debug!(path = %path.display(), chain_id = cfg.chain_id, "loaded chain config");
        Ok(cfg)
    }

    /// Reject parameter combinations the rules cannot evaluate.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(field: &'static str, reason: &str) -> ConfigError {
            ConfigError::Invalid {
                field,
                reason: reason.to_string(),
            }
        }

        if self.difficulty.bound_divisor == 0 {
            return Err(invalid("difficulty.bound_divisor", "must be non-zero"));
        }
        if self.difficulty.duration_step == 0 {
            return Err(invalid("difficulty.duration_step", "must be non-zero"));
        }
        if self.difficulty.minimum.is_zero() {
            return Err(invalid("difficulty.minimum", "must be non-zero"));
        }
        if matches!(self.difficulty.bomb, Some(b) if b.period == 0) {
            return Err(invalid("difficulty.bomb.period", "must be non-zero"));
        }
        if self.rewards.uncle_depth_divisor == 0 {
            return Err(invalid("rewards.uncle_depth_divisor", "must be non-zero"));
        }
        if self.rewards.uncle_inclusion_divisor == 0 {
            return Err(invalid("rewards.uncle_inclusion_divisor", "must be non-zero"));
        }
        if self
            .rewards
            .epochs
            .windows(2)
            .any(|w| w[0].from_block >= w[1].from_block)
        {
            return Err(invalid("rewards.epochs", "must be strictly ordered by from_block"));
        }
        if self.limits.gas_limit_bound_divisor == 0 {
            return Err(invalid("limits.gas_limit_bound_divisor", "must be non-zero"));
        }
        if self.limits.min_gas_limit > self.limits.max_gas_limit {
            return Err(invalid("limits.min_gas_limit", "exceeds max_gas_limit"));
        }
        if let Some(authority) = &self.authority {
            if authority.signers.is_empty() {
                return Err(invalid("authority.signers", "at least one signer is required"));
            }
        }
        Ok(())
    }
}
