//! Header validation shared by all engines.
//!
//! [`HeaderValidator`] runs the engine-independent checks in a fixed order
//! and defers the protocol-specific parts (expected difficulty, extra-data
//! layout, timestamp spacing and the seal predicate) to a [`SealRules`]
//! implementation:
//!
//! 1. extra data
//! 2. future drift (skipped for uncles) and timestamp ordering
//! 3. exact difficulty
//! 4. gas limit and gas used
//! 5. block number
//! 6. seal, when requested
//!
//! Validation never mutates anything. The current time comes from an
//! injectable [`Clock`].

use std::fmt;
use std::sync::Arc;

use forge_core::config::ChainConfig;
use forge_core::error::ConsensusError;
use forge_core::traits::ChainHeaderReader;
use forge_core::types::{Header, U256};

/// Source of the current Unix time in seconds.
pub type Clock = Arc<dyn Fn() -> u64 + Send + Sync>;

/// Wall clock backed by `chrono`.
pub fn system_clock() -> Clock {
    Arc::new(|| chrono::Utc::now().timestamp().max(0) as u64)
}

/// Protocol-specific parts of header validation.
pub trait SealRules: Send + Sync {
    /// Difficulty `header` must carry on top of `parent`.
    fn expected_difficulty(
        &self,
        config: &ChainConfig,
        header: &Header,
        parent: &Header,
    ) -> Result<U256, ConsensusError>;

    /// Check the extra-data field. Defaults to the configured size cap.
    fn verify_extra_data(&self, config: &ChainConfig, header: &Header) -> Result<(), ConsensusError> {
        let max = config.limits.max_extra_data;
        if header.extra_data.len() > max {
            return Err(ConsensusError::OversizedExtraData {
                size: header.extra_data.len(),
                max,
            });
        }
        Ok(())
    }

    /// Check timestamp spacing against the parent. Defaults to strictly increasing.
    fn verify_timestamp(
        &self,
        _config: &ChainConfig,
        header: &Header,
        parent: &Header,
    ) -> Result<(), ConsensusError> {
        if header.timestamp <= parent.timestamp {
            return Err(ConsensusError::InvalidTimestamp {
                timestamp: header.timestamp,
                parent: parent.timestamp,
            });
        }
        Ok(())
    }

    /// Seal predicate.
    fn verify_seal(&self, config: &ChainConfig, header: &Header) -> Result<(), ConsensusError>;
}

/// Validates single headers against their parents.
pub struct HeaderValidator<R> {
    rules: R,
    clock: Clock,
}

impl<R> fmt::Debug for HeaderValidator<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeaderValidator").finish_non_exhaustive()
    }
}

impl<R: SealRules> HeaderValidator<R> {
    pub fn new(rules: R, clock: Clock) -> Self {
        Self { rules, clock }
    }

    pub fn rules(&self) -> &R {
        &self.rules
    }

    /// Current time according to the injected clock.
    pub fn now(&self) -> u64 {
        (self.clock)()
    }

    /// Validate `header` against its parent looked up in `chain`.
    ///
    /// Headers the chain already knows are accepted without further checks.
    pub fn verify_header<C>(&self, chain: &C, header: &Header, seal: bool) -> Result<(), ConsensusError>
    where
        C: ChainHeaderReader + ?Sized,
    {
        if chain.has_header(&header.hash(), header.number)? {
            return Ok(());
        }
        let parent = lookup_parent(chain, header)?;
        self.verify_with_parent(chain.config(), header, &parent, false, seal)
    }

    /// Validate `headers[index]`, taking `headers[index - 1]` as the parent
    /// when its hash matches and falling back to the chain otherwise.
    pub fn verify_indexed<C>(
        &self,
        chain: &C,
        headers: &[Header],
        index: usize,
        seal: bool,
    ) -> Result<(), ConsensusError>
    where
        C: ChainHeaderReader + ?Sized,
    {
        let header = &headers[index];
        if chain.has_header(&header.hash(), header.number)? {
            return Ok(());
        }
        let looked_up;
        let parent = match index.checked_sub(1).map(|i| &headers[i]) {
            Some(prev) if prev.hash() == header.parent_hash => prev,
            _ => {
                looked_up = lookup_parent(chain, header)?;
                &looked_up
            }
        };
        self.verify_with_parent(chain.config(), header, parent, false, seal)
    }

    /// Run every check of `header` against a resolved `parent`.
    pub fn verify_with_parent(
        &self,
        config: &ChainConfig,
        header: &Header,
        parent: &Header,
        uncle: bool,
        seal: bool,
    ) -> Result<(), ConsensusError> {
        self.rules.verify_extra_data(config, header)?;

        if !uncle {
            let now = self.now();
            if header.timestamp > now.saturating_add(config.limits.allowed_future_secs) {
                return Err(ConsensusError::FutureBlock {
                    timestamp: header.timestamp,
                    now,
                });
            }
        }
        self.rules.verify_timestamp(config, header, parent)?;

        let expected = self.rules.expected_difficulty(config, header, parent)?;
        if header.difficulty != expected {
            return Err(ConsensusError::InvalidDifficulty {
                got: header.difficulty,
                expected,
            });
        }

        verify_gas(config, header, parent)?;

        let expected_number = parent.number.saturating_add(1);
        if header.number != expected_number {
            return Err(ConsensusError::InvalidNumber {
                got: header.number,
                expected: expected_number,
            });
        }

        if seal {
            self.rules.verify_seal(config, header)?;
        }
        Ok(())
    }
}

/// Resolve the parent of `header` from the chain.
pub(crate) fn lookup_parent<C>(chain: &C, header: &Header) -> Result<Header, ConsensusError>
where
    C: ChainHeaderReader + ?Sized,
{
    let number = header
        .number
        .checked_sub(1)
        .ok_or(ConsensusError::UnknownAncestor)?;
    chain
        .get_header(&header.parent_hash, number)?
        .ok_or(ConsensusError::UnknownAncestor)
}

/// Gas limit bounds and gas usage.
fn verify_gas(config: &ChainConfig, header: &Header, parent: &Header) -> Result<(), ConsensusError> {
    let limits = &config.limits;
    let invalid_limit = || ConsensusError::InvalidGasLimit {
        got: header.gas_limit,
        parent: parent.gas_limit,
    };
    if header.gas_limit > limits.max_gas_limit {
        return Err(invalid_limit());
    }
    if header.gas_used > header.gas_limit {
        return Err(ConsensusError::InvalidGasUsed {
            used: header.gas_used,
            limit: header.gas_limit,
        });
    }
    let diff = header.gas_limit.abs_diff(parent.gas_limit);
    let bound = parent.gas_limit / limits.gas_limit_bound_divisor.max(1);
    if diff >= bound || header.gas_limit < limits.min_gas_limit {
        return Err(invalid_limit());
    }
    Ok(())
}
