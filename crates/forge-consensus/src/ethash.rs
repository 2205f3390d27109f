//! Proof-of-work engine.
//!
//! [`Ethash`] combines the uncle-aware difficulty rule, the uncle-aware
//! reward schedule and the BLAKE3/SHA-256 digest from [`crate::pow`]. In
//! [`PowMode::Fake`] seals are not checked and sealing returns the block at
//! once, which lets tests build long chains without mining.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use forge_core::config::ChainConfig;
use forge_core::difficulty;
use forge_core::error::ConsensusError;
use forge_core::reward::block_rewards;
use forge_core::traits::{ChainHeaderReader, ChainReader, StateStore};
use forge_core::types::{Address, Block, Hash256, Header, Receipt, Transaction, U256};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::api::{Api, ApiMethod};
use crate::engine::{Engine, PoW};
use crate::finalizer;
use crate::hashrate::HashrateMeter;
use crate::lifecycle::{Lifecycle, StopSignal};
use crate::pow;
use crate::sealer::{self, SealResults, SearchParams};
use crate::uncles;
use crate::validator::{lookup_parent, system_clock, Clock, HeaderValidator, SealRules};
use crate::verifier::{spawn_verification, Verification};

/// Seal checking mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowMode {
    /// Full proof-of-work.
    #[default]
    Normal,
    /// Seals always verify and sealing is instantaneous.
    Fake,
}

impl fmt::Display for PowMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => f.write_str("normal"),
            Self::Fake => f.write_str("fake"),
        }
    }
}

/// Engine tuning. Thread counts of 0 mean one per available CPU.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EthashConfig {
    pub mode: PowMode,
    pub verify_threads: usize,
    pub seal_threads: usize,
    /// Nonces hashed between stop checks.
    pub batch_size: u64,
    /// Per-worker nonce budget for one seal call.
    pub max_attempts: Option<u64>,
    pub hashrate_window_secs: u64,
    /// Capacity of each seal call's result buffer.
    pub result_capacity: usize,
    /// Fake mode only: the block number whose seal is reported invalid.
    pub fake_fail: Option<u64>,
}

impl Default for EthashConfig {
    fn default() -> Self {
        Self {
            mode: PowMode::Normal,
            verify_threads: 0,
            seal_threads: 0,
            batch_size: 4096,
            max_attempts: None,
            hashrate_window_secs: 60,
            result_capacity: 1,
            fake_fail: None,
        }
    }
}

struct EthashRules {
    mode: PowMode,
    fake_fail: Option<u64>,
}

impl SealRules for EthashRules {
    fn expected_difficulty(
        &self,
        config: &ChainConfig,
        header: &Header,
        parent: &Header,
    ) -> Result<U256, ConsensusError> {
        Ok(difficulty::calc_difficulty(&config.difficulty, header.timestamp, parent))
    }

    fn verify_seal(&self, _config: &ChainConfig, header: &Header) -> Result<(), ConsensusError> {
        match self.mode {
            PowMode::Fake if self.fake_fail == Some(header.number) => Err(ConsensusError::InvalidSeal),
            PowMode::Fake => Ok(()),
            PowMode::Normal => pow::verify_pow(header),
        }
    }
}

struct EthashInner {
    config: EthashConfig,
    validator: HeaderValidator<EthashRules>,
    lifecycle: Lifecycle,
    hashrate: Arc<HashrateMeter>,
}

/// Proof-of-work consensus engine. Cheap to clone; clones share workers.
#[derive(Clone)]
pub struct Ethash {
    inner: Arc<EthashInner>,
}

impl fmt::Debug for Ethash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ethash")
            .field("mode", &self.inner.config.mode)
            .field("active_workers", &self.active_workers())
            .finish_non_exhaustive()
    }
}

impl Ethash {
    /// Create an engine that reads the wall clock.
    pub fn new(config: EthashConfig) -> Self {
        Self::with_clock(config, system_clock())
    }

    /// Create an engine with a custom clock for testing.
    pub fn with_clock(config: EthashConfig, clock: Clock) -> Self {
        let rules = EthashRules {
            mode: config.mode,
            fake_fail: config.fake_fail,
        };
        let window = Duration::from_secs(config.hashrate_window_secs.max(1));
        Self {
            inner: Arc::new(EthashInner {
                validator: HeaderValidator::new(rules, clock),
                lifecycle: Lifecycle::new(),
                hashrate: Arc::new(HashrateMeter::new(window)),
                config,
            }),
        }
    }

    /// Engine that accepts every seal.
    pub fn fake() -> Self {
        Self::new(EthashConfig {
            mode: PowMode::Fake,
            ..EthashConfig::default()
        })
    }

    /// Fake engine that rejects the seal of block `number` only.
    pub fn fake_failer(number: u64) -> Self {
        Self::new(EthashConfig {
            mode: PowMode::Fake,
            fake_fail: Some(number),
            ..EthashConfig::default()
        })
    }

    pub fn config(&self) -> &EthashConfig {
        &self.inner.config
    }

    /// Background verification and sealing threads still running.
    pub fn active_workers(&self) -> usize {
        self.inner.lifecycle.active_workers()
    }

    fn threads(configured: usize) -> usize {
        if configured == 0 {
            num_cpus::get().max(1)
        } else {
            configured
        }
    }
}

impl Engine for Ethash {
    fn author(&self, header: &Header) -> Result<Address, ConsensusError> {
        Ok(header.coinbase)
    }

    fn verify_header(
        &self,
        chain: &dyn ChainHeaderReader,
        header: &Header,
        seal: bool,
    ) -> Result<(), ConsensusError> {
        self.inner.lifecycle.ensure_open()?;
        self.inner.validator.verify_header(chain, header, seal)
    }

    fn verify_headers(
        &self,
        chain: Arc<dyn ChainHeaderReader>,
        headers: Vec<Header>,
        seals: Vec<bool>,
    ) -> Result<Verification, ConsensusError> {
        let inner = Arc::clone(&self.inner);
        spawn_verification(
            &self.inner.lifecycle,
            headers,
            seals,
            Self::threads(self.inner.config.verify_threads),
            move |batch, index, seal| inner.validator.verify_indexed(&*chain, batch, index, seal),
        )
    }

    fn verify_uncles(&self, chain: &dyn ChainReader, block: &Block) -> Result<(), ConsensusError> {
        self.inner.lifecycle.ensure_open()?;
        uncles::verify_uncles(&self.inner.validator, chain, block)
    }

    fn prepare(&self, chain: &dyn ChainHeaderReader, header: &mut Header) -> Result<(), ConsensusError> {
        self.inner.lifecycle.ensure_open()?;
        let parent = lookup_parent(chain, header)?;
        header.difficulty = self.calc_difficulty(chain, header.timestamp, &parent);
        Ok(())
    }

    fn finalize(
        &self,
        chain: &dyn ChainHeaderReader,
        header: &mut Header,
        state: &mut dyn StateStore,
        _transactions: &[Transaction],
        uncles: &[Header],
    ) -> Result<(), ConsensusError> {
        self.inner.lifecycle.ensure_open()?;
        let credits = block_rewards(&chain.config().rewards, header, uncles);
        finalizer::finalize_header(header, state, uncles, &credits);
        Ok(())
    }

    fn finalize_and_assemble(
        &self,
        chain: &dyn ChainHeaderReader,
        mut header: Header,
        state: &mut dyn StateStore,
        transactions: Vec<Transaction>,
        uncles: Vec<Header>,
        receipts: &[Receipt],
    ) -> Result<Block, ConsensusError> {
        self.finalize(chain, &mut header, state, &transactions, &uncles)?;
        finalizer::assemble(header, transactions, uncles, receipts)
    }

    fn seal(
        &self,
        _chain: &dyn ChainHeaderReader,
        block: Block,
        stop: StopSignal,
    ) -> Result<SealResults, ConsensusError> {
        let inner = &self.inner;
        inner.lifecycle.ensure_open()?;
        if inner.config.mode == PowMode::Fake {
            let mut header = block.header.clone();
            header.nonce = 0;
            header.mix_digest = Hash256::ZERO;
            return Ok(sealer::ready(block.with_header(header)));
        }
        let params = SearchParams {
            threads: Self::threads(inner.config.seal_threads),
            batch_size: inner.config.batch_size,
            max_attempts: inner.config.max_attempts,
            capacity: inner.config.result_capacity,
        };
        sealer::spawn_search(&inner.lifecycle, Arc::clone(&inner.hashrate), block, params, stop)
    }

    fn seal_hash(&self, header: &Header) -> Hash256 {
        header.seal_hash()
    }

    fn calc_difficulty(&self, chain: &dyn ChainHeaderReader, time: u64, parent: &Header) -> U256 {
        difficulty::calc_difficulty(&chain.config().difficulty, time, parent)
    }

    fn apis(&self, _chain: &dyn ChainHeaderReader) -> Vec<Api> {
        let hashrate = Arc::clone(&self.inner);
        let workers = Arc::clone(&self.inner);
        let mode = self.inner.config.mode;
        vec![Api {
            namespace: "ethash",
            version: "1.0",
            methods: vec![
                ApiMethod::new("hashrate", move || json!(hashrate.hashrate.rate())),
                ApiMethod::new("activeWorkers", move || {
                    json!(workers.lifecycle.active_workers())
                }),
                ApiMethod::new("mode", move || json!(mode.to_string())),
            ],
        }]
    }

    fn close(&self) -> Result<(), ConsensusError> {
        if self.inner.lifecycle.close() {
            tracing::debug!(mode = %self.inner.config.mode, "ethash engine closed");
        }
        Ok(())
    }
}

impl PoW for Ethash {
    fn hashrate(&self) -> f64 {
        self.inner.hashrate.rate()
    }
}
