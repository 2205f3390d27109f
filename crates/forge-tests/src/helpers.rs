//! Shared test helpers for E2E and adversarial tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ed25519_dalek::SigningKey;
use forge_consensus::validator::Clock;
use forge_consensus::{Authority, Engine, Ethash, EthashConfig, PowMode, StopSignal};
use forge_core::chain_store::{MemoryChain, MemoryState};
use forge_core::config::{AuthorityConfig, ChainConfig};
use forge_core::constants::GENESIS_TIMESTAMP;
use forge_core::traits::ChainHeaderReader;
use forge_core::types::{Address, Block, Header, U256};

/// Fixed "now" used by every test engine, far past genesis.
pub const NOW: u64 = GENESIS_TIMESTAMP + 1_000_000;

/// Seconds between consecutive proof-of-work test blocks.
pub const SPACING: u64 = 10;

pub fn fixed_clock() -> Clock {
    Arc::new(|| NOW)
}

static TICKS: AtomicU64 = AtomicU64::new(NOW);

/// Clock shared by every authority test engine. Each reading is one second
/// after the previous one, so a freshly prepared header is never ahead of
/// the signer and never in the future for a verifier.
pub fn ticking_clock() -> Clock {
    Arc::new(|| TICKS.fetch_add(1, Ordering::Relaxed))
}

/// Chain parameters with a tiny constant difficulty: the minimum is 16 and
/// the step `16 / 2048` rounds to zero, so every block carries 16.
pub fn dev_config() -> ChainConfig {
    let mut config = ChainConfig::default();
    config.difficulty.minimum = U256::from(16u64);
    config.difficulty.bomb = None;
    config
}

pub fn pow_engine(mode: PowMode) -> Ethash {
    Ethash::with_clock(
        EthashConfig {
            mode,
            verify_threads: 4,
            seal_threads: 2,
            batch_size: 256,
            ..EthashConfig::default()
        },
        fixed_clock(),
    )
}

pub fn signing_key(seed: u8) -> SigningKey {
    SigningKey::from_bytes(&[seed; 32])
}

pub fn signer_address(seed: u8) -> Address {
    Address::from_public_key(&signing_key(seed).verifying_key().to_bytes())
}

/// Authority chain over the signers derived from `seeds`, in that turn order.
pub fn authority_config(seeds: &[u8], period: u64) -> ChainConfig {
    ChainConfig {
        authority: Some(AuthorityConfig {
            period,
            signers: seeds.iter().map(|s| signer_address(*s)).collect(),
            wiggle_ms: 5,
        }),
        ..ChainConfig::default()
    }
}

pub fn authority_engine(seed: u8) -> Authority {
    let engine = Authority::with_clock(ticking_clock());
    engine.authorize(signing_key(seed));
    engine
}

/// Unprepared child template of `parent`.
pub fn child_header(parent: &Header, coinbase: Address) -> Header {
    Header {
        parent_hash: parent.hash(),
        number: parent.number + 1,
        timestamp: parent.timestamp + SPACING,
        gas_limit: parent.gas_limit,
        coinbase,
        ..Header::default()
    }
}

/// Prepare, finalize and seal `header` without importing it.
pub fn produce_block(
    engine: &dyn Engine,
    chain: &MemoryChain,
    state: &mut MemoryState,
    mut header: Header,
    uncles: Vec<Header>,
) -> Block {
    engine.prepare(chain, &mut header).expect("prepare");
    let block = engine
        .finalize_and_assemble(chain, header, state, vec![], uncles, &[])
        .expect("finalize_and_assemble");
    engine
        .seal(chain, block, StopSignal::new())
        .expect("seal")
        .blocking_recv()
        .expect("sealed block")
}

/// Produce `count` blocks on the current head, importing each.
pub fn extend_chain(
    engine: &dyn Engine,
    chain: &MemoryChain,
    state: &mut MemoryState,
    count: usize,
) -> Vec<Block> {
    (0..count)
        .map(|i| {
            let parent = chain.current_header().expect("head");
            let header = child_header(&parent, Address([i as u8; 20]));
            let block = produce_block(engine, chain, state, header, vec![]);
            chain.insert_block(block.clone()).expect("insert");
            block
        })
        .collect()
}

pub fn headers_of(blocks: &[Block]) -> Vec<Header> {
    blocks.iter().map(|b| b.header.clone()).collect()
}

/// A fresh chain holding only the genesis of `config`, as seen by a node
/// that is about to import a batch.
pub fn fresh_reader(config: ChainConfig) -> Arc<dyn ChainHeaderReader> {
    Arc::new(MemoryChain::with_genesis(config))
}

/// Poll `active` until it reports zero or five seconds pass.
pub fn wait_for_idle(active: impl Fn() -> usize) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if active() == 0 {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    active() == 0
}
