//! End-to-end tests for the Forge consensus engines.
//!
//! Each test builds a chain through the public engine interface, imports it
//! into an in-memory store and then verifies it again from scratch the way a
//! syncing node would.

use std::sync::Arc;

use forge_consensus::{Engine, PoW, PowMode};
use forge_core::chain_store::{InsertOutcome, MemoryChain, MemoryState};
use forge_core::config::ChainConfig;
use forge_core::constants::{DIFF_IN_TURN, DIFF_NO_TURN};
use forge_core::traits::{ChainHeaderReader, StateStore};
use forge_core::types::{Address, U256};
use forge_tests::helpers::*;
use serde_json::json;

// ------------------------------------------------------------------
// Proof-of-work
// ------------------------------------------------------------------

#[test]
fn pow_chain_mines_and_batch_verifies() {
    let chain = MemoryChain::with_genesis(dev_config());
    let miner = pow_engine(PowMode::Normal);
    let mut state = MemoryState::new();
    let blocks = extend_chain(&miner, &chain, &mut state, 6);

    assert_eq!(chain.head_number(), 6);
    assert!(miner.hashrate() > 0.0);
    let reward = chain.config().rewards.reward_at(1);
    for (i, block) in blocks.iter().enumerate() {
        assert_eq!(miner.author(&block.header), Ok(Address([i as u8; 20])));
        assert_eq!(state.balance(&Address([i as u8; 20])), reward);
    }

    let verifier = pow_engine(PowMode::Normal);
    let results = verifier
        .verify_headers(fresh_reader(dev_config()), headers_of(&blocks), vec![true; 6])
        .unwrap()
        .collect_blocking();
    assert_eq!(results, vec![Ok(()); 6]);

    miner.close().unwrap();
    verifier.close().unwrap();
    assert!(wait_for_idle(|| miner.active_workers()));
    assert!(wait_for_idle(|| verifier.active_workers()));
}

#[test]
fn uncle_inclusion_pays_both_miners() {
    let chain = MemoryChain::with_genesis(dev_config());
    let engine = pow_engine(PowMode::Fake);
    let mut state = MemoryState::new();
    let blocks = extend_chain(&engine, &chain, &mut state, 2);

    // Stale sibling of block 2, mined by someone else.
    let mut side_state = MemoryState::new();
    let stale = produce_block(
        &engine,
        &chain,
        &mut side_state,
        child_header(&blocks[0].header, Address([0xAA; 20])),
        vec![],
    );
    assert_eq!(chain.insert_block(stale.clone()).unwrap(), InsertOutcome::SideChain);

    let includer = Address([0xBB; 20]);
    let mut state = MemoryState::new();
    let block = produce_block(
        &engine,
        &chain,
        &mut state,
        child_header(&blocks[1].header, includer),
        vec![stale.header.clone()],
    );
    assert!(block.header.has_uncles());
    assert_eq!(engine.verify_uncles(&chain, &block), Ok(()));

    let base = chain.config().rewards.reward_at(3);
    // Uncle at height 2 included at height 3: (2 + 8 - 3) / 8.
    assert_eq!(state.balance(&Address([0xAA; 20])), base * 7u64 / 8u64);
    assert_eq!(state.balance(&includer), base + base / 32u64);

    chain.insert_block(block.clone()).unwrap();
    assert_eq!(chain.head_number(), 3);

    // A parent with uncles pushes the next difficulty up by one extra step
    // on mainnet parameters.
    let mainnet = ChainConfig::default();
    let mut parent = block.header.clone();
    parent.difficulty = U256::from(2_048_000u64);
    let reader = MemoryChain::with_genesis(mainnet);
    let with_uncles = engine.calc_difficulty(&reader, parent.timestamp + 10, &parent);
    parent.uncle_hash = Default::default();
    let without = engine.calc_difficulty(&reader, parent.timestamp + 10, &parent);
    assert_eq!(with_uncles - without, U256::from(1_000u64));
}

#[test]
fn heavier_fork_becomes_canonical_and_verifies() {
    let config = dev_config();
    let chain = MemoryChain::with_genesis(config.clone());
    let engine = pow_engine(PowMode::Fake);
    let mut state = MemoryState::new();
    let main = extend_chain(&engine, &chain, &mut state, 2);

    // Build a longer competing branch from genesis.
    let genesis = chain.get_header_by_number(0).unwrap().unwrap();
    let mut parent = genesis;
    let mut fork = Vec::new();
    for i in 0..3u8 {
        let block = produce_block(
            &engine,
            &chain,
            &mut MemoryState::new(),
            child_header(&parent, Address([0x40 + i; 20])),
            vec![],
        );
        chain.insert_block(block.clone()).unwrap();
        parent = block.header.clone();
        fork.push(block);
    }
    assert_eq!(chain.head_number(), 3);
    assert_eq!(chain.current_header().unwrap(), fork[2].header);
    assert_ne!(chain.get_header_by_number(1).unwrap().unwrap(), main[0].header);

    let results = engine
        .verify_headers(fresh_reader(config), headers_of(&fork), vec![true; 3])
        .unwrap()
        .collect_blocking();
    assert_eq!(results, vec![Ok(()); 3]);
}

#[tokio::test(flavor = "multi_thread")]
async fn async_consumer_receives_ordered_results() {
    let chain = MemoryChain::with_genesis(dev_config());
    let engine = pow_engine(PowMode::Fake);
    let blocks = tokio::task::block_in_place(|| {
        extend_chain(&engine, &chain, &mut MemoryState::new(), 32)
    });

    let mut verification = engine
        .verify_headers(fresh_reader(dev_config()), headers_of(&blocks), vec![true; 32])
        .unwrap();
    assert_eq!(verification.len(), 32);
    let mut received = 0;
    while let Some(result) = verification.recv().await {
        assert_eq!(result, Ok(()));
        received += 1;
    }
    assert_eq!(received, 32);
}

// ------------------------------------------------------------------
// Proof-of-authority
// ------------------------------------------------------------------

#[test]
fn authority_round_robin_chain() {
    let seeds = [1u8, 2, 3];
    let config = authority_config(&seeds, 0);
    let chain = MemoryChain::with_genesis(config.clone());
    let signers: Vec<_> = seeds.iter().map(|s| authority_engine(*s)).collect();
    let mut state = MemoryState::new();

    let mut blocks = Vec::new();
    for number in 1..=6u64 {
        let parent = chain.current_header().unwrap();
        // In-turn signer for `number` is signers[number % 3].
        let engine = &signers[(number % 3) as usize];
        let header = child_header(&parent, Address::ZERO);
        let block = produce_block(engine, &chain, &mut state, header, vec![]);
        assert_eq!(block.header.difficulty, U256::from(DIFF_IN_TURN));
        assert_eq!(
            engine.author(&block.header),
            Ok(signer_address(seeds[(number % 3) as usize]))
        );
        chain.insert_block(block.clone()).unwrap();
        blocks.push(block);
    }
    // No rewards under proof-of-authority.
    assert_eq!(state.accounts(), 0);

    let observer = authority_engine(9);
    let results = observer
        .verify_headers(fresh_reader(config), headers_of(&blocks), vec![true; 6])
        .unwrap()
        .collect_blocking();
    assert_eq!(results, vec![Ok(()); 6]);
}

#[test]
fn out_of_turn_block_loses_fork_choice() {
    let seeds = [1u8, 2];
    let chain = MemoryChain::with_genesis(authority_config(&seeds, 0));
    let genesis = chain.current_header().unwrap();

    // Block 1 is in turn for seed 2.
    let late = produce_block(
        &authority_engine(1),
        &chain,
        &mut MemoryState::new(),
        child_header(&genesis, Address::ZERO),
        vec![],
    );
    let on_time = produce_block(
        &authority_engine(2),
        &chain,
        &mut MemoryState::new(),
        child_header(&genesis, Address::ZERO),
        vec![],
    );
    assert_eq!(late.header.difficulty, U256::from(DIFF_NO_TURN));
    assert_eq!(on_time.header.difficulty, U256::from(DIFF_IN_TURN));

    assert_eq!(chain.insert_block(late).unwrap(), InsertOutcome::Canonical);
    assert_eq!(chain.insert_block(on_time.clone()).unwrap(), InsertOutcome::Canonical);
    assert_eq!(chain.current_header().unwrap(), on_time.header);
}

// ------------------------------------------------------------------
// Engines behind trait objects
// ------------------------------------------------------------------

#[test]
fn engines_are_interchangeable_behind_dyn() {
    let pow_chain: Arc<MemoryChain> = Arc::new(MemoryChain::with_genesis(dev_config()));
    let poa_chain: Arc<MemoryChain> = Arc::new(MemoryChain::with_genesis(authority_config(&[5], 0)));
    let engines: Vec<(Box<dyn Engine>, Arc<MemoryChain>, &str)> = vec![
        (Box::new(pow_engine(PowMode::Fake)), pow_chain, "ethash"),
        (Box::new(authority_engine(5)), poa_chain, "authority"),
    ];

    for (engine, chain, namespace) in &engines {
        let blocks = extend_chain(engine.as_ref(), chain, &mut MemoryState::new(), 3);
        for block in &blocks {
            assert_ne!(engine.seal_hash(&block.header), block.hash());
        }
        let results = engine
            .verify_headers(fresh_reader(chain.config().clone()), headers_of(&blocks), vec![true; 3])
            .unwrap()
            .collect_blocking();
        assert_eq!(results, vec![Ok(()); 3]);

        let apis = engine.apis(&**chain);
        assert_eq!(apis[0].namespace, *namespace);
        engine.close().unwrap();
        engine.close().unwrap();
    }

    let (pow, _, _) = &engines[0];
    let apis = pow.apis(&MemoryChain::with_genesis(dev_config()));
    assert_eq!(apis[0].call("mode"), Some(json!("fake")));
}
