//! In-memory chain and state stores.
//!
//! [`MemoryChain`] implements [`ChainHeaderReader`] and [`ChainReader`] over
//! hash maps behind a `parking_lot::RwLock`, so one instance can be shared
//! with verifier threads while new blocks are inserted. It accumulates total
//! difficulty and keeps the heaviest chain canonical. [`MemoryState`] is a
//! balance map with a deterministic Merkle commitment.
//!
//! Neither store validates consensus rules. Blocks passed to
//! [`MemoryChain::insert_block`] must already be verified.

use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;

use crate::config::ChainConfig;
use crate::error::StoreError;
use crate::merkle;
use crate::traits::{ChainHeaderReader, ChainReader, StateStore};
use crate::types::{Address, Block, Hash256, Header, U256};

/// Outcome of [`MemoryChain::insert_block`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The block became the new canonical head.
    Canonical,
    /// The block was stored on a lighter side branch.
    SideChain,
}

#[derive(Debug, Default)]
struct ChainInner {
    blocks: HashMap<Hash256, Block>,
    td: HashMap<Hash256, U256>,
    canonical: BTreeMap<u64, Hash256>,
    head: Hash256,
}

/// Heaviest-chain in-memory block store.
#[derive(Debug)]
pub struct MemoryChain {
    config: ChainConfig,
    inner: RwLock<ChainInner>,
}

impl MemoryChain {
    /// Create a chain rooted at `root`, usually the genesis block.
    ///
    /// The root's parent is never consulted, so any block can serve as the
    /// root of a test chain.
    pub fn new(config: ChainConfig, root: Block) -> Self {
        let hash = root.hash();
        let mut inner = ChainInner {
            head: hash,
            ..ChainInner::default()
        };
        inner.td.insert(hash, root.header.difficulty);
        inner.canonical.insert(root.number(), hash);
        inner.blocks.insert(hash, root);
        Self {
            config,
            inner: RwLock::new(inner),
        }
    }

    /// Chain rooted at the genesis block derived from `config`.
    pub fn with_genesis(config: ChainConfig) -> Self {
        let genesis = crate::genesis::genesis_block(&config);
        Self::new(config, genesis)
    }

    /// Store a verified block whose parent is already known.
    ///
    /// The block becomes canonical when its total difficulty exceeds the
    /// current head's; ties keep the existing head.
    pub fn insert_block(&self, block: Block) -> Result<InsertOutcome, StoreError> {
        let hash = block.hash();
        let mut inner = self.inner.write();
        if inner.blocks.contains_key(&hash) {
            return Err(StoreError::DuplicateBlock(hash));
        }
        let parent_td = match inner.blocks.get(&block.header.parent_hash) {
            Some(parent) if parent.number() + 1 == block.number() => inner
                .td
                .get(&block.header.parent_hash)
                .copied()
                .unwrap_or_default(),
            _ => return Err(StoreError::MissingParent(block.header.parent_hash)),
        };
        let td = parent_td.saturating_add(block.header.difficulty);
        let head_td = inner.td.get(&inner.head).copied().unwrap_or_default();
        let number = block.number();

        inner.td.insert(hash, td);
        inner.blocks.insert(hash, block);

        if td <= head_td {
            tracing::debug!(%hash, number, "stored side-chain block");
            return Ok(InsertOutcome::SideChain);
        }

        // Rewrite the canonical index from the new head back to the fork point.
        inner.canonical.retain(|&height, _| height <= number);
        let mut cursor = hash;
        let mut height = number;
        loop {
            if inner.canonical.get(&height) == Some(&cursor) {
                break;
            }
            inner.canonical.insert(height, cursor);
            let parent = match inner.blocks.get(&cursor) {
                Some(b) if height > 0 => b.header.parent_hash,
                _ => break,
            };
            if !inner.blocks.contains_key(&parent) {
                break;
            }
            cursor = parent;
            height -= 1;
        }
        inner.head = hash;
        tracing::debug!(%hash, number, %td, "new canonical head");
        Ok(InsertOutcome::Canonical)
    }

    /// Number of the canonical head.
    pub fn head_number(&self) -> u64 {
        let inner = self.inner.read();
        inner
            .blocks
            .get(&inner.head)
            .map(Block::number)
            .unwrap_or_default()
    }

    /// Canonical headers from `from` up to and including the head.
    pub fn canonical_headers(&self, from: u64) -> Vec<Header> {
        let inner = self.inner.read();
        inner
            .canonical
            .range(from..)
            .filter_map(|(_, hash)| inner.blocks.get(hash).map(|b| b.header.clone()))
            .collect()
    }

    /// Total number of stored blocks, side chains included.
    pub fn len(&self) -> usize {
        self.inner.read().blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().blocks.is_empty()
    }
}

impl ChainHeaderReader for MemoryChain {
    fn config(&self) -> &ChainConfig {
        &self.config
    }

    fn current_header(&self) -> Result<Header, StoreError> {
        let inner = self.inner.read();
        inner
            .blocks
            .get(&inner.head)
            .map(|b| b.header.clone())
            .ok_or_else(|| StoreError::Backend("head block missing".into()))
    }

    fn get_header(&self, hash: &Hash256, number: u64) -> Result<Option<Header>, StoreError> {
        Ok(self
            .inner
            .read()
            .blocks
            .get(hash)
            .filter(|b| b.number() == number)
            .map(|b| b.header.clone()))
    }

    fn get_header_by_number(&self, number: u64) -> Result<Option<Header>, StoreError> {
        let inner = self.inner.read();
        Ok(inner
            .canonical
            .get(&number)
            .and_then(|hash| inner.blocks.get(hash))
            .map(|b| b.header.clone()))
    }

    fn get_header_by_hash(&self, hash: &Hash256) -> Result<Option<Header>, StoreError> {
        Ok(self.inner.read().blocks.get(hash).map(|b| b.header.clone()))
    }

    fn get_td(&self, hash: &Hash256, number: u64) -> Result<Option<U256>, StoreError> {
        let inner = self.inner.read();
        Ok(inner
            .blocks
            .get(hash)
            .filter(|b| b.number() == number)
            .and_then(|_| inner.td.get(hash).copied()))
    }
}

impl ChainReader for MemoryChain {
    fn get_block(&self, hash: &Hash256, number: u64) -> Result<Option<Block>, StoreError> {
        Ok(self
            .inner
            .read()
            .blocks
            .get(hash)
            .filter(|b| b.number() == number)
            .cloned())
    }
}

/// Account balances with a deterministic commitment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryState {
    balances: BTreeMap<Address, U256>,
}

impl MemoryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of accounts with a recorded balance.
    pub fn accounts(&self) -> usize {
        self.balances.len()
    }
}

impl StateStore for MemoryState {
    fn add_balance(&mut self, address: &Address, amount: U256) {
        let entry = self.balances.entry(*address).or_default();
        *entry = entry.saturating_add(amount);
    }

    fn balance(&self, address: &Address) -> U256 {
        self.balances.get(address).copied().unwrap_or_default()
    }

    /// Merkle root over `BLAKE3(address || balance_le)` in address order.
    fn intermediate_root(&mut self) -> Hash256 {
        let leaves: Vec<Hash256> = self
            .balances
            .iter()
            .map(|(address, balance)| {
                let mut amount = [0u8; 32];
                balance.to_little_endian(&mut amount);
                let mut hasher = blake3::Hasher::new();
                hasher.update(address.as_bytes());
                hasher.update(&amount);
                Hash256(hasher.finalize().into())
            })
            .collect();
        merkle::merkle_root(&leaves)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genesis::genesis_block;

    fn child(parent: &Header, difficulty: u64, salt: u8) -> Block {
        Block {
            header: Header {
                parent_hash: parent.hash(),
                number: parent.number + 1,
                difficulty: U256::from(difficulty),
                timestamp: parent.timestamp + 10,
                extra_data: vec![salt],
                ..Header::default()
            },
            ..Block::default()
        }
    }

    fn chain() -> MemoryChain {
        MemoryChain::with_genesis(ChainConfig::default())
    }

    // ------------------------------------------------------------------
    // Insertion
    // ------------------------------------------------------------------

    #[test]
    fn genesis_is_head() {
        let c = chain();
        let genesis = genesis_block(c.config());
        assert_eq!(c.current_header().unwrap(), genesis.header);
        assert_eq!(c.head_number(), 0);
        assert_eq!(c.len(), 1);
        assert_eq!(
            c.get_td(&genesis.hash(), 0).unwrap(),
            Some(genesis.header.difficulty)
        );
    }

    #[test]
    fn insert_extends_head_and_accumulates_td() {
        let c = chain();
        let g = c.current_header().unwrap();
        let b1 = child(&g, 100, 0);
        assert_eq!(c.insert_block(b1.clone()).unwrap(), InsertOutcome::Canonical);
        assert_eq!(c.head_number(), 1);
        assert_eq!(
            c.get_td(&b1.hash(), 1).unwrap(),
            Some(g.difficulty + U256::from(100u64))
        );
        assert_eq!(c.get_header_by_number(1).unwrap(), Some(b1.header));
    }

    #[test]
    fn insert_rejects_unknown_parent() {
        let c = chain();
        let orphan = child(&Header { number: 5, ..Header::default() }, 1, 0);
        assert!(matches!(
            c.insert_block(orphan),
            Err(StoreError::MissingParent(_))
        ));
    }

    #[test]
    fn insert_rejects_duplicate() {
        let c = chain();
        let b1 = child(&c.current_header().unwrap(), 100, 0);
        c.insert_block(b1.clone()).unwrap();
        assert_eq!(
            c.insert_block(b1.clone()),
            Err(StoreError::DuplicateBlock(b1.hash()))
        );
    }

    // ------------------------------------------------------------------
    // Fork choice
    // ------------------------------------------------------------------

    #[test]
    fn lighter_fork_stays_on_side() {
        let c = chain();
        let g = c.current_header().unwrap();
        let a = child(&g, 100, 1);
        let b = child(&g, 50, 2);
        c.insert_block(a.clone()).unwrap();
        assert_eq!(c.insert_block(b.clone()).unwrap(), InsertOutcome::SideChain);
        assert_eq!(c.current_header().unwrap(), a.header);
        assert!(c.get_block(&b.hash(), 1).unwrap().is_some());
    }

    #[test]
    fn heavier_fork_reorganises_canonical_index() {
        let c = chain();
        let g = c.current_header().unwrap();
        let a1 = child(&g, 100, 1);
        let a2 = child(&a1.header, 100, 1);
        c.insert_block(a1.clone()).unwrap();
        c.insert_block(a2.clone()).unwrap();

        let b1 = child(&g, 150, 2);
        let b2 = child(&b1.header, 150, 2);
        assert_eq!(c.insert_block(b1.clone()).unwrap(), InsertOutcome::SideChain);
        assert_eq!(c.insert_block(b2.clone()).unwrap(), InsertOutcome::Canonical);

        assert_eq!(c.get_header_by_number(1).unwrap(), Some(b1.header));
        assert_eq!(c.get_header_by_number(2).unwrap(), Some(b2.header.clone()));
        assert_eq!(c.current_header().unwrap(), b2.header);
        assert_eq!(c.canonical_headers(0).len(), 3);
    }

    #[test]
    fn shorter_heavier_fork_truncates_index() {
        let c = chain();
        let g = c.current_header().unwrap();
        let a1 = child(&g, 10, 1);
        let a2 = child(&a1.header, 10, 1);
        c.insert_block(a1).unwrap();
        c.insert_block(a2).unwrap();

        let b1 = child(&g, 1_000, 2);
        assert_eq!(c.insert_block(b1.clone()).unwrap(), InsertOutcome::Canonical);
        assert_eq!(c.get_header_by_number(2).unwrap(), None);
        assert_eq!(c.head_number(), 1);
    }

    #[test]
    fn lookups_require_matching_number() {
        let c = chain();
        let g = c.current_header().unwrap();
        assert!(c.get_header(&g.hash(), 0).unwrap().is_some());
        assert!(c.get_header(&g.hash(), 1).unwrap().is_none());
        assert!(c.get_td(&g.hash(), 1).unwrap().is_none());
        assert!(c.get_header_by_hash(&g.hash()).unwrap().is_some());
    }

    // ------------------------------------------------------------------
    // MemoryState
    // ------------------------------------------------------------------

    #[test]
    fn empty_state_root_is_zero() {
        assert_eq!(MemoryState::new().intermediate_root(), Hash256::ZERO);
    }

    #[test]
    fn state_root_is_order_independent() {
        let mut a = MemoryState::new();
        a.add_balance(&Address([1; 20]), U256::from(5u64));
        a.add_balance(&Address([2; 20]), U256::from(7u64));
        let mut b = MemoryState::new();
        b.add_balance(&Address([2; 20]), U256::from(7u64));
        b.add_balance(&Address([1; 20]), U256::from(5u64));
        assert_eq!(a.intermediate_root(), b.intermediate_root());
        assert_eq!(a.accounts(), 2);
    }

    #[test]
    fn state_root_tracks_balances() {
        let mut s = MemoryState::new();
        s.add_balance(&Address([1; 20]), U256::from(5u64));
        let before = s.intermediate_root();
        s.add_balance(&Address([1; 20]), U256::one());
        assert_ne!(before, s.intermediate_root());
        assert_eq!(s.balance(&Address([1; 20])), U256::from(6u64));
    }
}
