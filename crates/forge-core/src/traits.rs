//! Collaborator interfaces consumed by consensus engines.
//!
//! - [`ChainHeaderReader`]: header and total-difficulty lookups
//! - [`ChainReader`]: adds full block lookups, needed for uncle validation
//! - [`StateStore`]: the mutable account state the finalizer credits rewards to
//!
//! Persistent storage and the state database live outside this workspace;
//! [`crate::chain_store`] provides in-memory implementations for tests and
//! the miner binary.

use crate::config::ChainConfig;
use crate::error::StoreError;
use crate::types::{Address, Block, Hash256, Header, U256};

/// Read-only view of the header chain.
///
/// Every lookup returns `Ok(None)` when the item is unknown; `Err` is
/// reserved for backend failures.
pub trait ChainHeaderReader: Send + Sync {
    /// Chain parameters.
    fn config(&self) -> &ChainConfig;

    /// Head of the canonical chain.
    fn current_header(&self) -> Result<Header, StoreError>;

    /// Header by hash and number.
    fn get_header(&self, hash: &Hash256, number: u64) -> Result<Option<Header>, StoreError>;

    /// Canonical header at `number`.
    fn get_header_by_number(&self, number: u64) -> Result<Option<Header>, StoreError>;

    fn get_header_by_hash(&self, hash: &Hash256) -> Result<Option<Header>, StoreError>;

    /// Total difficulty of the chain ending at the given block.
    fn get_td(&self, hash: &Hash256, number: u64) -> Result<Option<U256>, StoreError>;

    /// Whether the header is already known.
    ///
    /// Default implementation delegates to [`get_header`](Self::get_header).
    fn has_header(&self, hash: &Hash256, number: u64) -> Result<bool, StoreError> {
        Ok(self.get_header(hash, number)?.is_some())
    }
}

/// Header chain with access to full blocks.
pub trait ChainReader: ChainHeaderReader {
    /// Block by hash and number.
    fn get_block(&self, hash: &Hash256, number: u64) -> Result<Option<Block>, StoreError>;
}

/// Mutable account state touched during finalization.
pub trait StateStore: Send {
    /// Credit `amount` to `address`, saturating at `U256::MAX`.
    fn add_balance(&mut self, address: &Address, amount: U256);

    /// Current balance; zero for unknown accounts.
    fn balance(&self, address: &Address) -> U256;

    /// Commitment over the current state.
    fn intermediate_root(&mut self) -> Hash256;
}
