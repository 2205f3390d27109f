//! The pluggable consensus engine interface.
//!
//! A node drives block production and import through [`Engine`] alone:
//!
//! ```text
//! import:  verify_headers -> verify_uncles -> (execute) -> finalize
//! produce: prepare -> (execute) -> finalize_and_assemble -> seal
//! ```
//!
//! Chain access goes through the [`ChainHeaderReader`] and [`ChainReader`]
//! collaborator traits, state mutation through [`StateStore`].

use std::sync::Arc;

use forge_core::error::ConsensusError;
use forge_core::traits::{ChainHeaderReader, ChainReader, StateStore};
use forge_core::types::{Address, Block, Hash256, Header, Receipt, Transaction, U256};

use crate::api::Api;
use crate::lifecycle::StopSignal;
use crate::sealer::SealResults;
use crate::verifier::Verification;

/// A consensus engine.
pub trait Engine: Send + Sync {
    /// Account that produced `header`.
    fn author(&self, header: &Header) -> Result<Address, ConsensusError>;

    /// Validate one header against its parent in `chain`. The seal is
    /// checked only when `seal` is set.
    fn verify_header(
        &self,
        chain: &dyn ChainHeaderReader,
        header: &Header,
        seal: bool,
    ) -> Result<(), ConsensusError>;

    /// Validate an ordered batch concurrently.
    ///
    /// Returns at once; outcomes arrive on the [`Verification`] in input
    /// order. A header whose parent is the preceding header of the batch is
    /// checked against it directly.
    fn verify_headers(
        &self,
        chain: Arc<dyn ChainHeaderReader>,
        headers: Vec<Header>,
        seals: Vec<bool>,
    ) -> Result<Verification, ConsensusError>;

    /// Validate the uncles of `block`.
    fn verify_uncles(&self, chain: &dyn ChainReader, block: &Block) -> Result<(), ConsensusError>;

    /// Initialise the consensus fields of a new header (difficulty and
    /// engine-specific fields).
    fn prepare(&self, chain: &dyn ChainHeaderReader, header: &mut Header) -> Result<(), ConsensusError>;

    /// Apply protocol rewards and set `uncle_hash` and `state_root`.
    fn finalize(
        &self,
        chain: &dyn ChainHeaderReader,
        header: &mut Header,
        state: &mut dyn StateStore,
        transactions: &[Transaction],
        uncles: &[Header],
    ) -> Result<(), ConsensusError>;

    /// [`finalize`](Self::finalize), then commit to the body and receipts
    /// and return the unsealed block.
    fn finalize_and_assemble(
        &self,
        chain: &dyn ChainHeaderReader,
        header: Header,
        state: &mut dyn StateStore,
        transactions: Vec<Transaction>,
        uncles: Vec<Header>,
        receipts: &[Receipt],
    ) -> Result<Block, ConsensusError>;

    /// Start sealing `block` in the background.
    ///
    /// Returns at once. Raising `stop` abandons the attempt.
    fn seal(
        &self,
        chain: &dyn ChainHeaderReader,
        block: Block,
        stop: StopSignal,
    ) -> Result<SealResults, ConsensusError>;

    /// Digest the seal commits to.
    fn seal_hash(&self, header: &Header) -> Hash256;

    /// Difficulty a block created at `time` on top of `parent` must carry.
    fn calc_difficulty(&self, chain: &dyn ChainHeaderReader, time: u64, parent: &Header) -> U256;

    /// Query APIs exposed by the engine.
    fn apis(&self, chain: &dyn ChainHeaderReader) -> Vec<Api>;

    /// Stop all background work. Repeated calls are no-ops.
    fn close(&self) -> Result<(), ConsensusError>;
}

/// A proof-of-work engine.
pub trait PoW: Engine {
    /// Current hashes per second.
    fn hashrate(&self) -> f64;
}
