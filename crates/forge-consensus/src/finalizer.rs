//! Block finalization and assembly.
//!
//! Finalization credits protocol rewards to the state and commits the header
//! to the resulting state root and to its uncle list. Assembly then commits
//! to the transactions and the caller-supplied receipts and takes `gas_used`
//! from the last receipt. Neither step executes transactions.

use forge_core::error::ConsensusError;
use forge_core::merkle;
use forge_core::traits::StateStore;
use forge_core::types::{Address, Block, Header, Receipt, Transaction, U256};

/// Apply `credits` to `state`, then set `uncle_hash` and `state_root`.
pub fn finalize_header(
    header: &mut Header,
    state: &mut dyn StateStore,
    uncles: &[Header],
    credits: &[(Address, U256)],
) {
    for (address, amount) in credits {
        state.add_balance(address, *amount);
    }
    header.uncle_hash = merkle::uncle_root(uncles);
    header.state_root = state.intermediate_root();
}

/// Set the body commitments and `gas_used`, then build the block.
pub fn assemble(
    mut header: Header,
    transactions: Vec<Transaction>,
    uncles: Vec<Header>,
    receipts: &[Receipt],
) -> Result<Block, ConsensusError> {
    header.tx_root = merkle::tx_root(&transactions)?;
    header.receipt_root = merkle::receipt_root(receipts)?;
    header.gas_used = receipts.last().map_or(0, |r| r.cumulative_gas_used);
    Ok(Block {
        header,
        transactions,
        uncles,
    })
}
