//! BLAKE3 Merkle commitments for block bodies.
//!
//! Uses domain-separated hashing to prevent second-preimage attacks:
//! - Leaf hash: `BLAKE3(0x00 || data)`
//! - Internal node: `BLAKE3(0x01 || left || right)`
//!
//! Odd-length layers are padded by duplicating the last element.
//! Empty lists commit to [`Hash256::ZERO`], so a header without uncles,
//! transactions or receipts carries zero roots.

use crate::error::ConsensusError;
use crate::types::{Hash256, Header, Receipt, Transaction};

/// Domain separation prefix for leaf hashes.
const LEAF_PREFIX: u8 = 0x00;

/// Domain separation prefix for internal node hashes.
const NODE_PREFIX: u8 = 0x01;

/// Compute a domain-separated leaf hash: `BLAKE3(0x00 || data)`.
pub fn leaf_hash(data: &Hash256) -> Hash256 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[LEAF_PREFIX]);
    hasher.update(data.as_bytes());
    Hash256(hasher.finalize().into())
}

/// Compute a domain-separated internal node hash: `BLAKE3(0x01 || left || right)`.
pub fn node_hash(left: &Hash256, right: &Hash256) -> Hash256 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[NODE_PREFIX]);
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    Hash256(hasher.finalize().into())
}

/// Compute the Merkle root from a slice of leaf values.
///
/// Returns [`Hash256::ZERO`] for an empty slice.
pub fn merkle_root(leaves: &[Hash256]) -> Hash256 {
    if leaves.is_empty() {
        return Hash256::ZERO;
    }

    let mut current: Vec<Hash256> = leaves.iter().map(leaf_hash).collect();

    while current.len() > 1 {
        current = next_layer(&current);
    }

    current[0]
}

/// Pair adjacent hashes with [`node_hash`], duplicating the last one on odd layers.
fn next_layer(layer: &[Hash256]) -> Vec<Hash256> {
    let mut next = Vec::with_capacity(layer.len().div_ceil(2));
    let mut i = 0;
    while i < layer.len() {
        let left = &layer[i];
        let right = if i + 1 < layer.len() {
            &layer[i + 1]
        } else {
            left
        };
        next.push(node_hash(left, right));
        i += 2;
    }
    next
}

/// Commitment over the transaction IDs of a block body.
pub fn tx_root(transactions: &[Transaction]) -> Result<Hash256, ConsensusError> {
    let ids = transactions
        .iter()
        .map(Transaction::hash)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(merkle_root(&ids))
}

/// Commitment over caller-supplied receipts.
pub fn receipt_root(receipts: &[Receipt]) -> Result<Hash256, ConsensusError> {
    let ids = receipts
        .iter()
        .map(Receipt::hash)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(merkle_root(&ids))
}

/// Commitment over uncle header hashes, stored in `Header::uncle_hash`.
pub fn uncle_root(uncles: &[Header]) -> Hash256 {
    let hashes: Vec<Hash256> = uncles.iter().map(Header::hash).collect();
    merkle_root(&hashes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Address;

    fn h(byte: u8) -> Hash256 {
        Hash256([byte; 32])
    }

    // --- Domain separation ---

    #[test]
    fn leaf_hash_differs_from_node_hash() {
        let a = h(0xAA);
        assert_ne!(leaf_hash(&a), node_hash(&a, &a));
    }

    #[test]
    fn node_hash_order_matters() {
        assert_ne!(node_hash(&h(1), &h(2)), node_hash(&h(2), &h(1)));
    }

    // --- merkle_root ---

    #[test]
    fn merkle_root_empty() {
        assert_eq!(merkle_root(&[]), Hash256::ZERO);
    }

    #[test]
    fn merkle_root_single() {
        let a = h(0xAA);
        assert_eq!(merkle_root(&[a]), leaf_hash(&a));
    }

    #[test]
    fn merkle_root_three_odd() {
        let (a, b, c) = (h(1), h(2), h(3));
        let n01 = node_hash(&leaf_hash(&a), &leaf_hash(&b));
        let n22 = node_hash(&leaf_hash(&c), &leaf_hash(&c));
        assert_eq!(merkle_root(&[a, b, c]), node_hash(&n01, &n22));
    }

    #[test]
    fn merkle_root_order_matters() {
        assert_ne!(merkle_root(&[h(1), h(2)]), merkle_root(&[h(2), h(1)]));
    }

    // --- Body commitments ---

    #[test]
    fn empty_bodies_commit_to_zero() {
        assert_eq!(tx_root(&[]).unwrap(), Hash256::ZERO);
        assert_eq!(receipt_root(&[]).unwrap(), Hash256::ZERO);
        assert_eq!(uncle_root(&[]), Hash256::ZERO);
    }

    #[test]
    fn tx_root_matches_manual_root() {
        let txs = vec![
            Transaction {
                nonce: 0,
                to: Address([1; 20]),
                value: 5,
                payload: vec![],
            },
            Transaction {
                nonce: 1,
                to: Address([2; 20]),
                value: 6,
                payload: vec![9],
            },
        ];
        let ids: Vec<Hash256> = txs.iter().map(|tx| tx.hash().unwrap()).collect();
        assert_eq!(tx_root(&txs).unwrap(), merkle_root(&ids));
    }

    #[test]
    fn uncle_root_depends_on_uncle_contents() {
        let a = Header {
            number: 4,
            ..Header::default()
        };
        let b = Header {
            number: 5,
            ..Header::default()
        };
        assert_ne!(uncle_root(&[a.clone()]), uncle_root(&[b]));
        assert_ne!(uncle_root(&[a]), Hash256::ZERO);
    }

    #[test]
    fn receipt_root_nonzero_for_one_receipt() {
        let receipts = vec![Receipt {
            success: true,
            cumulative_gas_used: 21_000,
            logs: vec![b"transfer".to_vec()],
        }];
        assert_ne!(receipt_root(&receipts).unwrap(), Hash256::ZERO);
    }
}
