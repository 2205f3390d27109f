//! Core protocol types: headers, blocks, transactions, receipts.
//!
//! Difficulty, total difficulty and balances are 256-bit unsigned integers.
//! Every other numeric field uses u64.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::error::ConsensusError;
use crate::merkle;

pub use primitive_types::U256;

/// A 32-byte hash value.
///
/// Used for header hashes (double SHA-256), transaction and receipt IDs
/// (BLAKE3) and merkle commitments (BLAKE3).
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// The zero hash. Also the commitment of an empty list.
    pub const ZERO: Self = Self([0u8; 32]);

    /// Create a Hash256 from a byte array.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Return the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Check if this is the zero hash.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Interpret the hash as a big-endian 256-bit integer.
    pub fn to_u256(&self) -> U256 {
        U256::from_big_endian(&self.0)
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl From<[u8; 32]> for Hash256 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Hash256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A 20-byte account address.
///
/// Serialized as a `0x`-prefixed hex string so that configuration files stay
/// readable.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default, bincode::Encode,
    bincode::Decode,
)]
pub struct Address(pub [u8; 20]);

impl Address {
    /// The zero address.
    pub const ZERO: Self = Self([0u8; 20]);

    /// Derive an address from a 32-byte public key: the first 20 bytes of its BLAKE3 hash.
    pub fn from_public_key(public_key: &[u8; 32]) -> Self {
        let digest = blake3::hash(public_key);
        let mut out = [0u8; 20];
        out.copy_from_slice(&digest.as_bytes()[..20]);
        Self(out)
    }

    /// Return the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix("0x").unwrap_or(s);
        let mut out = [0u8; 20];
        hex::decode_to_slice(raw, &mut out)?;
        Ok(Self(out))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A transaction. Opaque to the engine apart from its identifier.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq, bincode::Encode, bincode::Decode,
)]
pub struct Transaction {
    /// Sender-scoped sequence number.
    pub nonce: u64,
    /// Recipient account.
    pub to: Address,
    /// Transferred value in base units.
    pub value: u64,
    /// Execution payload.
    pub payload: Vec<u8>,
}

impl Transaction {
    /// Transaction ID: BLAKE3 hash of the canonical bincode encoding.
    pub fn hash(&self) -> Result<Hash256, ConsensusError> {
        let encoded = bincode::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| ConsensusError::Encoding(e.to_string()))?;
        Ok(Hash256(blake3::hash(&encoded).into()))
    }
}

/// Execution outcome of one transaction, produced by the caller's executor.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default, bincode::Encode,
    bincode::Decode,
)]
pub struct Receipt {
    /// Whether execution succeeded.
    pub success: bool,
    /// Gas used by this and all preceding transactions in the block.
    pub cumulative_gas_used: u64,
    /// Opaque log payloads emitted during execution.
    pub logs: Vec<Vec<u8>>,
}

impl Receipt {
    /// Receipt ID: BLAKE3 hash of the canonical bincode encoding.
    pub fn hash(&self) -> Result<Hash256, ConsensusError> {
        let encoded = bincode::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| ConsensusError::Encoding(e.to_string()))?;
        Ok(Hash256(blake3::hash(&encoded).into()))
    }
}

/// Block header.
///
/// `mix_digest` and `nonce` are the seal fields: they are filled in by the
/// sealer and excluded from [`seal_hash`](Self::seal_hash).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct Header {
    /// Hash of the parent header.
    pub parent_hash: Hash256,
    /// Commitment over the uncle headers ([`Hash256::ZERO`] when there are none).
    pub uncle_hash: Hash256,
    /// Account credited with the block reward.
    pub coinbase: Address,
    /// State root after finalization.
    pub state_root: Hash256,
    /// Merkle root of transaction IDs.
    pub tx_root: Hash256,
    /// Merkle root of receipt IDs.
    pub receipt_root: Hash256,
    /// Difficulty this block had to meet.
    pub difficulty: U256,
    /// Block number (parent number + 1).
    pub number: u64,
    /// Gas ceiling for the block.
    pub gas_limit: u64,
    /// Gas consumed by the block's transactions.
    pub gas_used: u64,
    /// Unix timestamp in seconds.
    pub timestamp: u64,
    /// Protocol-specific payload.
    pub extra_data: Vec<u8>,
    /// Seal field: digest proving the work.
    pub mix_digest: Hash256,
    /// Seal field: proof-of-work nonce.
    pub nonce: u64,
}

impl Header {
    /// Full header hash: double SHA-256 over every field.
    pub fn hash(&self) -> Hash256 {
        sha256d(&self.encode(&self.extra_data, true))
    }

    /// Pre-seal hash: double SHA-256 over every field except `mix_digest` and `nonce`.
    pub fn seal_hash(&self) -> Hash256 {
        sha256d(&self.encode(&self.extra_data, false))
    }

    /// Hash over every field, `mix_digest` and `nonce` included, with
    /// `extra_data` replaced by `extra`.
    ///
    /// Signature-based engines use this to exclude the signature bytes that
    /// live inside the extra data while still committing to the seal fields.
    pub fn hash_with_extra(&self, extra: &[u8]) -> Hash256 {
        sha256d(&self.encode(extra, true))
    }

    /// Whether the header commits to at least one uncle.
    pub fn has_uncles(&self) -> bool {
        !self.uncle_hash.is_zero()
    }

    /// Explicit little-endian byte layout used for hashing.
    ///
    /// parent_hash || uncle_hash || coinbase || state_root || tx_root ||
    /// receipt_root || difficulty || number || gas_limit || gas_used ||
    /// timestamp || len(extra) || extra [|| mix_digest || nonce]
    fn encode(&self, extra: &[u8], with_seal: bool) -> Vec<u8> {
        let mut data = Vec::with_capacity(6 * 32 + 20 + 5 * 8 + extra.len() + 40);
        data.extend_from_slice(self.parent_hash.as_bytes());
        data.extend_from_slice(self.uncle_hash.as_bytes());
        data.extend_from_slice(self.coinbase.as_bytes());
        data.extend_from_slice(self.state_root.as_bytes());
        data.extend_from_slice(self.tx_root.as_bytes());
        data.extend_from_slice(self.receipt_root.as_bytes());
        let mut difficulty = [0u8; 32];
        self.difficulty.to_little_endian(&mut difficulty);
        data.extend_from_slice(&difficulty);
        data.extend_from_slice(&self.number.to_le_bytes());
        data.extend_from_slice(&self.gas_limit.to_le_bytes());
        data.extend_from_slice(&self.gas_used.to_le_bytes());
        data.extend_from_slice(&self.timestamp.to_le_bytes());
        data.extend_from_slice(&(extra.len() as u64).to_le_bytes());
        data.extend_from_slice(extra);
        if with_seal {
            data.extend_from_slice(self.mix_digest.as_bytes());
            data.extend_from_slice(&self.nonce.to_le_bytes());
        }
        data
    }
}

fn sha256d(data: &[u8]) -> Hash256 {
    let first = Sha256::digest(data);
    Hash256(Sha256::digest(first).into())
}

/// A complete block: header, transactions and uncle headers.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct Block {
    pub header: Header,
    /// Ordered transactions.
    pub transactions: Vec<Transaction>,
    /// Ordered uncle headers.
    pub uncles: Vec<Header>,
}

impl Block {
    /// Block hash (the header hash).
    pub fn hash(&self) -> Hash256 {
        self.header.hash()
    }

    /// Block number.
    pub fn number(&self) -> u64 {
        self.header.number
    }

    /// Replace the header, keeping the body. Used to publish a sealed variant.
    pub fn with_header(&self, header: Header) -> Self {
        Self {
            header,
            transactions: self.transactions.clone(),
            uncles: self.uncles.clone(),
        }
    }

    /// Recompute the body commitments and compare them with the header.
    pub fn body_matches_header(&self) -> Result<bool, ConsensusError> {
        Ok(merkle::tx_root(&self.transactions)? == self.header.tx_root
            && merkle::uncle_root(&self.uncles) == self.header.uncle_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample_header() -> Header {
        Header {
            parent_hash: Hash256([0x11; 32]),
            coinbase: Address([0x22; 20]),
            difficulty: U256::from(131_072u64),
            number: 7,
            gas_limit: 30_000_000,
            timestamp: 1_767_225_600,
            extra_data: b"forge".to_vec(),
            ..Header::default()
        }
    }

    // --- Hash256 / Address ---

    #[test]
    fn hash256_zero_is_zero() {
        assert!(Hash256::ZERO.is_zero());
        assert_eq!(Hash256::ZERO, Hash256::default());
        assert!(!Hash256([1; 32]).is_zero());
    }

    #[test]
    fn hash256_to_u256_is_big_endian() {
        let mut bytes = [0u8; 32];
        bytes[31] = 5;
        assert_eq!(Hash256(bytes).to_u256(), U256::from(5u64));
    }

    #[test]
    fn address_hex_roundtrip() {
        let addr = Address([0xAB; 20]);
        let text = addr.to_string();
        assert!(text.starts_with("0x"));
        assert_eq!(text.parse::<Address>().unwrap(), addr);
    }

    #[test]
    fn address_serde_is_string() {
        let addr = Address([0x01; 20]);
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, format!("\"{addr}\""));
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }

    #[test]
    fn address_rejects_short_hex() {
        assert!("0x1234".parse::<Address>().is_err());
    }

    #[test]
    fn address_from_public_key_is_deterministic() {
        let a = Address::from_public_key(&[7u8; 32]);
        let b = Address::from_public_key(&[7u8; 32]);
        let c = Address::from_public_key(&[8u8; 32]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    // --- Header hashing ---

    #[test]
    fn hash_differs_from_seal_hash() {
        let h = sample_header();
        assert_ne!(h.hash(), h.seal_hash());
    }

    #[test]
    fn seal_hash_ignores_seal_fields() {
        let h = sample_header();
        let mut sealed = h.clone();
        sealed.nonce = 42;
        sealed.mix_digest = Hash256([0x99; 32]);
        assert_eq!(h.seal_hash(), sealed.seal_hash());
        assert_ne!(h.hash(), sealed.hash());
    }

    #[test]
    fn hash_with_extra_commits_to_seal_fields() {
        let h = sample_header();
        assert_eq!(h.hash_with_extra(&h.extra_data), h.hash());
        assert_ne!(h.hash_with_extra(b""), h.hash());

        let mut renonced = h.clone();
        renonced.nonce ^= 1;
        assert_ne!(renonced.hash_with_extra(b""), h.hash_with_extra(b""));
    }

    #[test]
    fn extra_data_length_is_committed() {
        // Moving a byte from extra data into a neighbouring field must not collide.
        let mut a = sample_header();
        a.extra_data = vec![1, 2];
        let mut b = a.clone();
        b.extra_data = vec![1, 2, 0];
        assert_ne!(a.seal_hash(), b.seal_hash());
    }

    #[test]
    fn has_uncles_tracks_uncle_hash() {
        let mut h = sample_header();
        assert!(!h.has_uncles());
        h.uncle_hash = Hash256([3; 32]);
        assert!(h.has_uncles());
    }

    proptest! {
        #[test]
        fn seal_hash_invariant_under_seal_fields(nonce in any::<u64>(), mix in any::<[u8; 32]>()) {
            let h = sample_header();
            let mut sealed = h.clone();
            sealed.nonce = nonce;
            sealed.mix_digest = Hash256(mix);
            prop_assert_eq!(h.seal_hash(), sealed.seal_hash());
        }

        #[test]
        fn seal_hash_changes_with_consensus_fields(
            number in any::<u64>(),
            timestamp in any::<u64>(),
            difficulty in any::<u64>(),
        ) {
            let h = sample_header();
            let mut changed = h.clone();
            changed.number = number;
            prop_assume!(number != h.number);
            prop_assert_ne!(h.seal_hash(), changed.seal_hash());

            let mut changed = h.clone();
            changed.timestamp = timestamp;
            prop_assume!(timestamp != h.timestamp);
            prop_assert_ne!(h.seal_hash(), changed.seal_hash());

            let mut changed = h.clone();
            changed.difficulty = U256::from(difficulty);
            prop_assume!(U256::from(difficulty) != h.difficulty);
            prop_assert_ne!(h.seal_hash(), changed.seal_hash());
        }
    }

    // --- Transactions / receipts / blocks ---

    #[test]
    fn transaction_hash_is_deterministic() {
        let tx = Transaction {
            nonce: 1,
            to: Address([5; 20]),
            value: 10,
            payload: vec![1, 2, 3],
        };
        assert_eq!(tx.hash().unwrap(), tx.clone().hash().unwrap());
        let mut other = tx.clone();
        other.value = 11;
        assert_ne!(tx.hash().unwrap(), other.hash().unwrap());
    }

    #[test]
    fn receipt_hash_changes_with_status() {
        let ok = Receipt {
            success: true,
            cumulative_gas_used: 21_000,
            logs: vec![],
        };
        let failed = Receipt {
            success: false,
            ..ok.clone()
        };
        assert_ne!(ok.hash().unwrap(), failed.hash().unwrap());
    }

    #[test]
    fn block_hash_is_header_hash() {
        let block = Block {
            header: sample_header(),
            ..Block::default()
        };
        assert_eq!(block.hash(), block.header.hash());
        assert_eq!(block.number(), 7);
    }

    #[test]
    fn empty_block_body_matches_zero_roots() {
        let block = Block {
            header: sample_header(),
            ..Block::default()
        };
        assert!(block.body_matches_header().unwrap());
    }

    #[test]
    fn with_header_keeps_body() {
        let block = Block {
            header: sample_header(),
            transactions: vec![Transaction {
                nonce: 0,
                to: Address::ZERO,
                value: 1,
                payload: vec![],
            }],
            uncles: vec![],
        };
        let mut header = block.header.clone();
        header.nonce = 9;
        let sealed = block.with_header(header);
        assert_eq!(sealed.header.nonce, 9);
        assert_eq!(sealed.transactions, block.transactions);
    }
}
