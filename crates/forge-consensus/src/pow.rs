//! Proof-of-work digest and target arithmetic.
//!
//! For a seal hash `s` and nonce `n`:
//!
//! ```text
//! mix    = BLAKE3(s || n_le)
//! result = SHA-256(s || mix)
//! ```
//!
//! A seal is valid when `mix` equals the header's `mix_digest` and `result`,
//! read as a big-endian integer, is at most `2^256 / difficulty`.

use forge_core::error::ConsensusError;
use forge_core::types::{Hash256, Header, U256};
use sha2::{Digest, Sha256};

/// Output of one proof-of-work evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowDigest {
    pub mix_digest: Hash256,
    pub result: Hash256,
}

/// Evaluate the proof-of-work function for one nonce.
pub fn pow_digest(seal_hash: &Hash256, nonce: u64) -> PowDigest {
    let mut hasher = blake3::Hasher::new();
    hasher.update(seal_hash.as_bytes());
    hasher.update(&nonce.to_le_bytes());
    let mix_digest = Hash256(hasher.finalize().into());

    let mut sha = Sha256::new();
    sha.update(seal_hash.as_bytes());
    sha.update(mix_digest.as_bytes());
    PowDigest {
        mix_digest,
        result: Hash256(sha.finalize().into()),
    }
}

/// Largest acceptable result for `difficulty`.
pub fn target(difficulty: U256) -> U256 {
    if difficulty <= U256::one() {
        return U256::MAX;
    }
    U256::MAX / difficulty
}

/// Whether `digest` satisfies `target`.
pub fn meets_target(digest: &PowDigest, target: U256) -> bool {
    digest.result.to_u256() <= target
}

/// Check the seal fields of `header`.
pub fn verify_pow(header: &Header) -> Result<(), ConsensusError> {
    if header.difficulty.is_zero() {
        return Err(ConsensusError::InvalidDifficulty {
            got: header.difficulty,
            expected: U256::one(),
        });
    }
    let digest = pow_digest(&header.seal_hash(), header.nonce);
    if digest.mix_digest != header.mix_digest {
        return Err(ConsensusError::InvalidMixDigest);
    }
    if !meets_target(&digest, target(header.difficulty)) {
        return Err(ConsensusError::InvalidSeal);
    }
    Ok(())
}

/// Search `nonces` sequentially for a seal. Test and bench helper.
pub fn search(header: &Header, nonces: std::ops::Range<u64>) -> Option<(u64, PowDigest)> {
    let seal_hash = header.seal_hash();
    let target = target(header.difficulty);
    nonces
        .map(|nonce| (nonce, pow_digest(&seal_hash, nonce)))
        .find(|(_, digest)| meets_target(digest, target))
}
