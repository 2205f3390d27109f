//! Error types for the Forge consensus engine.
use thiserror::Error;

use crate::types::{Address, Hash256, U256};

/// Failure reported by an external chain or state collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("backend: {0}")] Backend(String),
    #[error("unknown parent {0} for inserted block")] MissingParent(Hash256),
    #[error("duplicate block: {0}")] DuplicateBlock(Hash256),
}

/// Rejection reasons for headers, uncles and blocks, plus engine lifecycle errors.
///
/// Every variant except [`ConsensusError::EngineClosed`] describes one header
/// or block and leaves the engine usable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsensusError {
    #[error("unknown ancestor")] UnknownAncestor,
    #[error("block in the future: timestamp {timestamp}, now {now}")] FutureBlock { timestamp: u64, now: u64 },
    #[error("timestamp {timestamp} not after parent {parent}")] InvalidTimestamp { timestamp: u64, parent: u64 },
    #[error("invalid difficulty: got {got}, expected {expected}")] InvalidDifficulty { got: U256, expected: U256 },
    #[error("invalid block number: got {got}, expected {expected}")] InvalidNumber { got: u64, expected: u64 },
    #[error("invalid gas limit: {got} (parent {parent})")] InvalidGasLimit { got: u64, parent: u64 },
    #[error("gas used {used} exceeds gas limit {limit}")] InvalidGasUsed { used: u64, limit: u64 },
    #[error("invalid seal")] InvalidSeal,
    #[error("invalid mix digest")] InvalidMixDigest,
    #[error("extra data too long: {size} > {max}")] OversizedExtraData { size: usize, max: usize },
    #[error("invalid extra data layout: {len} bytes, expected {expected}")] InvalidExtraDataLayout { len: usize, expected: usize },
    #[error("duplicate uncle: {0}")] DuplicateUncle(Hash256),
    #[error("uncle is ancestor: {0}")] UncleIsAncestor(Hash256),
    #[error("uncle's parent is not an ancestor within the window: {0}")] UncleTooOld(Hash256),
    #[error("too many uncles: {count} > {max}")] TooManyUncles { count: usize, max: usize },
    #[error("unauthorized signer: {0}")] UnauthorizedSigner(Address),
    #[error("no signing key configured")] SignerNotSet,
    #[error("missing signature")] MissingSignature,
    #[error("batch length mismatch: {headers} headers, {seals} seal flags")] BatchLengthMismatch { headers: usize, seals: usize },
    #[error("encoding: {0}")] Encoding(String),
    #[error("worker spawn failed: {0}")] Spawn(String),
    #[error("consensus engine closed")] EngineClosed,
    #[error(transparent)] Store(#[from] StoreError),
}

impl ConsensusError {
    /// Whether the error concerns the engine itself rather than one header or block.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::EngineClosed)
    }
}

/// Errors raised while loading or validating a [`ChainConfig`](crate::config::ChainConfig).
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(transparent)] Load(#[from] ::config::ConfigError),
    #[error("invalid parameter {field}: {reason}")] Invalid { field: &'static str, reason: String },
}
