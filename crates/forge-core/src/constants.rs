//! Protocol defaults. Every value here can be overridden through
//! [`ChainConfig`](crate::config::ChainConfig); these are only the values a
//! freshly generated configuration starts from.

/// Divisor bounding the per-block difficulty step (`parent / 2048` per unit).
pub const DIFFICULTY_BOUND_DIVISOR: u64 = 2048;

/// Seconds of block time that make up one downward adjustment unit.
pub const DURATION_STEP_SECS: u64 = 9;

/// Largest number of downward adjustment units applied in one block.
pub const MAX_DOWNWARD_STEPS: u64 = 99;

/// Difficulty floor.
pub const MINIMUM_DIFFICULTY: u64 = 131_072;

/// Blocks per period of the scheduled exponential difficulty term.
pub const BOMB_PERIOD: u64 = 100_000;

/// Blocks by which the scheduled term is delayed.
pub const BOMB_DELAY: u64 = 5_000_000;

/// Base block reward in base units (2 coins of 10^18 units).
pub const BLOCK_REWARD: u128 = 2_000_000_000_000_000_000;

/// Uncle reward is `(uncle.number + 8 - number) * base / 8`.
pub const UNCLE_DEPTH_DIVISOR: u64 = 8;

/// Miner bonus per included uncle is `base / 32`.
pub const UNCLE_INCLUSION_DIVISOR: u64 = 32;

/// Maximum uncles per block.
pub const MAX_UNCLES: usize = 2;

/// Number of ancestor generations an uncle's parent may come from.
pub const UNCLE_GENERATIONS: u64 = 7;

/// Maximum extra-data payload for proof-of-work headers, in bytes.
pub const MAX_EXTRA_DATA: usize = 32;

/// How far ahead of the local clock a header timestamp may be, in seconds.
pub const ALLOWED_FUTURE_SECS: u64 = 15;

/// Smallest gas limit a header may carry.
pub const MIN_GAS_LIMIT: u64 = 5_000;

/// Largest gas limit a header may carry (2^63 - 1).
pub const MAX_GAS_LIMIT: u64 = 0x7fff_ffff_ffff_ffff;

/// Gas limit may move by strictly less than `parent / 1024` per block.
pub const GAS_LIMIT_BOUND_DIVISOR: u64 = 1024;

/// Gas limit of generated genesis blocks.
pub const GENESIS_GAS_LIMIT: u64 = 30_000_000;

/// Genesis timestamp: January 1, 2026 00:00:00 UTC.
pub const GENESIS_TIMESTAMP: u64 = 1_767_225_600;

/// Minimum seconds between authority-sealed blocks.
pub const AUTHORITY_PERIOD_SECS: u64 = 5;

/// Base delay unit for out-of-turn authority signers, in milliseconds.
pub const AUTHORITY_WIGGLE_MS: u64 = 500;

/// Authority extra data: free-form vanity prefix length.
pub const EXTRA_VANITY: usize = 32;

/// Authority extra data: signer public key length.
pub const EXTRA_SIGNER: usize = 32;

/// Authority extra data: trailing ed25519 signature length.
pub const EXTRA_SEAL: usize = 64;

/// Authority difficulty for the in-turn signer.
pub const DIFF_IN_TURN: u64 = 2;

/// Authority difficulty for an out-of-turn signer.
pub const DIFF_NO_TURN: u64 = 1;
