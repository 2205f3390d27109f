//! # forge-consensus
//! Pluggable consensus engines.
//!
//! Both engines implement [`Engine`]:
//!
//! - [`Ethash`]: proof-of-work with uncle-aware difficulty and rewards
//! - [`Authority`]: round-robin proof-of-authority over ed25519 signers
//!
//! Header verification and sealing run on background threads and report
//! through channels; see [`Verification`] and [`SealResults`].

pub mod api;
pub mod authority;
pub mod engine;
pub mod ethash;
pub mod finalizer;
pub mod hashrate;
pub mod lifecycle;
pub mod pow;
pub mod sealer;
pub mod uncles;
pub mod validator;
pub mod verifier;

pub use api::{Api, ApiMethod};
pub use authority::Authority;
pub use engine::{Engine, PoW};
pub use ethash::{Ethash, EthashConfig, PowMode};
pub use lifecycle::StopSignal;
pub use sealer::SealResults;
pub use verifier::{Verification, VerifyResult};
