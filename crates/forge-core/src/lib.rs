//! # forge-core
//! Foundation types, collaborator traits and protocol rules for the Forge
//! consensus engines.

pub mod chain_store;
pub mod config;
pub mod constants;
pub mod difficulty;
pub mod error;
pub mod genesis;
pub mod merkle;
pub mod reward;
pub mod traits;
pub mod types;
