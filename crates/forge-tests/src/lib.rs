//! Integration and adversarial tests for the Forge consensus engines.
//!
//! The tests drive both engines through the public [`Engine`] interface
//! against in-memory chains, covering block production, batch verification,
//! uncle handling, cancellation and shutdown.
//!
//! [`Engine`]: forge_consensus::Engine

pub mod helpers;
