//! Proof-of-authority engine.
//!
//! A fixed, ordered list of signers takes turns producing blocks. The block
//! at height `n` is in turn for `signers[n % len]` and carries difficulty 2;
//! any other authorised signer may produce it with difficulty 1 after a
//! random extra delay. Timestamps strictly increase and blocks are spaced at
//! least `period` seconds apart.
//!
//! Extra data layout (128 bytes):
//!
//! ```text
//! [0..32)    vanity
//! [32..64)   signer ed25519 public key
//! [64..128)  ed25519 signature over the header hash with these bytes cut
//! ```
//!
//! There are no uncles and no block rewards.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use forge_core::config::{AuthorityConfig, ChainConfig};
use forge_core::constants::{DIFF_IN_TURN, DIFF_NO_TURN, EXTRA_SEAL, EXTRA_SIGNER, EXTRA_VANITY};
use forge_core::error::ConsensusError;
use forge_core::traits::{ChainHeaderReader, ChainReader, StateStore};
use forge_core::types::{Address, Block, Hash256, Header, Receipt, Transaction, U256};
use parking_lot::RwLock;
use rand::Rng;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::api::{Api, ApiMethod};
use crate::engine::Engine;
use crate::finalizer;
use crate::lifecycle::{Halt, Lifecycle, StopSignal};
use crate::sealer::{self, SealResults};
use crate::validator::{lookup_parent, system_clock, Clock, HeaderValidator, SealRules};
use crate::verifier::{spawn_verification, Verification};

/// Total extra-data length of an authority header.
pub const EXTRA_LEN: usize = EXTRA_VANITY + EXTRA_SIGNER + EXTRA_SEAL;

const SIGNATURE_START: usize = EXTRA_VANITY + EXTRA_SIGNER;
const WAIT_SLICE: Duration = Duration::from_millis(10);

fn check_layout(header: &Header) -> Result<(), ConsensusError> {
    if header.extra_data.len() != EXTRA_LEN {
        return Err(ConsensusError::InvalidExtraDataLayout {
            len: header.extra_data.len(),
            expected: EXTRA_LEN,
        });
    }
    Ok(())
}

fn public_key_bytes(header: &Header) -> Result<[u8; 32], ConsensusError> {
    check_layout(header)?;
    let mut key = [0u8; 32];
    key.copy_from_slice(&header.extra_data[EXTRA_VANITY..SIGNATURE_START]);
    Ok(key)
}

/// Seal hash of an authority header: every field, `nonce` and `mix_digest`
/// included, with the signature bytes cut from the extra data.
pub fn authority_seal_hash(header: &Header) -> Hash256 {
    let end = header.extra_data.len().saturating_sub(EXTRA_SEAL);
    header.hash_with_extra(&header.extra_data[..end])
}

/// Address of the signer named in the extra data.
pub fn signer_of(header: &Header) -> Result<Address, ConsensusError> {
    Ok(Address::from_public_key(&public_key_bytes(header)?))
}

fn in_turn(authority: &AuthorityConfig, number: u64, signer: &Address) -> bool {
    let len = authority.signers.len() as u64;
    len > 0 && authority.signers[(number % len) as usize] == *signer
}

fn authorised<'a>(config: &'a ChainConfig, signer: &Address) -> Result<&'a AuthorityConfig, ConsensusError> {
    match &config.authority {
        Some(authority) if authority.signers.contains(signer) => Ok(authority),
        _ => Err(ConsensusError::UnauthorizedSigner(*signer)),
    }
}

fn turn_difficulty(authority: &AuthorityConfig, number: u64, signer: &Address) -> U256 {
    if in_turn(authority, number, signer) {
        U256::from(DIFF_IN_TURN)
    } else {
        U256::from(DIFF_NO_TURN)
    }
}

struct AuthorityRules;

impl SealRules for AuthorityRules {
    fn expected_difficulty(
        &self,
        config: &ChainConfig,
        header: &Header,
        _parent: &Header,
    ) -> Result<U256, ConsensusError> {
        let signer = signer_of(header)?;
        let authority = authorised(config, &signer)?;
        Ok(turn_difficulty(authority, header.number, &signer))
    }

    fn verify_extra_data(&self, _config: &ChainConfig, header: &Header) -> Result<(), ConsensusError> {
        check_layout(header)
    }

    fn verify_timestamp(
        &self,
        config: &ChainConfig,
        header: &Header,
        parent: &Header,
    ) -> Result<(), ConsensusError> {
        let period = config.authority.as_ref().map_or(0, |a| a.period);
        if header.timestamp <= parent.timestamp
            || header.timestamp < parent.timestamp.saturating_add(period)
        {
            return Err(ConsensusError::InvalidTimestamp {
                timestamp: header.timestamp,
                parent: parent.timestamp,
            });
        }
        Ok(())
    }

    fn verify_seal(&self, config: &ChainConfig, header: &Header) -> Result<(), ConsensusError> {
        let key = public_key_bytes(header)?;
        authorised(config, &Address::from_public_key(&key))?;
        if !header.mix_digest.is_zero() {
            return Err(ConsensusError::InvalidMixDigest);
        }
        let signature = &header.extra_data[SIGNATURE_START..];
        if signature.iter().all(|b| *b == 0) {
            return Err(ConsensusError::MissingSignature);
        }
        let mut sig = [0u8; 64];
        sig.copy_from_slice(signature);
        let verifying = VerifyingKey::from_bytes(&key).map_err(|_| ConsensusError::InvalidSeal)?;
        verifying
            .verify(
                authority_seal_hash(header).as_bytes(),
                &Signature::from_bytes(&sig),
            )
            .map_err(|_| ConsensusError::InvalidSeal)
    }
}

struct AuthorityInner {
    validator: HeaderValidator<AuthorityRules>,
    lifecycle: Lifecycle,
    signer: RwLock<Option<SigningKey>>,
}

impl AuthorityInner {
    fn signer_address(&self) -> Option<Address> {
        self.signer
            .read()
            .as_ref()
            .map(|key| Address::from_public_key(&key.verifying_key().to_bytes()))
    }
}

/// Proof-of-authority consensus engine. Cheap to clone; clones share the
/// signing key and workers.
#[derive(Clone)]
pub struct Authority {
    inner: Arc<AuthorityInner>,
}

impl fmt::Debug for Authority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authority")
            .field("signer", &self.signer_address())
            .finish_non_exhaustive()
    }
}

impl Default for Authority {
    fn default() -> Self {
        Self::new()
    }
}

impl Authority {
    pub fn new() -> Self {
        Self::with_clock(system_clock())
    }

    /// Create an engine with a custom clock for testing.
    pub fn with_clock(clock: Clock) -> Self {
        Self {
            inner: Arc::new(AuthorityInner {
                validator: HeaderValidator::new(AuthorityRules, clock),
                lifecycle: Lifecycle::new(),
                signer: RwLock::new(None),
            }),
        }
    }

    /// Install the key used by [`prepare`](Engine::prepare) and
    /// [`seal`](Engine::seal).
    pub fn authorize(&self, key: SigningKey) {
        let address = Address::from_public_key(&key.verifying_key().to_bytes());
        *self.inner.signer.write() = Some(key);
        tracing::info!(%address, "authority signer set");
    }

    /// Address of the installed signer.
    pub fn signer_address(&self) -> Option<Address> {
        self.inner.signer_address()
    }

    pub fn active_workers(&self) -> usize {
        self.inner.lifecycle.active_workers()
    }
}

impl Engine for Authority {
    fn author(&self, header: &Header) -> Result<Address, ConsensusError> {
        signer_of(header)
    }

    fn verify_header(
        &self,
        chain: &dyn ChainHeaderReader,
        header: &Header,
        seal: bool,
    ) -> Result<(), ConsensusError> {
        self.inner.lifecycle.ensure_open()?;
        self.inner.validator.verify_header(chain, header, seal)
    }

    fn verify_headers(
        &self,
        chain: Arc<dyn ChainHeaderReader>,
        headers: Vec<Header>,
        seals: Vec<bool>,
    ) -> Result<Verification, ConsensusError> {
        let inner = Arc::clone(&self.inner);
        spawn_verification(
            &self.inner.lifecycle,
            headers,
            seals,
            num_cpus::get().max(1),
            move |batch, index, seal| inner.validator.verify_indexed(&*chain, batch, index, seal),
        )
    }

    fn verify_uncles(&self, _chain: &dyn ChainReader, block: &Block) -> Result<(), ConsensusError> {
        self.inner.lifecycle.ensure_open()?;
        if !block.uncles.is_empty() {
            return Err(ConsensusError::TooManyUncles {
                count: block.uncles.len(),
                max: 0,
            });
        }
        Ok(())
    }

    fn prepare(&self, chain: &dyn ChainHeaderReader, header: &mut Header) -> Result<(), ConsensusError> {
        self.inner.lifecycle.ensure_open()?;
        let parent = lookup_parent(chain, header)?;
        let period = chain.config().authority.as_ref().map_or(1, |a| a.period.max(1));
        let public_key = self
            .inner
            .signer
            .read()
            .as_ref()
            .map(|key| key.verifying_key().to_bytes());

        header.coinbase = public_key.map_or(Address::ZERO, |k| Address::from_public_key(&k));
        header.mix_digest = Hash256::ZERO;
        header.timestamp = parent
            .timestamp
            .saturating_add(period)
            .max(self.inner.validator.now());

        let mut extra = vec![0u8; EXTRA_LEN];
        let vanity = header.extra_data.len().min(EXTRA_VANITY);
        extra[..vanity].copy_from_slice(&header.extra_data[..vanity]);
        if let Some(key) = public_key {
            extra[EXTRA_VANITY..SIGNATURE_START].copy_from_slice(&key);
        }
        header.extra_data = extra;

        header.difficulty = self.calc_difficulty(chain, header.timestamp, &parent);
        Ok(())
    }

    fn finalize(
        &self,
        _chain: &dyn ChainHeaderReader,
        header: &mut Header,
        state: &mut dyn StateStore,
        _transactions: &[Transaction],
        _uncles: &[Header],
    ) -> Result<(), ConsensusError> {
        self.inner.lifecycle.ensure_open()?;
        finalizer::finalize_header(header, state, &[], &[]);
        Ok(())
    }

    fn finalize_and_assemble(
        &self,
        chain: &dyn ChainHeaderReader,
        mut header: Header,
        state: &mut dyn StateStore,
        transactions: Vec<Transaction>,
        _uncles: Vec<Header>,
        receipts: &[Receipt],
    ) -> Result<Block, ConsensusError> {
        self.finalize(chain, &mut header, state, &transactions, &[])?;
        finalizer::assemble(header, transactions, Vec::new(), receipts)
    }

    fn seal(
        &self,
        chain: &dyn ChainHeaderReader,
        block: Block,
        stop: StopSignal,
    ) -> Result<SealResults, ConsensusError> {
        let inner = &self.inner;
        inner.lifecycle.ensure_open()?;
        let key = inner.signer.read().clone().ok_or(ConsensusError::SignerNotSet)?;
        let public_key = key.verifying_key().to_bytes();
        let signer = Address::from_public_key(&public_key);
        let authority = authorised(chain.config(), &signer)?;

        let mut header = block.header.clone();
        check_layout(&header)?;
        header.extra_data[EXTRA_VANITY..SIGNATURE_START].copy_from_slice(&public_key);
        let signature = key.sign(authority_seal_hash(&header).as_bytes());
        header.extra_data[SIGNATURE_START..].copy_from_slice(&signature.to_bytes());
        let sealed = block.with_header(header);

        let number = sealed.number();
        let mut delay = Duration::from_secs(sealed.header.timestamp.saturating_sub(inner.validator.now()));
        if !in_turn(authority, number, &signer) {
            let slots = (authority.signers.len() / 2 + 1) as u64;
            let wiggle = rand::thread_rng().gen_range(0..=slots.saturating_mul(authority.wiggle_ms));
            delay += Duration::from_millis(wiggle);
            tracing::trace!(number, wiggle_ms = wiggle, "out-of-turn signing delayed");
        }

        let internal = StopSignal::new();
        let halt = Halt::new([stop, internal.clone(), inner.lifecycle.shutdown_signal()]);
        let (tx, rx) = mpsc::channel(1);
        let results = SealResults::new(internal, rx);

        inner.lifecycle.spawn(format!("forge-sign-{number}"), move || {
            let deadline = Instant::now() + delay;
            loop {
                if halt.is_halted() {
                    tracing::debug!(number, "authority seal abandoned");
                    return;
                }
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    break;
                }
                std::thread::sleep(remaining.min(WAIT_SLICE));
            }
            if sealer::publish(&halt, &tx, sealed) {
                tracing::info!(number, %signer, "signed block");
            }
        })?;
        Ok(results)
    }

    fn seal_hash(&self, header: &Header) -> Hash256 {
        authority_seal_hash(header)
    }

    fn calc_difficulty(&self, chain: &dyn ChainHeaderReader, _time: u64, parent: &Header) -> U256 {
        match (self.signer_address(), chain.config().authority.as_ref()) {
            (Some(signer), Some(authority)) => {
                turn_difficulty(authority, parent.number.saturating_add(1), &signer)
            }
            _ => U256::from(DIFF_NO_TURN),
        }
    }

    fn apis(&self, chain: &dyn ChainHeaderReader) -> Vec<Api> {
        let signers: Vec<Value> = chain
            .config()
            .authority
            .as_ref()
            .map(|a| a.signers.iter().map(|s| json!(s.to_string())).collect())
            .unwrap_or_default();
        let inner = Arc::clone(&self.inner);
        vec![Api {
            namespace: "authority",
            version: "1.0",
            methods: vec![
                ApiMethod::new("signers", move || Value::Array(signers.clone())),
                ApiMethod::new("signer", move || {
                    inner
                        .signer_address()
                        .map_or(Value::Null, |a| json!(a.to_string()))
                }),
            ],
        }]
    }

    fn close(&self) -> Result<(), ConsensusError> {
        if self.inner.lifecycle.close() {
            tracing::debug!("authority engine closed");
        }
        Ok(())
    }
}
