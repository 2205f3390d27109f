//! Forge miner: drives a consensus engine over an in-memory chain.
//!
//! Produces `--blocks` blocks with either the proof-of-work or the
//! proof-of-authority engine, then re-verifies the whole chain as a batch
//! and reports the engine's query APIs.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use ed25519_dalek::SigningKey;
use tracing::{info, warn};

use forge_consensus::{Authority, Engine, Ethash, EthashConfig, PowMode, StopSignal};
use forge_core::chain_store::{MemoryChain, MemoryState};
use forge_core::config::{AuthorityConfig, ChainConfig};
use forge_core::traits::ChainHeaderReader;
use forge_core::types::{Address, Header};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum EngineKind {
    Pow,
    Authority,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    Normal,
    Fake,
}

impl From<ModeArg> for PowMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Normal => PowMode::Normal,
            ModeArg::Fake => PowMode::Fake,
        }
    }
}

/// CLI arguments for the miner.
#[derive(Debug, Parser)]
#[command(name = "forge-miner", version)]
#[command(about = "Produce and verify blocks with a Forge consensus engine", long_about = None)]
struct Args {
    /// Chain configuration file. Defaults to <config dir>/forge/forge.toml
    /// when present, otherwise built-in parameters.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Consensus engine.
    #[arg(long, value_enum, default_value = "pow")]
    engine: EngineKind,

    /// Number of blocks to produce.
    #[arg(long, default_value_t = 5)]
    blocks: u64,

    /// Sealing threads for proof-of-work (0 = one per CPU).
    #[arg(long, default_value_t = 0)]
    threads: usize,

    /// Proof-of-work mode.
    #[arg(long, value_enum, default_value = "normal")]
    mode: ModeArg,

    /// Hex-encoded 32-byte ed25519 secret for the authority engine. A fresh
    /// key is generated when omitted.
    #[arg(long)]
    signer_key: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log output format ("text" or "json").
    #[arg(long, default_value = "text")]
    log_format: String,
}

fn load_config(path: Option<&PathBuf>) -> Result<ChainConfig> {
    if let Some(path) = path {
        return ChainConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()));
    }
    let default_path = dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("forge")
        .join("forge.toml");
    if default_path.exists() {
        return ChainConfig::from_file(&default_path)
            .with_context(|| format!("failed to load config {}", default_path.display()));
    }
    Ok(ChainConfig::default())
}

fn signing_key(hex_secret: Option<&str>) -> Result<SigningKey> {
    let Some(hex_secret) = hex_secret else {
        return Ok(SigningKey::generate(&mut rand::rngs::OsRng));
    };
    let bytes = hex::decode(hex_secret).context("invalid signer key hex")?;
    let secret: [u8; 32] = bytes
        .try_into()
        .map_err(|_| anyhow::anyhow!("signer key must be 32 bytes"))?;
    Ok(SigningKey::from_bytes(&secret))
}

/// Make sure `signer` may seal under `config`, creating a single-signer
/// authority set when none is configured.
fn ensure_signer(config: &mut ChainConfig, signer: Address) -> Result<()> {
    match &mut config.authority {
        Some(authority) if authority.signers.contains(&signer) => Ok(()),
        Some(authority) if authority.signers.is_empty() => {
            authority.signers.push(signer);
            Ok(())
        }
        Some(_) => bail!("signer {signer} is not in the configured authority set"),
        None => {
            config.authority = Some(AuthorityConfig {
                signers: vec![signer],
                ..AuthorityConfig::default()
            });
            Ok(())
        }
    }
}

fn build_engine(args: &Args, config: &mut ChainConfig) -> Result<Box<dyn Engine>> {
    match args.engine {
        EngineKind::Pow => {
            let engine = Ethash::new(EthashConfig {
                mode: args.mode.into(),
                seal_threads: args.threads,
                ..EthashConfig::default()
            });
            Ok(Box::new(engine))
        }
        EngineKind::Authority => {
            let key = signing_key(args.signer_key.as_deref())?;
            let engine = Authority::new();
            engine.authorize(key);
            let signer = engine
                .signer_address()
                .context("authority signer not installed")?;
            ensure_signer(config, signer)?;
            Ok(Box::new(engine))
        }
    }
}

/// Template for the next block on top of the current head.
fn next_header(chain: &MemoryChain, coinbase: Address) -> Result<Header> {
    let parent = chain.current_header()?;
    let now = chrono::Utc::now().timestamp().max(0) as u64;
    Ok(Header {
        parent_hash: parent.hash(),
        number: parent.number + 1,
        timestamp: now.max(parent.timestamp + 1),
        gas_limit: parent.gas_limit,
        coinbase,
        extra_data: b"forge-miner".to_vec(),
        ..Header::default()
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level, &args.log_format);

    let mut config = load_config(args.config.as_ref())?;
    let engine = build_engine(&args, &mut config)?;
    config.validate()?;

    info!("forge-miner v{}", env!("CARGO_PKG_VERSION"));
    info!(engine = ?args.engine, blocks = args.blocks, chain_id = config.chain_id, "starting");

    let chain = Arc::new(MemoryChain::with_genesis(config.clone()));
    let mut state = MemoryState::new();
    let coinbase = Address([0xF0; 20]);

    for _ in 0..args.blocks {
        let mut header = next_header(&chain, coinbase)?;
        engine.prepare(&*chain, &mut header)?;
        let block =
            engine.finalize_and_assemble(&*chain, header, &mut state, vec![], vec![], &[])?;

        let stop = StopSignal::new();
        let mut results = engine.seal(&*chain, block, stop.clone())?;
        let sealed = tokio::select! {
            sealed = results.recv() => sealed,
            _ = tokio::signal::ctrl_c() => {
                warn!("received Ctrl+C, abandoning seal");
                stop.stop();
                None
            }
        };
        let Some(sealed) = sealed else {
            break;
        };

        engine.verify_header(&*chain, &sealed.header, true)?;
        let number = sealed.number();
        let hash = sealed.hash();
        let author = engine.author(&sealed.header)?;
        chain.insert_block(sealed)?;
        info!(number, %hash, %author, "block imported");
    }

    // Replay the produced chain through batch verification.
    let headers = chain.canonical_headers(1);
    let fresh: Arc<dyn ChainHeaderReader> = Arc::new(MemoryChain::with_genesis(config));
    let seals = vec![true; headers.len()];
    let mut verification = engine.verify_headers(fresh, headers, seals)?;
    let mut verified = 0usize;
    while let Some(result) = verification.recv().await {
        result.with_context(|| format!("header {} failed batch verification", verified + 1))?;
        verified += 1;
    }
    info!(verified, head = chain.head_number(), "chain verified");

    for api in engine.apis(&*chain) {
        for method in api.method_names() {
            if let Some(value) = api.call(method) {
                info!(namespace = api.namespace, method, %value, "engine api");
            }
        }
    }

    engine.close()?;
    info!("miner shutdown complete");
    Ok(())
}

/// Initialize tracing subscriber with the given log level and output format.
fn init_logging(level_str: &str, format: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_str));

    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_level(true))
            .init();
    }
}
