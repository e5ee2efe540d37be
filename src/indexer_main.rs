//! Multi-chain protocol indexer binary
//!
//! Scans every configured (chain, protocol) unit from its last checkpoint,
//! emits native asset movements and resumes where it stopped after a
//! restart. Runs until Ctrl+C.

use anyhow::{Context, Result};
use clap::Parser;
use ledgerscan::config::load_config;
use ledgerscan::decoder::NativeTransferDecoder;
use ledgerscan::processor::BlockProcessor;
use ledgerscan::rpc::RpcClient;
use ledgerscan::scheduler::Scheduler;
use ledgerscan::sink::LogSink;
use ledgerscan::store::RocksProgressStore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Resumable multi-chain protocol indexer
#[derive(Parser)]
#[command(name = "ledgerscan")]
#[command(about = "Scan configured chains for protocol asset movements")]
struct Args {
    /// Path to the JSON configuration file
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Path to RocksDB database directory (overrides the config file)
    #[arg(short, long)]
    db_path: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging, RUST_LOG wins over the default level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = load_config(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;
    if let Some(path) = args.db_path {
        config.store.path = path;
    }

    info!("Starting indexer");
    info!("Config: {:?}", args.config);
    info!("Database: {:?}", config.store.path);

    let store = RocksProgressStore::open(&config.store.path)
        .with_context(|| format!("Failed to open database at {:?}", config.store.path))?;
    let mut scheduler = Scheduler::new(Arc::new(store), config.scan_settings());
    let sink = Arc::new(LogSink);

    for chain in &config.chains {
        info!("Chain {} via {}", chain.name, chain.rpc_url);
        let client = Arc::new(RpcClient::new(chain.rpc_url.clone()));

        for protocol in &chain.protocols {
            let contracts = protocol.contract_addresses()?;
            info!(
                "Registering {}:{} ({} contracts)",
                chain.name,
                protocol.name,
                contracts.len()
            );
            let decoder = NativeTransferDecoder::new(
                protocol.name.clone(),
                chain.native_symbol.clone(),
                chain.native_decimals,
            );
            let processor = BlockProcessor::new(
                client.clone(),
                Arc::new(decoder),
                sink.clone(),
                contracts,
            )
            .with_concurrency(config.concurrency);
            scheduler.register_protocol(&chain.name, &protocol.name, Arc::new(processor))?;
        }
    }

    let handle = scheduler.start()?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    info!("Received Ctrl+C, shutting down gracefully...");
    handle.shutdown().await;

    info!("Indexer stopped");
    Ok(())
}
