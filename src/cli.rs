//! CLI implementation for progressctl
//!
//! Inspects and edits the checkpoint store of a stopped indexer. All
//! commands output pretty JSON.

use crate::keys::validate_name;
use crate::records::{Checkpoint, ScanUnitKey};
use crate::store::RocksProgressStore;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::PathBuf;

/// Checkpoint store CLI tool
#[derive(Parser)]
#[command(name = "progressctl")]
#[command(about = "Inspect and edit indexer checkpoints")]
pub struct Cli {
    /// Path to the RocksDB database directory
    #[arg(short, long, default_value = "./progress_db")]
    db_path: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the checkpoint of one scan unit
    Get {
        /// Chain name (e.g. Ethereum)
        chain: String,
        /// Protocol name (e.g. EtherFi)
        protocol: String,
    },
    /// Overwrite the checkpoint of one scan unit
    Set {
        chain: String,
        protocol: String,
        /// Next block to scan
        block_height: u64,
        /// First transaction index to process in that block
        #[arg(default_value_t = 0)]
        tx_index: u64,
    },
    /// Delete a checkpoint so the unit rescans from genesis
    Reset { chain: String, protocol: String },
    /// List every stored checkpoint
    List,
}

fn unit_key(chain: &str, protocol: &str) -> Result<ScanUnitKey> {
    validate_name("chain", chain)?;
    validate_name("protocol", protocol)?;
    Ok(ScanUnitKey::new(chain, protocol))
}

fn checkpoint_json(key: &ScanUnitKey, checkpoint: Option<Checkpoint>) -> Value {
    json!({
        "chain": key.chain,
        "protocol": key.protocol,
        "checkpoint": checkpoint,
    })
}

/// Execute one command against an open store.
pub fn execute(store: &RocksProgressStore, command: Commands) -> Result<Value> {
    let result = match command {
        Commands::Get { chain, protocol } => {
            let key = unit_key(&chain, &protocol)?;
            checkpoint_json(&key, store.read(&key)?)
        }
        Commands::Set {
            chain,
            protocol,
            block_height,
            tx_index,
        } => {
            let key = unit_key(&chain, &protocol)?;
            let previous = store.read(&key)?;
            let checkpoint = Checkpoint::new(block_height, tx_index);
            store.write(&key, &checkpoint)?;
            json!({
                "status": "ok",
                "chain": key.chain,
                "protocol": key.protocol,
                "previous": previous,
                "checkpoint": checkpoint,
            })
        }
        Commands::Reset { chain, protocol } => {
            let key = unit_key(&chain, &protocol)?;
            let previous = store.read(&key)?;
            store.delete_checkpoint(&key)?;
            json!({
                "status": "ok",
                "chain": key.chain,
                "protocol": key.protocol,
                "previous": previous,
            })
        }
        Commands::List => {
            let entries: Vec<Value> = store
                .list_checkpoints()?
                .into_iter()
                .map(|(key, checkpoint)| checkpoint_json(&key, Some(checkpoint)))
                .collect();
            json!({ "checkpoints": entries })
        }
    };
    Ok(result)
}

/// Run the CLI command and print JSON output.
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let store = RocksProgressStore::open(&cli.db_path)
        .with_context(|| format!("Failed to open database at {:?}", cli.db_path))?;

    let result = execute(&store, cli.command)?;

    // Pretty print JSON
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
