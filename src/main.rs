//! progressctl - indexer checkpoint CLI tool
//!
//! Reads, overwrites and resets the per-(chain, protocol) checkpoints kept
//! in the indexer's RocksDB store.

use ledgerscan::cli;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
