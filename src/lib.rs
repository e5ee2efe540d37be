//! ledgerscan - resumable multi-chain protocol indexer
//!
//! Each configured (chain, protocol) pair is a scan unit with its own
//! checkpoint. A unit walks blocks in order, traces the transactions sent
//! to the protocol's contracts, decodes native asset movements from the
//! internal calls and advances its checkpoint only past the contiguous
//! prefix of transactions that were fully processed.

pub mod chain;
pub mod cli;
pub mod config;
pub mod decoder;
pub mod error;
pub mod keys;
pub mod processor;
pub mod records;
pub mod rpc;
pub mod scanner;
pub mod scheduler;
pub mod sink;
pub mod store;
pub mod trace;
pub mod types;

#[cfg(test)]
mod mocks;

// Re-export the main types for convenience
pub use chain::ChainClient;
pub use decoder::{AssetDecoder, Decoded, NativeTransferDecoder};
pub use error::{DecodeError, ScanError};
pub use processor::{BlockOutcome, BlockProcessor, ProtocolParser};
pub use records::{AssetMovement, Checkpoint, ScanUnitKey};
pub use scanner::{IterationOutcome, ProtocolScanner, ScanSettings};
pub use scheduler::{Scheduler, SchedulerHandle};
pub use sink::{ChannelSink, EmittedMovement, LogSink, MovementSink};
pub use store::{MemoryProgressStore, ProgressStore, RocksProgressStore};
