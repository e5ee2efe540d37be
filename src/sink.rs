//! Movement sinks
//!
//! Every decoded movement is handed to a [`MovementSink`] as soon as it is
//! produced. Delivery is at-least-once: a block retried after a failure can
//! hand over the same record again. `(tx_hash, call_ordinal)` identifies a
//! record for downstream deduplication.

use crate::error::ScanError;
use crate::records::{AssetMovement, ScanUnitKey};
use alloy_primitives::B256;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::info;

/// A movement together with where it was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedMovement {
    pub key: ScanUnitKey,
    pub block_height: u64,
    pub tx_index: u64,
    pub tx_hash: B256,
    /// Position of the call in the flattened trace
    pub call_ordinal: usize,
    pub movement: AssetMovement,
}

#[async_trait]
pub trait MovementSink: Send + Sync {
    async fn emit(&self, record: EmittedMovement) -> Result<(), ScanError>;
}

/// Writes each movement as a structured log line.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl MovementSink for LogSink {
    async fn emit(&self, record: EmittedMovement) -> Result<(), ScanError> {
        info!(
            unit = %record.key,
            block = record.block_height,
            tx_index = record.tx_index,
            tx_hash = %format!("0x{:x}", record.tx_hash),
            call = record.call_ordinal,
            symbol = %record.movement.symbol,
            amount = %record.movement.amount,
            decimals = record.movement.decimals,
            "asset movement"
        );
        Ok(())
    }
}

/// Forwards movements into a tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<EmittedMovement>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<EmittedMovement>) -> Self {
        Self { tx }
    }

    /// Sink plus the receiving end of a channel of the given capacity.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<EmittedMovement>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl MovementSink for ChannelSink {
    async fn emit(&self, record: EmittedMovement) -> Result<(), ScanError> {
        self.tx
            .send(record)
            .await
            .map_err(|_| ScanError::Sink("movement receiver dropped".to_string()))
    }
}
