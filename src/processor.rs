//! Per-block transaction processing
//!
//! [`BlockProcessor`] evaluates every transaction of a block from a resume
//! index onward, concurrently, and folds the per-transaction results into a
//! single watermark once all of them have joined.
//!
//! The watermark is the greatest index `w` such that every transaction in
//! `[start, w]` confirmed completion. Completion order says nothing about
//! index order, so a transaction that finished after a gap stays unconfirmed
//! and is processed again on the next round.

use crate::chain::ChainClient;
use crate::decoder::{AssetDecoder, Decoded};
use crate::error::ScanError;
use crate::records::ScanUnitKey;
use crate::sink::{EmittedMovement, MovementSink};
use crate::types::Transaction;
use alloy_primitives::Address;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Scanning capability one scheduler hosts per (chain, protocol).
#[async_trait]
pub trait ProtocolParser: Send + Sync {
    /// Current chain head.
    async fn latest_height(&self) -> Result<u64, ScanError>;

    /// Process block `height` starting at transaction index `start`.
    async fn parse_block(
        &self,
        key: &ScanUnitKey,
        height: u64,
        start: u64,
    ) -> Result<BlockOutcome, ScanError>;
}

/// Result of one processing round over a block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockOutcome {
    /// Every transaction from `start` to the end of the block completed.
    pub done: bool,
    /// Last index of the confirmed prefix starting at `start`, if any.
    pub watermark: Option<u64>,
    /// Transactions that targeted a protocol contract
    pub relevant: usize,
    /// Movements handed to the sink
    pub movements: usize,
    /// Internal calls the decoder could not interpret
    pub decode_failures: usize,
    /// Transactions that failed and must be retried
    pub failed: usize,
}

/// Per-transaction report for a unit of work that completed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct TxReport {
    relevant: bool,
    movements: usize,
    decode_failures: usize,
}

struct ProcessorInner {
    client: Arc<dyn ChainClient>,
    decoder: Arc<dyn AssetDecoder>,
    sink: Arc<dyn MovementSink>,
    contracts: HashSet<Address>,
}

/// Traces and decodes the transactions of a block that target a protocol.
pub struct BlockProcessor {
    inner: Arc<ProcessorInner>,
    concurrency: usize,
}

impl BlockProcessor {
    pub fn new(
        client: Arc<dyn ChainClient>,
        decoder: Arc<dyn AssetDecoder>,
        sink: Arc<dyn MovementSink>,
        contracts: HashSet<Address>,
    ) -> Self {
        Self {
            inner: Arc::new(ProcessorInner {
                client,
                decoder,
                sink,
                contracts,
            }),
            concurrency: 16,
        }
    }

    /// Maximum number of transactions worked on at once (at least 1).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }
}

impl ProcessorInner {
    /// Whether a transaction targets one of the protocol's contracts.
    fn is_relevant(&self, tx: &Transaction) -> bool {
        tx.to.map_or(false, |to| self.contracts.contains(&to))
    }

    /// One unit of work: filter → trace → decode → emit.
    async fn process_transaction(
        &self,
        key: &ScanUnitKey,
        height: u64,
        index: u64,
        tx: Transaction,
    ) -> Result<TxReport, ScanError> {
        if !self.is_relevant(&tx) {
            return Ok(TxReport::default());
        }

        let calls = self.client.trace_transaction(tx.hash).await?;
        debug!(
            "Tracing tx 0x{:x} (index {}) yielded {} internal calls",
            tx.hash,
            index,
            calls.len()
        );

        let mut report = TxReport {
            relevant: true,
            ..TxReport::default()
        };

        for (ordinal, call) in calls.iter().enumerate() {
            match self.decoder.decode(call) {
                Ok(Decoded::Movement(movement)) => {
                    self.sink
                        .emit(EmittedMovement {
                            key: key.clone(),
                            block_height: height,
                            tx_index: index,
                            tx_hash: tx.hash,
                            call_ordinal: ordinal,
                            movement,
                        })
                        .await?;
                    report.movements += 1;
                }
                Ok(Decoded::NotRelevant) => {}
                Err(e) => {
                    warn!(
                        "Undecodable call #{} ({}) in tx 0x{:x} at {}/{}: {}",
                        ordinal, call.call_type, tx.hash, height, index, e
                    );
                    report.decode_failures += 1;
                }
            }
        }

        Ok(report)
    }
}

/// Greatest `w` such that every index in `[start, w]` is confirmed.
///
/// `end` is exclusive. Returns `None` when `start` itself is unconfirmed.
fn contiguous_watermark(
    start: u64,
    end: u64,
    results: &BTreeMap<u64, Result<TxReport, ScanError>>,
) -> Option<u64> {
    let mut watermark = None;
    for index in start..end {
        match results.get(&index) {
            Some(Ok(_)) => watermark = Some(index),
            _ => break,
        }
    }
    watermark
}

#[async_trait]
impl ProtocolParser for BlockProcessor {
    async fn latest_height(&self) -> Result<u64, ScanError> {
        self.inner.client.latest_height().await
    }

    async fn parse_block(
        &self,
        key: &ScanUnitKey,
        height: u64,
        start: u64,
    ) -> Result<BlockOutcome, ScanError> {
        let block = self.inner.client.block(height).await?;
        let end = block.transactions.len() as u64;

        if start >= end {
            debug!("Block {} has no transactions at or after index {}", height, start);
            return Ok(BlockOutcome {
                done: true,
                ..BlockOutcome::default()
            });
        }

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut join_set = JoinSet::new();

        for (index, tx) in block.transactions.into_iter().enumerate().skip(start as usize) {
            let index = index as u64;
            let inner = self.inner.clone();
            let key = key.clone();
            let semaphore = semaphore.clone();

            join_set.spawn(async move {
                // Closed only if the round is torn down; nothing to bound then.
                let _permit = semaphore.acquire_owned().await;
                let result = inner.process_transaction(&key, height, index, tx).await;
                (index, result)
            });
        }

        // Single join point: nothing is decided until every unit is back.
        let mut results = BTreeMap::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, result)) => {
                    results.insert(index, result);
                }
                Err(e) => warn!("Transaction task in block {} did not complete: {}", height, e),
            }
        }

        let mut outcome = BlockOutcome {
            watermark: contiguous_watermark(start, end, &results),
            ..BlockOutcome::default()
        };
        for (index, result) in &results {
            match result {
                Ok(report) => {
                    outcome.relevant += report.relevant as usize;
                    outcome.movements += report.movements;
                    outcome.decode_failures += report.decode_failures;
                }
                Err(e) => {
                    warn!("Transaction {}/{} failed: {}", height, index, e);
                    outcome.failed += 1;
                }
            }
        }
        // Panicked units never report back; they count as failed too.
        outcome.failed += (end - start) as usize - results.len();
        outcome.done = outcome.watermark == Some(end - 1);

        Ok(outcome)
    }
}
