//! Test doubles for the chain, sink and store boundaries.

use crate::chain::ChainClient;
use crate::error::ScanError;
use crate::records::{Checkpoint, ScanUnitKey};
use crate::sink::{EmittedMovement, MovementSink};
use crate::store::{MemoryProgressStore, ProgressStore};
use crate::types::{Block, InternalCall, Transaction};
use alloy_primitives::{address, Address, B256, U256};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub fn contract() -> Address {
    address!("00000000000000000000000000000000000000cc")
}

fn other_address() -> Address {
    address!("00000000000000000000000000000000000000ee")
}

fn tx_hash(tag: u8, index: u64) -> B256 {
    let mut bytes = [0u8; 32];
    bytes[0] = tag;
    bytes[24..].copy_from_slice(&index.to_be_bytes());
    B256::from(bytes)
}

/// Transaction sent to the protocol contract.
pub fn relevant_tx(index: u64) -> Transaction {
    Transaction {
        hash: tx_hash(0xaa, index),
        to: Some(contract()),
        input: Vec::new(),
    }
}

/// Transaction that does not touch the protocol.
pub fn other_tx(index: u64) -> Transaction {
    Transaction {
        hash: tx_hash(0xbb, index),
        to: Some(other_address()),
        input: Vec::new(),
    }
}

pub fn native_call(call_type: &str, value: u64) -> InternalCall {
    InternalCall {
        call_type: call_type.to_string(),
        from: Some(contract()),
        to: Some(other_address()),
        value: U256::from(value),
        input: Vec::new(),
        error: None,
    }
}

/// Scripted in-memory chain.
#[derive(Default)]
pub struct MockChain {
    latest: AtomicUsize,
    blocks: Mutex<HashMap<u64, Vec<Transaction>>>,
    traces: Mutex<HashMap<B256, Vec<InternalCall>>>,
    /// Remaining trace failures per hash (usize::MAX = always)
    trace_failures: Mutex<HashMap<B256, usize>>,
    traced: Mutex<Vec<B256>>,
    block_fetches: AtomicUsize,
    unreachable: AtomicBool,
    trace_delay: Mutex<Duration>,
    traces_in_flight: AtomicUsize,
    peak_traces_in_flight: AtomicUsize,
}

impl MockChain {
    pub fn new(latest: u64) -> Self {
        let chain = Self::default();
        chain.set_latest(latest);
        chain
    }

    pub fn set_latest(&self, latest: u64) {
        self.latest.store(latest as usize, Ordering::SeqCst);
    }

    pub fn set_block(&self, height: u64, txs: Vec<Transaction>) {
        self.blocks.lock().unwrap().insert(height, txs);
    }

    pub fn set_trace(&self, hash: B256, calls: Vec<InternalCall>) {
        self.traces.lock().unwrap().insert(hash, calls);
    }

    pub fn fail_trace(&self, hash: B256) {
        self.fail_trace_times(hash, usize::MAX);
    }

    pub fn fail_trace_times(&self, hash: B256, times: usize) {
        self.trace_failures.lock().unwrap().insert(hash, times);
    }

    /// Every call fails as if the RPC endpoint were down.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Every trace takes `delay` to answer.
    pub fn set_trace_delay(&self, delay: Duration) {
        *self.trace_delay.lock().unwrap() = delay;
    }

    /// Highest number of traces that were pending at the same time.
    pub fn peak_traces_in_flight(&self) -> usize {
        self.peak_traces_in_flight.load(Ordering::SeqCst)
    }

    pub fn trace_calls(&self) -> usize {
        self.traced.lock().unwrap().len()
    }

    pub fn traced_hashes(&self) -> Vec<B256> {
        self.traced.lock().unwrap().clone()
    }

    pub fn block_fetches(&self) -> usize {
        self.block_fetches.load(Ordering::SeqCst)
    }

    fn check_reachable(&self) -> Result<(), ScanError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(ScanError::transport(anyhow::anyhow!("connection refused")));
        }
        Ok(())
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn latest_height(&self) -> Result<u64, ScanError> {
        self.check_reachable()?;
        Ok(self.latest.load(Ordering::SeqCst) as u64)
    }

    async fn block(&self, height: u64) -> Result<Block, ScanError> {
        self.check_reachable()?;
        self.block_fetches.fetch_add(1, Ordering::SeqCst);
        let transactions = self
            .blocks
            .lock()
            .unwrap()
            .get(&height)
            .cloned()
            .ok_or_else(|| {
                ScanError::transport(anyhow::anyhow!("block {} not available", height))
            })?;
        Ok(Block {
            number: height,
            transactions,
        })
    }

    async fn trace_transaction(&self, hash: B256) -> Result<Vec<InternalCall>, ScanError> {
        self.check_reachable()?;
        self.traced.lock().unwrap().push(hash);

        let in_flight = self.traces_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_traces_in_flight.fetch_max(in_flight, Ordering::SeqCst);
        let delay = *self.trace_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.traces_in_flight.fetch_sub(1, Ordering::SeqCst);

        {
            let mut failures = self.trace_failures.lock().unwrap();
            if let Some(remaining) = failures.get_mut(&hash) {
                if *remaining > 0 {
                    if *remaining != usize::MAX {
                        *remaining -= 1;
                    }
                    return Err(ScanError::transport(anyhow::anyhow!("trace timed out")));
                }
            }
        }
        Ok(self.traces.lock().unwrap().get(&hash).cloned().unwrap_or_default())
    }
}

/// Sink that keeps every record it receives.
#[derive(Default)]
pub struct RecordingSink {
    records: Mutex<Vec<EmittedMovement>>,
}

impl RecordingSink {
    pub fn records(&self) -> Vec<EmittedMovement> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl MovementSink for RecordingSink {
    async fn emit(&self, record: EmittedMovement) -> Result<(), ScanError> {
        self.records.lock().unwrap().push(record);
        Ok(())
    }
}

/// Memory store that logs every write and can inject failures.
#[derive(Default)]
pub struct RecordingStore {
    inner: MemoryProgressStore,
    writes: Mutex<Vec<(ScanUnitKey, Checkpoint)>>,
    read_failures: AtomicUsize,
    write_failures: AtomicUsize,
}

impl RecordingStore {
    pub async fn seed(&self, key: &ScanUnitKey, checkpoint: Checkpoint) {
        self.inner.set_checkpoint(key, checkpoint).await.unwrap();
    }

    pub fn current(&self, key: &ScanUnitKey) -> Checkpoint {
        self.inner.peek(key).unwrap_or_default()
    }

    /// Checkpoints written for `key`, oldest first.
    pub fn history(&self, key: &ScanUnitKey) -> Vec<Checkpoint> {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, cp)| *cp)
            .collect()
    }

    pub fn fail_next_reads(&self, n: usize) {
        self.read_failures.store(n, Ordering::SeqCst);
    }

    pub fn fail_next_writes(&self, n: usize) {
        self.write_failures.store(n, Ordering::SeqCst);
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl ProgressStore for RecordingStore {
    async fn get_checkpoint(&self, key: &ScanUnitKey) -> Result<Checkpoint, ScanError> {
        if Self::take_failure(&self.read_failures) {
            return Err(ScanError::store(anyhow::anyhow!("store unreachable")));
        }
        self.inner.get_checkpoint(key).await
    }

    async fn set_checkpoint(
        &self,
        key: &ScanUnitKey,
        checkpoint: Checkpoint,
    ) -> Result<(), ScanError> {
        if Self::take_failure(&self.write_failures) {
            return Err(ScanError::store(anyhow::anyhow!("store unreachable")));
        }
        self.writes.lock().unwrap().push((key.clone(), checkpoint));
        self.inner.set_checkpoint(key, checkpoint).await
    }
}
