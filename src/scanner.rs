//! Per-(chain, protocol) scan loop
//!
//! Each iteration reads the stored checkpoint and the chain head. When the
//! checkpoint is past the head the scanner is idle; otherwise it drives the
//! parser block by block, persisting the checkpoint after every block before
//! touching the next one.
//!
//! Failures never leave the loop: transport and store errors are retried
//! with exponential backoff, a partially processed block is retried after
//! one poll interval from its persisted watermark.

use crate::error::ScanError;
use crate::processor::ProtocolParser;
use crate::records::{Checkpoint, ScanUnitKey};
use crate::store::ProgressStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Timing of the scan loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanSettings {
    /// Wait between iterations and before retrying an incomplete block
    pub poll_interval: Duration,
    /// Upper bound for the error backoff
    pub max_backoff: Duration,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            max_backoff: Duration::from_secs(120),
        }
    }
}

/// What a single iteration of the scan loop ended with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationOutcome {
    /// Checkpoint is ahead of the chain head; nothing to do.
    Idle { checkpoint: Checkpoint, latest: u64 },
    /// Every block up to the head was processed.
    CaughtUp { checkpoint: Checkpoint, blocks: u64 },
    /// A block did not complete; it is retried from `checkpoint`.
    Stalled { checkpoint: Checkpoint, failed: usize },
}

/// Exponential backoff starting at `base`, capped at `max`.
#[derive(Debug)]
struct Backoff {
    base: Duration,
    max: Duration,
    failures: u32,
}

impl Backoff {
    fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            failures: 0,
        }
    }

    fn next_delay(&mut self) -> Duration {
        let factor = 1u32 << self.failures.min(16);
        self.failures = self.failures.saturating_add(1);
        self.base.saturating_mul(factor).min(self.max)
    }

    fn reset(&mut self) {
        self.failures = 0;
    }
}

/// Resolves once shutdown was requested. Never resolves if the sender is gone.
pub(crate) async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Sleep for `delay`; returns `true` if shutdown interrupted the wait.
pub(crate) async fn sleep_or_shutdown(
    delay: Duration,
    shutdown: &mut watch::Receiver<bool>,
) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => false,
        _ = shutdown_requested(shutdown) => true,
    }
}

/// Drives one scan unit.
#[derive(Clone)]
pub struct ProtocolScanner {
    key: ScanUnitKey,
    parser: Arc<dyn ProtocolParser>,
    store: Arc<dyn ProgressStore>,
    settings: ScanSettings,
}

impl ProtocolScanner {
    pub fn new(
        key: ScanUnitKey,
        parser: Arc<dyn ProtocolParser>,
        store: Arc<dyn ProgressStore>,
        settings: ScanSettings,
    ) -> Self {
        Self {
            key,
            parser,
            store,
            settings,
        }
    }

    pub fn key(&self) -> &ScanUnitKey {
        &self.key
    }

    async fn persist(&self, current: Checkpoint, next: Checkpoint) -> Result<(), ScanError> {
        debug_assert!(
            current.can_advance_to(&next),
            "checkpoint regression {} -> {}",
            current,
            next
        );
        self.store.set_checkpoint(&self.key, next).await
    }

    /// One pass: read progress, compare with the head, process what is due.
    pub async fn run_iteration(&self) -> Result<IterationOutcome, ScanError> {
        let mut checkpoint = self.store.get_checkpoint(&self.key).await?;
        let latest = self.parser.latest_height().await?;

        if checkpoint.block_height > latest {
            debug!("Idle at {} (latest {})", checkpoint, latest);
            return Ok(IterationOutcome::Idle { checkpoint, latest });
        }

        let mut blocks = 0;
        while checkpoint.block_height <= latest {
            let height = checkpoint.block_height;
            let outcome = self
                .parser
                .parse_block(&self.key, height, checkpoint.tx_index)
                .await?;

            if outcome.decode_failures > 0 {
                warn!(
                    "Block {}: {} internal calls could not be decoded",
                    height, outcome.decode_failures
                );
            }

            if outcome.done {
                let next = checkpoint.next_block();
                self.persist(checkpoint, next).await?;
                debug!(
                    "Completed block {} ({} relevant txs, {} movements)",
                    height, outcome.relevant, outcome.movements
                );
                checkpoint = next;
                blocks += 1;
                continue;
            }

            if let Some(watermark) = outcome.watermark {
                let next = checkpoint.after_watermark(watermark);
                self.persist(checkpoint, next).await?;
                checkpoint = next;
            }
            warn!(
                "Block {} incomplete: {} failed txs, resuming at {}",
                height, outcome.failed, checkpoint
            );
            return Ok(IterationOutcome::Stalled {
                checkpoint,
                failed: outcome.failed,
            });
        }

        Ok(IterationOutcome::CaughtUp { checkpoint, blocks })
    }

    /// Run until shutdown is requested.
    ///
    /// An iteration interrupted by shutdown is dropped as a whole, which
    /// aborts its in-flight transaction tasks; the stored checkpoint is
    /// whatever the last completed write left.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!("Starting scanner for {}", self.key);
        let mut backoff = Backoff::new(self.settings.poll_interval, self.settings.max_backoff);

        loop {
            let result = tokio::select! {
                result = self.run_iteration() => result,
                _ = shutdown_requested(&mut shutdown) => break,
            };

            let delay = match result {
                Ok(outcome) => {
                    backoff.reset();
                    if let IterationOutcome::CaughtUp { checkpoint, blocks } = outcome {
                        if blocks > 0 {
                            info!("Processed {} blocks, next position {}", blocks, checkpoint);
                        }
                    }
                    self.settings.poll_interval
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    warn!("Scan iteration failed: {}; retrying in {:?}", e, delay);
                    delay
                }
            };

            if sleep_or_shutdown(delay, &mut shutdown).await {
                break;
            }
        }

        info!("Scanner for {} stopped", self.key);
    }
}
