//! Record types for scan progress and indexer output
//!
//! Checkpoints are the only data that survives a restart. They use postcard
//! for binary serialization in the store, which is compact and deterministic.

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of one independently scheduled scan: a (chain, protocol) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScanUnitKey {
    pub chain: String,
    pub protocol: String,
}

impl ScanUnitKey {
    pub fn new(chain: impl Into<String>, protocol: impl Into<String>) -> Self {
        Self {
            chain: chain.into(),
            protocol: protocol.into(),
        }
    }
}

impl fmt::Display for ScanUnitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chain, self.protocol)
    }
}

/// Next position to process for a scan unit.
///
/// The zero value `{0, 0}` is what an absent record means: start at height 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    /// Block currently being (or next to be) processed
    pub block_height: u64,
    /// First transaction index in that block not yet confirmed
    pub tx_index: u64,
}

impl Checkpoint {
    pub fn new(block_height: u64, tx_index: u64) -> Self {
        Self {
            block_height,
            tx_index,
        }
    }

    /// Checkpoint after the whole block at `self.block_height` completed.
    pub fn next_block(&self) -> Self {
        Self::new(self.block_height + 1, 0)
    }

    /// Checkpoint after transactions up to and including `watermark` completed.
    pub fn after_watermark(&self, watermark: u64) -> Self {
        Self::new(self.block_height, watermark + 1)
    }

    /// Whether moving from `self` to `next` keeps progress monotonic.
    ///
    /// Height never decreases; the tx index resets to 0 exactly when the
    /// height increases and otherwise never decreases.
    pub fn can_advance_to(&self, next: &Checkpoint) -> bool {
        if next.block_height > self.block_height {
            next.tx_index == 0
        } else {
            next.block_height == self.block_height && next.tx_index >= self.tx_index
        }
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.block_height, self.tx_index)
    }
}

/// A decoded value transfer attributed to a protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetMovement {
    /// Asset symbol, e.g. ETH
    pub symbol: String,
    /// Raw amount in the asset's smallest unit
    pub amount: U256,
    /// Number of decimals of the asset
    pub decimals: u8,
    /// Protocol the movement is attributed to
    pub protocol: String,
}
