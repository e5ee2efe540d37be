//! Chain access boundary
//!
//! The scan pipeline only ever talks to a chain through [`ChainClient`].
//! [`RpcClient`](crate::rpc::RpcClient) is the JSON-RPC implementation.

use crate::error::ScanError;
use crate::types::{Block, InternalCall};
use alloy_primitives::B256;
use async_trait::async_trait;

#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Current chain head.
    async fn latest_height(&self) -> Result<u64, ScanError>;

    /// Block at `height` with its transactions in order.
    ///
    /// A fetched height is treated as immutable; reorgs are not handled.
    async fn block(&self, height: u64) -> Result<Block, ScanError>;

    /// Internal calls of a transaction, in trace order.
    async fn trace_transaction(&self, hash: B256) -> Result<Vec<InternalCall>, ScanError>;
}
