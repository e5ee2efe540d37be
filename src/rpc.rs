//! JSON-RPC client for Ethereum nodes
//!
//! Provides a typed interface to Ethereum JSON-RPC endpoints.
//! Handles hex string parsing and error handling.

use crate::chain::ChainClient;
use crate::error::ScanError;
use crate::trace::flatten_call_trace;
use crate::types::{parse_hex_u64, Block, CallTrace, InternalCall};
use alloy_primitives::B256;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

/// JSON-RPC client for Ethereum nodes.
pub struct RpcClient {
    client: reqwest::Client,
    url: String,
}

/// Format a block height as a JSON-RPC quantity.
fn block_tag(height: u64) -> String {
    format!("0x{:x}", height)
}

impl RpcClient {
    /// Create a new RPC client.
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Make a JSON-RPC call.
    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params
        });

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .with_context(|| format!("Failed to send {} request", method))?;

        let json: Value = response
            .json()
            .await
            .with_context(|| format!("Failed to parse {} response", method))?;

        // Check for RPC error
        if let Some(error) = json.get("error") {
            anyhow::bail!("RPC error from {}: {}", method, error);
        }

        // Extract result
        json.get("result")
            .cloned()
            .context("RPC response missing 'result' field")
    }

    /// Get the current head block number.
    pub async fn get_block_number(&self) -> Result<u64> {
        let result = self.call("eth_blockNumber", json!([])).await?;
        let number_str = result
            .as_str()
            .context("Block number response is not a string")?;
        parse_hex_u64(number_str).context("Failed to parse block number")
    }

    /// Get a block by number with full transaction objects.
    ///
    /// A `null` result means the node does not have that height yet.
    pub async fn get_block_by_number(&self, height: u64) -> Result<Block> {
        let params = json!([block_tag(height), true]);
        let result = self.call("eth_getBlockByNumber", params).await?;
        if result.is_null() {
            anyhow::bail!("Block {} not available", height);
        }
        serde_json::from_value(result)
            .with_context(|| format!("Failed to deserialize block {}", height))
    }

    /// Trace a transaction with the `callTracer`.
    pub async fn debug_trace_transaction(&self, tx_hash: B256) -> Result<CallTrace> {
        let hash_str = format!("0x{:x}", tx_hash);
        let params = json!([hash_str, { "tracer": "callTracer" }]);
        let result = self.call("debug_traceTransaction", params).await?;
        serde_json::from_value(result)
            .with_context(|| format!("Failed to deserialize trace for {}", hash_str))
    }
}

#[async_trait]
impl ChainClient for RpcClient {
    async fn latest_height(&self) -> Result<u64, ScanError> {
        self.get_block_number().await.map_err(ScanError::transport)
    }

    async fn block(&self, height: u64) -> Result<Block, ScanError> {
        self.get_block_by_number(height)
            .await
            .map_err(ScanError::transport)
    }

    async fn trace_transaction(&self, hash: B256) -> Result<Vec<InternalCall>, ScanError> {
        let trace = self
            .debug_trace_transaction(hash)
            .await
            .map_err(ScanError::transport)?;
        Ok(flatten_call_trace(&trace))
    }
}
