//! Chain data types
//!
//! Blocks, transactions and internal calls as the scan pipeline sees them,
//! plus the JSON-RPC shapes (`eth_getBlockByNumber`, `callTracer`) they are
//! decoded from.

use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Deserializer};

/// Block with its transactions in authoritative processing order.
#[derive(Debug, Clone, Deserialize)]
pub struct Block {
    /// Block number (hex string in JSON, parsed to u64)
    #[serde(rename = "number", deserialize_with = "deserialize_hex_u64")]
    pub number: u64,

    /// List of transactions in the block
    #[serde(rename = "transactions")]
    pub transactions: Vec<Transaction>,
}

/// Transaction as needed for protocol filtering and tracing.
///
/// Its index is its position in [`Block::transactions`].
#[derive(Debug, Clone, Deserialize)]
pub struct Transaction {
    /// Transaction hash (hex string in JSON)
    #[serde(rename = "hash", deserialize_with = "deserialize_hex_b256")]
    pub hash: B256,

    /// Recipient address (None for contract creation, hex string in JSON)
    #[serde(rename = "to", default, deserialize_with = "deserialize_hex_address_opt")]
    pub to: Option<Address>,

    /// Transaction input data (hex string in JSON, "0x" for simple transfers)
    #[serde(rename = "input", default, deserialize_with = "deserialize_hex_bytes")]
    pub input: Vec<u8>,
}

/// Call trace node produced by `debug_traceTransaction` with `callTracer`.
///
/// Kept liberal (many optional fields) so it handles the small differences
/// between client implementations.
#[derive(Debug, Clone, Deserialize)]
pub struct CallTrace {
    /// Call type: CALL / STATICCALL / DELEGATECALL / CALLCODE / SELFDESTRUCT / ...
    #[serde(rename = "type")]
    pub r#type: Option<String>,

    #[serde(default, deserialize_with = "deserialize_hex_address_opt")]
    pub from: Option<Address>,

    /// None for CREATE-like nodes.
    #[serde(default, deserialize_with = "deserialize_hex_address_opt")]
    pub to: Option<Address>,

    /// Missing or empty values are treated as zero.
    #[serde(default, deserialize_with = "deserialize_hex_u256_trace")]
    pub value: U256,

    #[serde(default, deserialize_with = "deserialize_hex_bytes_opt")]
    pub input: Vec<u8>,

    #[serde(default)]
    pub calls: Option<Vec<CallTrace>>,

    /// Error / revert reason reported by some clients.
    #[serde(default)]
    pub error: Option<String>,
}

/// One sub-call performed while a transaction executed.
///
/// Produced by flattening a [`CallTrace`]; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalCall {
    /// Call type tag as reported by the tracer (upper-cased)
    pub call_type: String,
    pub from: Option<Address>,
    pub to: Option<Address>,
    pub value: U256,
    pub input: Vec<u8>,
    pub error: Option<String>,
}

// Hex deserialization helpers

/// Pad an odd-length hex string with a leading zero.
/// This handles cases where RPC returns hex strings without leading zeros.
pub(crate) fn pad_hex_string(s: &str) -> String {
    if s.len() % 2 == 1 {
        format!("0{}", s)
    } else {
        s.to_string()
    }
}

/// Parse a `0x`-prefixed quantity into u64.
pub(crate) fn parse_hex_u64(s: &str) -> Result<u64, std::num::ParseIntError> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(s, 16)
}

fn deserialize_hex_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_hex_u64(&s).map_err(serde::de::Error::custom)
}

fn deserialize_hex_b256<'de, D>(deserializer: D) -> Result<B256, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    let s = s.strip_prefix("0x").unwrap_or(&s);
    let bytes = hex::decode(pad_hex_string(s)).map_err(serde::de::Error::custom)?;
    if bytes.len() != 32 {
        return Err(serde::de::Error::custom(format!(
            "Expected 32 bytes for hash, got {}",
            bytes.len()
        )));
    }
    Ok(B256::from_slice(&bytes))
}

fn deserialize_hex_address_opt<'de, D>(deserializer: D) -> Result<Option<Address>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = Option::<String>::deserialize(deserializer)?;
    match s {
        Some(s) => {
            let s = s.strip_prefix("0x").unwrap_or(&s);
            if s.is_empty() {
                return Ok(None);
            }
            let bytes = hex::decode(pad_hex_string(s)).map_err(serde::de::Error::custom)?;
            if bytes.len() != 20 {
                return Err(serde::de::Error::custom(format!(
                    "Expected 20 bytes for address, got {}",
                    bytes.len()
                )));
            }
            Ok(Some(Address::from_slice(&bytes)))
        }
        None => Ok(None),
    }
}

fn deserialize_hex_bytes<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    decode_hex_bytes(&s).map_err(serde::de::Error::custom)
}

fn deserialize_hex_bytes_opt<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(s) => decode_hex_bytes(&s).map_err(serde::de::Error::custom),
        None => Ok(Vec::new()),
    }
}

fn decode_hex_bytes(s: &str) -> Result<Vec<u8>, hex::FromHexError> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    if s.is_empty() {
        Ok(Vec::new())
    } else {
        hex::decode(pad_hex_string(s))
    }
}

/// Deserialize a hex string (or null / missing) to U256 for trace values.
///
/// - null / missing ⇒ 0
/// - empty string  ⇒ 0
fn deserialize_hex_u256_trace<'de, D>(deserializer: D) -> Result<U256, D::Error>
where
    D: Deserializer<'de>,
{
    let s = Option::<String>::deserialize(deserializer)?;
    match s {
        Some(s) => {
            let bytes = decode_hex_bytes(&s).map_err(serde::de::Error::custom)?;
            if bytes.len() > 32 {
                return Err(serde::de::Error::custom("trace value exceeds 32 bytes"));
            }
            Ok(U256::from_be_slice(&bytes))
        }
        None => Ok(U256::ZERO),
    }
}
