//! Key encoding and decoding utilities
//!
//! A checkpoint record is addressed by the composite string
//! `"<chain>:<protocol>"`, stored as its UTF-8 bytes. Neither part may
//! contain the separator, so the encoding is reversible.

use crate::error::ScanError;
use crate::records::ScanUnitKey;
use anyhow::{Context, Result};

/// Separator between chain and protocol in a checkpoint key.
pub const KEY_SEPARATOR: char = ':';

/// Check that a chain or protocol name can be used in a checkpoint key.
pub fn validate_name(kind: &str, name: &str) -> std::result::Result<(), ScanError> {
    if name.trim().is_empty() {
        return Err(ScanError::Config(format!("{} name is empty", kind)));
    }
    if name.contains(KEY_SEPARATOR) {
        return Err(ScanError::Config(format!(
            "{} name '{}' must not contain '{}'",
            kind, name, KEY_SEPARATOR
        )));
    }
    Ok(())
}

/// Encode a checkpoint key.
///
/// Format: chain bytes + b':' + protocol bytes
pub fn encode_checkpoint_key(key: &ScanUnitKey) -> Vec<u8> {
    let mut out = Vec::with_capacity(key.chain.len() + 1 + key.protocol.len());
    out.extend_from_slice(key.chain.as_bytes());
    out.push(KEY_SEPARATOR as u8);
    out.extend_from_slice(key.protocol.as_bytes());
    out
}

/// Decode a checkpoint key produced by [`encode_checkpoint_key`].
pub fn decode_checkpoint_key(bytes: &[u8]) -> Result<ScanUnitKey> {
    let s = std::str::from_utf8(bytes).context("Checkpoint key is not valid UTF-8")?;
    let (chain, protocol) = s
        .split_once(KEY_SEPARATOR)
        .with_context(|| format!("Checkpoint key '{}' has no separator", s))?;
    if chain.is_empty() || protocol.is_empty() {
        anyhow::bail!("Checkpoint key '{}' has an empty part", s);
    }
    Ok(ScanUnitKey::new(chain, protocol))
}
