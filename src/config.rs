//! Configuration loading
//!
//! The indexer reads one JSON file at start-up. Environment variables can
//! override the RPC endpoint of each chain (`<CHAIN>_RPC_URL`) and the
//! checkpoint store location (`PROGRESS_DB_PATH`). Any problem found here
//! is fatal; nothing is validated again once scanning runs.

use crate::error::ScanError;
use crate::keys::validate_name;
use crate::scanner::ScanSettings;
use alloy_primitives::Address;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct IndexerConfig {
    pub store: StoreConfig,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,
    /// Transactions of one block processed at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    pub chains: Vec<ChainConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub name: String,
    #[serde(default)]
    pub rpc_url: String,
    #[serde(default = "default_native_symbol")]
    pub native_symbol: String,
    #[serde(default = "default_native_decimals")]
    pub native_decimals: u8,
    pub protocols: Vec<ProtocolConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProtocolConfig {
    pub name: String,
    /// Contract addresses whose transactions belong to the protocol
    #[serde(default)]
    pub contracts: Vec<String>,
    /// Optional address list file, resolved relative to the config file
    #[serde(default)]
    pub contracts_file: Option<PathBuf>,
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_max_backoff_secs() -> u64 {
    120
}

fn default_concurrency() -> usize {
    16
}

fn default_native_symbol() -> String {
    "ETH".to_string()
}

fn default_native_decimals() -> u8 {
    18
}

/// Name of the environment variable overriding a chain's RPC URL.
///
/// `"Ethereum"` → `ETHEREUM_RPC_URL`, `"bnb-chain"` → `BNB_CHAIN_RPC_URL`.
pub fn rpc_url_env_var(chain: &str) -> String {
    let name: String = chain
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{}_RPC_URL", name)
}

impl IndexerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn scan_settings(&self) -> ScanSettings {
        ScanSettings {
            poll_interval: self.poll_interval(),
            max_backoff: Duration::from_secs(self.max_backoff_secs),
        }
    }

    /// Apply overrides from a variable lookup (the process environment in production).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("PROGRESS_DB_PATH").filter(|v| !v.is_empty()) {
            self.store.path = PathBuf::from(path);
        }
        for chain in &mut self.chains {
            if let Some(url) = lookup(&rpc_url_env_var(&chain.name)).filter(|v| !v.is_empty()) {
                chain.rpc_url = url;
            }
        }
    }

    /// Inline contracts from every protocol's `contracts_file`.
    fn resolve_contract_files(&mut self, base_dir: &Path) -> Result<()> {
        for chain in &mut self.chains {
            for protocol in &mut chain.protocols {
                if let Some(file) = protocol.contracts_file.take() {
                    let path = base_dir.join(file);
                    let addresses = load_address_list(&path).with_context(|| {
                        format!("Failed to load contracts for {}:{}", chain.name, protocol.name)
                    })?;
                    protocol
                        .contracts
                        .extend(addresses.iter().map(|a| format!("0x{:x}", a)));
                }
            }
        }
        Ok(())
    }

    /// Check everything that would otherwise fail during scanning.
    pub fn validate(&self) -> std::result::Result<(), ScanError> {
        if self.chains.is_empty() {
            return Err(ScanError::Config("no chains configured".to_string()));
        }
        if self.poll_interval_secs == 0 {
            return Err(ScanError::Config("poll_interval_secs must be positive".to_string()));
        }
        if self.concurrency == 0 {
            return Err(ScanError::Config("concurrency must be positive".to_string()));
        }

        let mut chain_names = HashSet::new();
        for chain in &self.chains {
            validate_name("chain", &chain.name)?;
            if !chain_names.insert(chain.name.as_str()) {
                return Err(ScanError::Config(format!("duplicate chain '{}'", chain.name)));
            }
            if chain.rpc_url.trim().is_empty() {
                return Err(ScanError::Config(format!(
                    "chain '{}' has no rpc_url (set it or {})",
                    chain.name,
                    rpc_url_env_var(&chain.name)
                )));
            }

            let mut protocol_names = HashSet::new();
            for protocol in &chain.protocols {
                validate_name("protocol", &protocol.name)?;
                if !protocol_names.insert(protocol.name.as_str()) {
                    return Err(ScanError::Config(format!(
                        "duplicate protocol '{}' on chain '{}'",
                        protocol.name, chain.name
                    )));
                }
                protocol.contract_addresses()?;
            }
        }
        Ok(())
    }
}

impl ProtocolConfig {
    /// Parsed contract allow-list. Empty lists are rejected.
    pub fn contract_addresses(&self) -> std::result::Result<HashSet<Address>, ScanError> {
        let mut set = HashSet::new();
        for raw in &self.contracts {
            let addr = parse_address(raw).map_err(|e| {
                ScanError::Config(format!("protocol '{}': {:#}", self.name, e))
            })?;
            set.insert(addr);
        }
        if set.is_empty() {
            return Err(ScanError::Config(format!(
                "protocol '{}' has no contract addresses",
                self.name
            )));
        }
        Ok(set)
    }
}

/// Load, resolve, override from the environment and validate a config file.
pub fn load_config(path: &Path) -> Result<IndexerConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;
    let mut config: IndexerConfig = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    config.resolve_contract_files(base_dir)?;
    config.apply_overrides(|name| std::env::var(name).ok());
    config.validate()?;
    Ok(config)
}

/// Load an address list from a file.
///
/// Each line should contain one address in hex format (with or without 0x prefix).
/// Empty lines and lines starting with '#' are ignored.
pub fn load_address_list(path: &Path) -> Result<Vec<Address>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read address list: {:?}", path))?;

    let mut addresses = Vec::new();
    for (line_num, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let addr = parse_address(line)
            .with_context(|| format!("Invalid address on line {}: {}", line_num + 1, line))?;
        addresses.push(addr);
    }

    if addresses.is_empty() {
        anyhow::bail!("Address list {:?} is empty", path);
    }
    Ok(addresses)
}

/// Parse an address from a hex string.
///
/// Accepts addresses with or without 0x prefix.
fn parse_address(s: &str) -> Result<Address> {
    let s = s.trim();
    let s = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(s).with_context(|| format!("Invalid hex address: {}", s))?;
    if bytes.len() != 20 {
        anyhow::bail!("Address must be 20 bytes (40 hex chars), got {} bytes", bytes.len());
    }
    Ok(Address::from_slice(&bytes))
}
