//! Chain parameters and runtime configuration.
//!
//! `ChainParams` carries the per-network constants the ledger and the sync driver depend on.
//! `WalletConfig` is the operator-facing configuration, loaded from TOML with defaults for
//! every field.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Satoshis per coin.
pub const COIN: u64 = 100_000_000;
/// Decimal places of the native coin.
pub const COIN_DECIMALS: u32 = 8;
/// Consecutive unused derived addresses scanned before an HD account search ends.
pub const MAX_ACCOUNT_GAP: u32 = 20;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Supported networks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Mainnet,
    Testnet,
}

/// A remote data-source endpoint (Blockbook-compatible explorer or node)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub name: String,
    pub url: String,
}

impl Endpoint {
    pub fn new(name: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
        }
    }
}

/// Consensus and addressing constants for one network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainParams {
    pub network: Network,
    pub name: &'static str,
    pub ticker: &'static str,
    /// Blocks a coinbase/coinstake output must wait before it can be spent
    pub coinbase_maturity: u32,
    /// Exact value of a masternode collateral output, in satoshis
    pub collateral_amount: u64,
    /// Leading character of staking (cold) addresses
    pub staking_address_prefix: char,
    pub pubkey_address_version: u8,
    pub staking_address_version: u8,
    pub bip44_coin_type: u32,
    pub explorers: Vec<Endpoint>,
    pub nodes: Vec<Endpoint>,
    pub default_cold_staking_address: &'static str,
}

impl ChainParams {
    pub fn mainnet() -> Self {
        Self {
            network: Network::Mainnet,
            name: "mainnet",
            ticker: "AIPG",
            coinbase_maturity: 100,
            collateral_amount: 10_000 * COIN,
            staking_address_prefix: 'A',
            pubkey_address_version: 23,
            staking_address_version: 23,
            bip44_coin_type: 2686,
            explorers: vec![Endpoint::new(
                "AIPG BlockBook",
                "https://blockbook.aipowergrid.io",
            )],
            nodes: vec![
                Endpoint::new("AIPG US", "https://us-seed1.aipowergrid.io"),
                Endpoint::new("AIPG Japan", "https://jp-seed2.aipowergrid.io"),
                Endpoint::new("AIPG Australia", "https://au-seed3.aipowergrid.io"),
                Endpoint::new("AIPG Europe", "https://eu-seed4.aipowergrid.io"),
                Endpoint::new("AIPG India", "https://in-seed4.aipowergrid.io"),
            ],
            default_cold_staking_address: "AdgQDpS8jDRJDX8yK8m9KnTMarsE84zdsy",
        }
    }

    pub fn testnet() -> Self {
        Self {
            network: Network::Testnet,
            name: "testnet",
            ticker: "tAIPG",
            coinbase_maturity: 15,
            collateral_amount: 10_000 * COIN,
            staking_address_prefix: 'a',
            pubkey_address_version: 23,
            staking_address_version: 23,
            bip44_coin_type: 1,
            explorers: vec![Endpoint::new(
                "AIPG Blockbook",
                "https://blockbook.aipowergrid.io",
            )],
            nodes: vec![
                Endpoint::new("AIPG TestNode1", "seed1-testnet.aipowergrid.io"),
                Endpoint::new("AIPG TestNode2", "seed2-testnet.aipowergrid.io"),
            ],
            default_cold_staking_address: "amNziUEPyhnUkiVdfsiNX93H6rSJnios44",
        }
    }

    pub fn for_network(network: Network) -> Self {
        match network {
            Network::Mainnet => Self::mainnet(),
            Network::Testnet => Self::testnet(),
        }
    }
}

/// Sync driver tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Interval between chain-tip polls
    pub poll_interval_secs: u64,
    /// Transactions requested per explorer page
    pub page_size: u32,
    /// Blocks re-requested behind the resume point on every incremental fetch
    pub block_offset: u32,
    /// Attempts against a single endpoint for idempotent reads
    pub max_retries: u32,
    pub retry_initial_interval_ms: u64,
    /// Rotate to the next endpoint on failure instead of surfacing the error
    pub auto_switch: bool,
    /// Keep probing the total transaction count after the first full sync
    pub probe_after_full_sync: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 15,
            page_size: 1000,
            block_offset: 10,
            max_retries: 5,
            retry_initial_interval_ms: 500,
            auto_switch: true,
            probe_after_full_sync: true,
        }
    }
}

/// UTXO selection tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Headroom over the target, in percent, before selection stops early
    pub buffer_percent: u64,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self { buffer_percent: 10 }
    }
}

/// Top-level wallet configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    pub network: Network,
    pub data_dir: PathBuf,
    /// Store scope; profiles never see each other's records
    pub profile: String,
    pub gap_limit: u32,
    pub sync: SyncConfig,
    pub selection: SelectionConfig,
    /// Overrides the chain-param explorer list when set
    pub explorers: Option<Vec<Endpoint>>,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            network: Network::default(),
            data_dir: PathBuf::from("./data"),
            profile: "default".to_string(),
            gap_limit: MAX_ACCOUNT_GAP,
            sync: SyncConfig::default(),
            selection: SelectionConfig::default(),
            explorers: None,
        }
    }
}

impl WalletConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: WalletConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.profile.is_empty() {
            return Err(ConfigError::Invalid("profile must not be empty".to_string()));
        }
        if self.sync.page_size == 0 {
            return Err(ConfigError::Invalid("sync.page_size must be positive".to_string()));
        }
        if self.sync.max_retries == 0 {
            return Err(ConfigError::Invalid(
                "sync.max_retries must be positive".to_string(),
            ));
        }
        if self.gap_limit == 0 {
            return Err(ConfigError::Invalid("gap_limit must be positive".to_string()));
        }
        if let Some(explorers) = &self.explorers {
            if explorers.is_empty() {
                return Err(ConfigError::Invalid(
                    "explorers override must list at least one endpoint".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Chain parameters for the configured network, with the explorer override applied.
    pub fn chain_params(&self) -> ChainParams {
        let mut params = ChainParams::for_network(self.network);
        if let Some(explorers) = &self.explorers {
            params.explorers = explorers.clone();
        }
        params
    }
}
