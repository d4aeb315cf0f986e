//! Types for Blockbook REST integration

use serde::{Deserialize, Serialize};

/// A transaction input as reported by the explorer.
///
/// Coinbase inputs carry no `txid`. Blockbook omits `vout` when it is zero.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawVin {
    #[serde(default)]
    pub txid: Option<String>,
    #[serde(default)]
    pub vout: u32,
    /// Signature script, hex
    #[serde(default)]
    pub hex: Option<String>,
}

/// A transaction output as reported by the explorer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawVout {
    /// Value in satoshis, as a decimal string
    pub value: String,
    pub n: u32,
    /// Redeem script, hex
    #[serde(default)]
    pub hex: Option<String>,
}

/// A transaction record from the explorer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawTransaction {
    pub txid: String,
    /// Block height, `-1` (or absent) while in the mempool
    #[serde(rename = "blockHeight", default = "pending_height")]
    pub block_height: i64,
    #[serde(default)]
    pub vin: Vec<RawVin>,
    #[serde(default)]
    pub vout: Vec<RawVout>,
    #[serde(rename = "blockTime", default)]
    pub block_time: Option<i64>,
}

fn pending_height() -> i64 {
    -1
}

/// One page of an account's transaction history.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TxPage {
    #[serde(default)]
    pub page: u32,
    #[serde(rename = "totalPages", default)]
    pub total_pages: u32,
    /// Total transaction count of the account, regardless of the height filter
    #[serde(default)]
    pub txs: u64,
    /// Blockbook drops this field entirely when a page is empty
    #[serde(default)]
    pub transactions: Vec<RawTransaction>,
}

/// An unspent output as reported by the explorer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawUtxo {
    pub txid: String,
    #[serde(default)]
    pub vout: u32,
    pub value: String,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub confirmations: u64,
}

/// Backend status section of `/api/v2/api`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendInfo {
    pub blocks: u32,
}

/// Response of `/api/v2/api`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainInfo {
    pub backend: BackendInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendTxError {
    pub message: String,
}

/// Response of `/api/v2/sendtx/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendTxResponse {
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub error: Option<SendTxError>,
}

/// Error types for explorer operations
#[derive(Debug, thiserror::Error)]
pub enum ExplorerError {
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Explorer returned status {0}")]
    StatusError(u16),

    #[error("Invalid explorer response: {0}")]
    InvalidResponse(String),

    #[error("Broadcast rejected: {0}")]
    BroadcastRejected(String),

    #[error("No explorer endpoints configured")]
    NoEndpoints,

    #[error("All explorer endpoints failed, last error: {0}")]
    Exhausted(Box<ExplorerError>),
}

impl ExplorerError {
    /// Whether repeating the same request may succeed
    pub fn is_transient(&self) -> bool {
        !matches!(
            self,
            ExplorerError::BroadcastRejected(_) | ExplorerError::NoEndpoints
        )
    }
}
