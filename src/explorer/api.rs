use super::types::{ExplorerError, RawTransaction, RawUtxo, TxPage};

use serde::{Deserialize, Serialize};

/// Public identity the explorer indexes an account by
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountIdentity {
    /// Extended public key for HD accounts, address otherwise
    pub export_key: String,
    pub hierarchical: bool,
}

/// Remote source of chain data.
#[async_trait::async_trait]
pub trait ExplorerApi: Send + Sync {
    /// Current chain tip height
    async fn get_chain_height(&self) -> Result<u32, ExplorerError>;

    /// One page of the account's transactions at or above `from_height`.
    /// Pages are 1-based, most recent first.
    async fn get_transactions(
        &self,
        identity: &AccountIdentity,
        from_height: u32,
        page: u32,
        page_size: u32,
    ) -> Result<TxPage, ExplorerError>;

    async fn get_transaction(&self, txid: &str) -> Result<Option<RawTransaction>, ExplorerError>;

    /// Submit a signed transaction; returns its id.
    async fn broadcast(&self, raw_hex: &str) -> Result<String, ExplorerError>;

    /// Unspent outputs of an address or extended key
    async fn get_address_utxos(&self, key: &str) -> Result<Vec<RawUtxo>, ExplorerError>;

    /// Get the name of this endpoint for logging and diagnostics.
    fn name(&self) -> &str;
}

/// Whether `value` looks like a transaction id
pub fn is_txid(value: &str) -> bool {
    value.len() == 64 && value.bytes().all(|b| b.is_ascii_hexdigit())
}
