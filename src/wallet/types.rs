use crate::config::ConfigError;
use crate::explorer::ExplorerError;

/// Record store failures
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid record key: {0:?}")]
    InvalidKey(String),
}

/// Persistence layer failures.
///
/// The first three are local validation failures and are never retried.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("invalid account: missing identity key")]
    InvalidAccount,

    #[error("account already exists")]
    AccountExists,

    #[error("account doesn't exist")]
    AccountMissing,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Error types for wallet sync
#[derive(Debug, thiserror::Error)]
pub enum WalletSyncError {
    #[error("Sync failed: {0}")]
    SyncFailed(#[from] ExplorerError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Transaction parse error: {0}")]
    ParseError(String),

    #[error("Network is disabled")]
    Disabled,

    #[error("Result discarded: wallet context changed during sync")]
    Discarded,

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl From<StoreError> for WalletSyncError {
    fn from(e: StoreError) -> Self {
        WalletSyncError::Persistence(PersistenceError::Store(e))
    }
}
