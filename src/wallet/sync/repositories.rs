use crate::wallet::model::Transaction;
use crate::wallet::types::{PersistenceError, StoreError};

use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

pub const ACCOUNTS: &str = "accounts";
pub const TRANSACTIONS: &str = "txs";
pub const SETTINGS: &str = "settings";
pub const MASTERNODES: &str = "masternodes";

/// Single-record collections use this key
const SINGLETON_KEY: &str = "main";

/// Key-record store with named collections, scoped to one wallet profile
#[async_trait::async_trait]
pub trait RecordStore: Send + Sync {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>, StoreError>;
    async fn put(&self, collection: &str, key: &str, record: Value) -> Result<(), StoreError>;
    async fn delete(&self, collection: &str, key: &str) -> Result<(), StoreError>;
    async fn list(&self, collection: &str) -> Result<Vec<Value>, StoreError>;
    async fn clear(&self, collection: &str) -> Result<(), StoreError>;
}

/// On-disk envelope of every record
#[derive(Serialize, Deserialize)]
struct StoredRecord {
    saved_at: String,
    record: Value,
}

/// File-based implementation of RecordStore: `<data_dir>/<profile>/<collection>/<key>.json`
pub struct FileRecordStore {
    root: PathBuf,
}

impl FileRecordStore {
    pub fn new(data_dir: PathBuf, profile: &str) -> Self {
        Self {
            root: data_dir.join(profile),
        }
    }

    fn collection_dir(&self, collection: &str) -> PathBuf {
        self.root.join(collection)
    }

    /// Path of one record. Keys become file names, so anything that could leave the
    /// collection directory is refused.
    fn record_path(&self, collection: &str, key: &str) -> Result<PathBuf, StoreError> {
        let unsafe_key = key.is_empty()
            || key.starts_with('.')
            || key.contains("..")
            || key.chars().any(|c| c == '/' || c == '\\' || c == '\0');
        if unsafe_key {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.collection_dir(collection).join(format!("{}.json", key)))
    }
}

#[async_trait::async_trait]
impl RecordStore for FileRecordStore {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>, StoreError> {
        let path = self.record_path(collection, key)?;
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let stored: StoredRecord = serde_json::from_str(&content)?;
        Ok(Some(stored.record))
    }

    async fn put(&self, collection: &str, key: &str, record: Value) -> Result<(), StoreError> {
        let path = self.record_path(collection, key)?;
        let dir = self.collection_dir(collection);
        tokio::fs::create_dir_all(&dir).await?;

        let stored = StoredRecord {
            saved_at: chrono::Utc::now().to_rfc3339(),
            record,
        };
        let content = serde_json::to_string_pretty(&stored)?;

        // Write then rename so a crash never leaves a truncated record behind
        let tmp = dir.join(format!("{}.json.tmp", key));
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &path).await?;

        debug!("Saved record {}/{} to {:?}", collection, key, path);
        Ok(())
    }

    async fn delete(&self, collection: &str, key: &str) -> Result<(), StoreError> {
        match tokio::fs::remove_file(self.record_path(collection, key)?).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, collection: &str) -> Result<Vec<Value>, StoreError> {
        let mut entries = match tokio::fs::read_dir(self.collection_dir(collection)).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let content = tokio::fs::read_to_string(&path).await?;
            match serde_json::from_str::<StoredRecord>(&content) {
                Ok(stored) => records.push(stored.record),
                Err(e) => warn!("Skipping unreadable record {:?}: {}", path, e),
            }
        }
        Ok(records)
    }

    async fn clear(&self, collection: &str) -> Result<(), StoreError> {
        match tokio::fs::remove_dir_all(self.collection_dir(collection)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory implementation of RecordStore
#[derive(Default)]
pub struct MemoryRecordStore {
    collections: RwLock<HashMap<String, HashMap<String, Value>>>,
}

#[async_trait::async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>, StoreError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|records| records.get(key))
            .cloned())
    }

    async fn put(&self, collection: &str, key: &str, record: Value) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(key.to_string(), record);
        Ok(())
    }

    async fn delete(&self, collection: &str, key: &str) -> Result<(), StoreError> {
        if let Some(records) = self.collections.write().await.get_mut(collection) {
            records.remove(key);
        }
        Ok(())
    }

    async fn list(&self, collection: &str) -> Result<Vec<Value>, StoreError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn clear(&self, collection: &str) -> Result<(), StoreError> {
        self.collections.write().await.remove(collection);
        Ok(())
    }
}

/// Persisted account record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Public identity this store is bound to
    pub identity_key: String,
    /// Network the stored history was fetched from
    #[serde(default)]
    pub network: String,
    #[serde(default)]
    pub encrypted_secret: Option<String>,
    #[serde(default)]
    pub cold_staking_address: Option<String>,
    /// Locally created governance proposals, opaque to the wallet core
    #[serde(default)]
    pub local_proposals: Vec<Value>,
}

/// Partial account update; `None` fields are left untouched
#[derive(Debug, Clone, Default)]
pub struct AccountUpdate {
    pub encrypted_secret: Option<String>,
    pub cold_staking_address: Option<String>,
    pub local_proposals: Option<Vec<Value>>,
}

/// User preferences stored alongside the wallet data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Selected explorer URL
    pub explorer: Option<String>,
    /// Selected node URL
    pub node: Option<String>,
    pub translation: String,
    pub display_decimals: u32,
    pub advanced_mode: bool,
    pub auto_switch: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            explorer: None,
            node: None,
            translation: "en".to_string(),
            display_decimals: 2,
            advanced_mode: false,
            auto_switch: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SettingsUpdate {
    pub explorer: Option<String>,
    pub node: Option<String>,
    pub translation: Option<String>,
    pub display_decimals: Option<u32>,
    pub advanced_mode: Option<bool>,
    pub auto_switch: Option<bool>,
}

/// Masternode collateral reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Masternode {
    pub collateral_tx_id: String,
    pub output_index: u32,
}

fn encode<T: Serialize>(record: &T) -> Result<Value, StoreError> {
    Ok(serde_json::to_value(record)?)
}

fn decode<T: DeserializeOwned>(record: Value) -> Result<T, StoreError> {
    Ok(serde_json::from_value(record)?)
}

/// Typed access to the wallet's persisted records
#[derive(Clone)]
pub struct Database {
    store: Arc<dyn RecordStore>,
}

impl Database {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub async fn get_account(&self) -> Result<Option<Account>, PersistenceError> {
        match self.store.get(ACCOUNTS, SINGLETON_KEY).await? {
            Some(record) => Ok(Some(decode(record)?)),
            None => Ok(None),
        }
    }

    /// Store a new account record
    pub async fn add_account(&self, account: Account) -> Result<(), PersistenceError> {
        if account.identity_key.is_empty() {
            return Err(PersistenceError::InvalidAccount);
        }
        if self.get_account().await?.is_some() {
            return Err(PersistenceError::AccountExists);
        }
        self.store
            .put(ACCOUNTS, SINGLETON_KEY, encode(&account)?)
            .await?;
        info!("Stored account record for {}", account.identity_key);
        Ok(())
    }

    /// Merge `update` into the stored account.
    ///
    /// An empty proposal list leaves the stored list alone unless `allow_deletion` is set.
    pub async fn update_account(
        &self,
        update: AccountUpdate,
        allow_deletion: bool,
    ) -> Result<Account, PersistenceError> {
        let mut account = self
            .get_account()
            .await?
            .ok_or(PersistenceError::AccountMissing)?;

        if let Some(secret) = update.encrypted_secret {
            account.encrypted_secret = Some(secret);
        }
        if let Some(address) = update.cold_staking_address {
            account.cold_staking_address = Some(address);
        }
        if let Some(proposals) = update.local_proposals {
            if !proposals.is_empty() || allow_deletion {
                account.local_proposals = proposals;
            }
        }

        self.store
            .put(ACCOUNTS, SINGLETON_KEY, encode(&account)?)
            .await?;
        Ok(account)
    }

    pub async fn remove_account(&self) -> Result<(), PersistenceError> {
        self.store.delete(ACCOUNTS, SINGLETON_KEY).await?;
        Ok(())
    }

    pub async fn store_tx(&self, tx: &Transaction) -> Result<(), PersistenceError> {
        self.store.put(TRANSACTIONS, &tx.txid, encode(tx)?).await?;
        Ok(())
    }

    /// All stored transactions in ascending block-height order
    pub async fn get_txs(&self) -> Result<Vec<Transaction>, PersistenceError> {
        let mut txs = self
            .store
            .list(TRANSACTIONS)
            .await?
            .into_iter()
            .map(decode::<Transaction>)
            .collect::<Result<Vec<_>, _>>()?;
        txs.sort_by(|a, b| {
            (a.block_height.unwrap_or(u32::MAX), &a.txid)
                .cmp(&(b.block_height.unwrap_or(u32::MAX), &b.txid))
        });
        Ok(txs)
    }

    pub async fn remove_all_txs(&self) -> Result<(), PersistenceError> {
        self.store.clear(TRANSACTIONS).await?;
        Ok(())
    }

    /// Stored settings, or the defaults when nothing was saved yet
    pub async fn get_settings(&self) -> Result<Settings, PersistenceError> {
        match self.store.get(SETTINGS, SINGLETON_KEY).await? {
            Some(record) => Ok(decode(record)?),
            None => Ok(Settings::default()),
        }
    }

    pub async fn set_settings(&self, update: SettingsUpdate) -> Result<Settings, PersistenceError> {
        let mut settings = self.get_settings().await?;
        if let Some(explorer) = update.explorer {
            settings.explorer = Some(explorer);
        }
        if let Some(node) = update.node {
            settings.node = Some(node);
        }
        if let Some(translation) = update.translation {
            settings.translation = translation;
        }
        if let Some(decimals) = update.display_decimals {
            settings.display_decimals = decimals;
        }
        if let Some(advanced) = update.advanced_mode {
            settings.advanced_mode = advanced;
        }
        if let Some(auto_switch) = update.auto_switch {
            settings.auto_switch = auto_switch;
        }
        self.store
            .put(SETTINGS, SINGLETON_KEY, encode(&settings)?)
            .await?;
        Ok(settings)
    }

    pub async fn get_masternode(&self) -> Result<Option<Masternode>, PersistenceError> {
        match self.store.get(MASTERNODES, SINGLETON_KEY).await? {
            Some(record) => Ok(Some(decode(record)?)),
            None => Ok(None),
        }
    }

    pub async fn add_masternode(&self, masternode: &Masternode) -> Result<(), PersistenceError> {
        self.store
            .put(MASTERNODES, SINGLETON_KEY, encode(masternode)?)
            .await?;
        Ok(())
    }

    pub async fn remove_masternode(&self) -> Result<(), PersistenceError> {
        self.store.delete(MASTERNODES, SINGLETON_KEY).await?;
        Ok(())
    }
}
