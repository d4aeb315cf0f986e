//! State persistence service for the wallet ledger.
//!
//! This module provides `LedgerPersistence`, which writes confirmed transactions to the record
//! store incrementally and replays them on startup. Replay is guarded by an identity check: a
//! store bound to a different account is wiped and rebound before anything is trusted.
//!
//! Callers hold the ledger write lock across both operations, so a reset can never interleave
//! with a half-finished save or replay.

use crate::wallet::ledger::Ledger;
use crate::wallet::sync::repositories::{Account, Database};
use crate::wallet::types::PersistenceError;

use futures::future::try_join_all;
use tracing::{info, warn};

/// Service for managing ledger persistence operations.
#[derive(Clone)]
pub struct LedgerPersistence {
    db: Database,
}

impl LedgerPersistence {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Persist confirmed transactions at or above the saved high-water mark.
    ///
    /// Heights are walked from the top down and the walk stops at the first height below the
    /// mark. Returns the number of transactions written.
    pub async fn save_incremental(&self, ledger: &mut Ledger) -> Result<usize, PersistenceError> {
        let mark = ledger.highest_saved_height();
        let mut batch = Vec::new();
        let mut highest = None;

        for (height, txs) in ledger.heights_descending() {
            if height < mark {
                break;
            }
            highest = highest.max(Some(height));
            batch.extend(txs.into_iter().cloned());
        }

        try_join_all(batch.iter().map(|tx| self.db.store_tx(tx))).await?;

        if let Some(height) = highest {
            ledger.set_highest_saved_height(height);
        }
        if !batch.is_empty() {
            info!(
                "Saved {} transactions up to height {}",
                batch.len(),
                ledger.highest_saved_height()
            );
        }
        Ok(batch.len())
    }

    /// Replay the stored transactions into `ledger`.
    ///
    /// When the stored account belongs to another identity or another network (or there is
    /// none), every stored transaction, the masternode record and the account record are
    /// discarded and a fresh record is bound to the active identity on `network`. Returns whether
    /// any transaction was loaded.
    pub async fn load_on_startup(
        &self,
        ledger: &mut Ledger,
        network: &str,
    ) -> Result<bool, PersistenceError> {
        let identity = ledger.resolver().key_provider().identity_export_key();

        match self.db.get_account().await? {
            Some(account) if account.identity_key == identity && account.network == network => {}
            stored => {
                if let Some(account) = stored {
                    warn!(
                        "Stored data belongs to {} on {}, discarding it for {} on {}",
                        account.identity_key, account.network, identity, network
                    );
                }
                self.db.remove_all_txs().await?;
                self.db.remove_masternode().await?;
                self.db.remove_account().await?;
                self.db
                    .add_account(Account {
                        identity_key: identity,
                        network: network.to_string(),
                        ..Default::default()
                    })
                    .await?;
                return Ok(false);
            }
        }

        let txs = self.db.get_txs().await?;
        if txs.is_empty() {
            return Ok(false);
        }

        let count = txs.len();
        ledger.ingest_all(txs);
        ledger.set_highest_saved_height(ledger.highest_height());
        info!(
            "Loaded {} transactions from disk up to height {}",
            count,
            ledger.highest_height()
        );
        Ok(true)
    }
}
