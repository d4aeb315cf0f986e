//! Wallet sync driver and integration point for all sync services.
//!
//! This module defines the `SyncDriver`, which pulls transaction history from the explorer into
//! the shared ledger. It sizes each fetch with a `SyncStrategy`, walks pages most recent first,
//! parses them with the `TransactionProcessor`, merges them in height order, persists them through
//! `LedgerPersistence` and reports progress through the `EventDispatcher`.
//!
//! The driver is responsible for:
//! - The `NotSynced -> Syncing -> FullySynced` lifecycle and the orthogonal enabled/disabled mode
//! - Tracking the chain tip and the resume height
//! - Discarding in-flight results when the wallet context changes underneath it
//!
//! Ledger mutations happen under the ledger write lock and only after the context generation has
//! been checked, so a sync that started for one account can never merge into another.

use crate::config::{COIN_DECIMALS, SyncConfig};
use crate::explorer::{AccountIdentity, ExplorerApi, ExplorerError, RawUtxo, is_txid};
use crate::utils::format_token_amount;
use crate::wallet::ledger::Ledger;
use crate::wallet::model::Transaction;
use crate::wallet::sync::{
    events::{EventDispatcher, WalletEvent},
    progress_tracker::{SyncProgressTracker, SyncStats},
    state_persistence::LedgerPersistence,
    strategies::{ProbedHistorySync, SyncStrategy},
    transaction_processor::TransactionProcessor,
};
use crate::wallet::types::WalletSyncError;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Sync lifecycle of the active wallet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    NotSynced,
    Syncing,
    FullySynced,
}

/// Shared handles the driver works against.
///
/// Every handle is owned by the wallet context; the driver only borrows them through `Arc`s.
#[derive(Clone)]
pub struct SyncHandles {
    pub ledger: Arc<RwLock<Ledger>>,
    pub persistence: LedgerPersistence,
    pub events: Arc<EventDispatcher>,
    pub generation: Arc<AtomicU64>,
}

/// Drives history fetches from the explorer into the ledger.
pub struct SyncDriver {
    explorer: Arc<dyn ExplorerApi>,
    strategy: Box<dyn SyncStrategy>,
    processor: TransactionProcessor,
    handles: SyncHandles,

    // Context generation the state below belongs to
    generation_seen: u64,
    state: SyncState,
    enabled: bool,
    last_synced_height: u32,
    known_height: u32,

    page_size: u32,
    block_offset: u32,
}

impl SyncDriver {
    /// Create a driver with the default probing strategy.
    pub fn new(explorer: Arc<dyn ExplorerApi>, handles: SyncHandles, config: &SyncConfig) -> Self {
        let strategy = Box::new(ProbedHistorySync::new(
            config.page_size,
            config.probe_after_full_sync,
        ));
        Self::with_strategy(explorer, strategy, handles, config)
    }

    pub fn with_strategy(
        explorer: Arc<dyn ExplorerApi>,
        strategy: Box<dyn SyncStrategy>,
        handles: SyncHandles,
        config: &SyncConfig,
    ) -> Self {
        let generation_seen = handles.generation.load(Ordering::SeqCst);
        Self {
            explorer,
            strategy,
            processor: TransactionProcessor::new(),
            handles,
            generation_seen,
            state: SyncState::NotSynced,
            enabled: true,
            last_synced_height: 0,
            known_height: 0,
            page_size: config.page_size.max(1),
            block_offset: config.block_offset,
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Height the next incremental fetch resumes from
    pub fn last_synced_height(&self) -> u32 {
        self.last_synced_height
    }

    /// Last chain tip reported by the explorer
    pub fn known_height(&self) -> u32 {
        self.known_height
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Point the driver at another explorer. Used on network switch.
    pub fn replace_explorer(&mut self, explorer: Arc<dyn ExplorerApi>) {
        info!("Switching explorer to {}", explorer.name());
        self.explorer = explorer;
        self.reset();
    }

    fn reset(&mut self) {
        self.state = SyncState::NotSynced;
        self.last_synced_height = 0;
        self.known_height = 0;
    }

    /// Drop sync state that belongs to an older wallet context.
    fn observe_generation(&mut self) {
        let current = self.handles.generation.load(Ordering::SeqCst);
        if current != self.generation_seen {
            debug!(
                "Wallet context changed ({} -> {}), resetting sync state",
                self.generation_seen, current
            );
            self.generation_seen = current;
            self.reset();
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.handles.generation.load(Ordering::SeqCst) == generation
    }

    fn ensure_enabled(&self) -> Result<(), WalletSyncError> {
        if self.enabled {
            Ok(())
        } else {
            Err(WalletSyncError::Disabled)
        }
    }

    fn identity_of(ledger: &Ledger) -> AccountIdentity {
        let keys = ledger.resolver().key_provider();
        AccountIdentity {
            export_key: keys.identity_export_key(),
            hierarchical: keys.is_hierarchical(),
        }
    }

    async fn emit_balances(&self) {
        let balances = self.handles.ledger.read().await.balances();
        self.handles
            .events
            .dispatch(&WalletEvent::BalanceUpdated(balances))
            .await;
    }

    pub async fn enable(&mut self) {
        if !self.enabled {
            self.enabled = true;
            info!("Network enabled");
            self.handles
                .events
                .dispatch(&WalletEvent::NetworkToggled { enabled: true })
                .await;
        }
    }

    /// Stop all remote calls. The ledger keeps answering from memory.
    pub async fn disable(&mut self) {
        if self.enabled {
            self.enabled = false;
            warn!("Network disabled, running offline");
            self.handles
                .events
                .dispatch(&WalletEvent::NetworkToggled { enabled: false })
                .await;
        }
    }

    /// Flip the enabled flag; returns the new value.
    pub async fn toggle(&mut self) -> bool {
        if self.enabled {
            self.disable().await;
        } else {
            self.enable().await;
        }
        self.enabled
    }

    /// Fetch the chain tip and apply it to the ledger.
    ///
    /// A failing tip request switches the driver to offline mode. Returns whether the tip moved.
    async fn update_tip(&mut self) -> Result<bool, WalletSyncError> {
        let generation = self.generation_seen;
        let height = match self.explorer.get_chain_height().await {
            Ok(height) => height,
            Err(e) => {
                warn!("Failed to fetch chain height: {}", e);
                self.disable().await;
                return Err(e.into());
            }
        };

        if height <= self.known_height {
            return Ok(false);
        }

        {
            let mut ledger = self.handles.ledger.write().await;
            if !self.is_current(generation) {
                return Err(WalletSyncError::Discarded);
            }
            ledger.set_chain_height(height);
        }

        let old_height = self.known_height;
        self.known_height = height;
        debug!("New block {} (was {})", height, old_height);
        self.handles
            .events
            .dispatch(&WalletEvent::NewBlock {
                new_height: height,
                old_height,
            })
            .await;
        Ok(true)
    }

    /// Fetch every transaction at or above `from_height` and merge it into the ledger.
    ///
    /// Pages are walked from the last (most recent) to the first. Each page is merged in
    /// ascending height order and persisted before the next one is requested.
    pub async fn get_latest_txs(&mut self, from_height: u32) -> Result<SyncStats, WalletSyncError> {
        let generation = self.generation_seen;
        let fully_synced = self.state == SyncState::FullySynced;
        let (identity, known_txs) = {
            let ledger = self.handles.ledger.read().await;
            (Self::identity_of(&ledger), ledger.transaction_count())
        };

        let total_pages = self
            .strategy
            .total_pages(
                self.explorer.as_ref(),
                &identity,
                from_height,
                known_txs,
                fully_synced,
            )
            .await?;
        let mut tracker = SyncProgressTracker::new(from_height, total_pages);

        for page in (1..=total_pages).rev() {
            if !fully_synced {
                self.handles
                    .events
                    .dispatch(&WalletEvent::SyncProgress {
                        current_page: total_pages - page + 1,
                        total_pages,
                        done: false,
                    })
                    .await;
            }

            let fetched = self
                .explorer
                .get_transactions(&identity, from_height, page, self.page_size)
                .await?;
            let txs = self.processor.process_page(&fetched.transactions);
            let seen = txs.len();
            let highest = txs.iter().filter_map(|tx| tx.block_height).max();

            let mut ledger = self.handles.ledger.write().await;
            if !self.is_current(generation) {
                info!("Discarding page {} fetched for a previous wallet", page);
                return Err(WalletSyncError::Discarded);
            }
            let merged = ledger.ingest_all(txs);
            self.handles
                .persistence
                .save_incremental(&mut ledger)
                .await?;
            drop(ledger);

            tracker.record_page(seen, merged, highest);
            tracker.log_progress();
        }

        Ok(tracker.get_stats())
    }

    /// Fetch the full history from the resume height.
    ///
    /// A no-op when already fully synced or when no identity is loaded.
    pub async fn full_sync(&mut self) -> Result<(), WalletSyncError> {
        self.observe_generation();
        self.ensure_enabled()?;
        if self.state == SyncState::FullySynced {
            return Ok(());
        }
        let identity = Self::identity_of(&*self.handles.ledger.read().await);
        if identity.export_key.is_empty() {
            debug!("No identity loaded, skipping full sync");
            return Ok(());
        }

        info!(
            "Starting full sync from height {} using {}",
            self.last_synced_height,
            self.strategy.name()
        );
        self.state = SyncState::Syncing;

        let result = match self.update_tip().await {
            Ok(_) => self.get_latest_txs(self.last_synced_height).await,
            Err(e) => Err(e),
        };
        let stats = match result {
            Ok(stats) => stats,
            Err(e) => {
                self.state = SyncState::NotSynced;
                return Err(e);
            }
        };

        let (highest, spendable) = {
            let ledger = self.handles.ledger.read().await;
            (ledger.highest_height(), ledger.spendable_balance())
        };
        self.last_synced_height = self.last_synced_height.max(highest);
        self.state = SyncState::FullySynced;

        info!("{}", stats.summary());
        info!(
            "Fully synced at height {}, spendable {}",
            self.last_synced_height,
            format_token_amount(spendable, COIN_DECIMALS)
        );
        self.handles
            .events
            .dispatch(&WalletEvent::SyncProgress {
                current_page: 0,
                total_pages: 0,
                done: true,
            })
            .await;
        self.emit_balances().await;
        Ok(())
    }

    /// Check for a new chain tip and, once fully synced, merge the latest transactions.
    ///
    /// The incremental fetch starts `block_offset` blocks below the resume height to cover
    /// explorer lag right after a new block.
    pub async fn poll_new_blocks(&mut self) -> Result<(), WalletSyncError> {
        self.observe_generation();
        self.ensure_enabled()?;

        if !self.update_tip().await? {
            return Ok(());
        }

        if self.state == SyncState::FullySynced {
            let from_height = self.last_synced_height.saturating_sub(self.block_offset);
            let stats = self.get_latest_txs(from_height).await?;
            if stats.transactions_merged > 0 {
                info!("{}", stats.summary());
            }
            let highest = self.handles.ledger.read().await.highest_height();
            self.last_synced_height = self.last_synced_height.max(highest);
        }

        self.emit_balances().await;
        Ok(())
    }

    /// Submit a signed transaction. The outcome is also reported as an event.
    pub async fn broadcast(&self, raw_hex: &str) -> Result<String, WalletSyncError> {
        self.ensure_enabled()?;
        let result = match self.explorer.broadcast(raw_hex).await {
            Ok(txid) if is_txid(&txid) => Ok(txid),
            Ok(other) => Err(ExplorerError::InvalidResponse(format!(
                "broadcast returned {:?}",
                other
            ))),
            Err(e) => Err(e),
        };

        let event = match &result {
            Ok(txid) => {
                info!("Broadcast transaction {}", txid);
                WalletEvent::TransactionBroadcast {
                    success: true,
                    result: txid.clone(),
                }
            }
            Err(e) => {
                warn!("Broadcast failed: {}", e);
                WalletEvent::TransactionBroadcast {
                    success: false,
                    result: e.to_string(),
                }
            }
        };
        self.handles.events.dispatch(&event).await;
        Ok(result?)
    }

    /// Explorer-side unspent outputs of an address or extended key. Ledger state is untouched.
    pub async fn get_address_utxos(&self, key: &str) -> Result<Vec<RawUtxo>, WalletSyncError> {
        self.ensure_enabled()?;
        Ok(self.explorer.get_address_utxos(key).await?)
    }

    /// Look up a single transaction on the explorer.
    pub async fn get_transaction(
        &self,
        txid: &str,
    ) -> Result<Option<Transaction>, WalletSyncError> {
        self.ensure_enabled()?;
        match self.explorer.get_transaction(txid).await? {
            Some(raw) => Ok(Some(self.processor.parse_transaction(&raw)?)),
            None => Ok(None),
        }
    }
}
