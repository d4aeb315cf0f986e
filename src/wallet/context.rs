//! The active wallet.
//!
//! `WalletContext` owns the ledger (and through it the ownership resolver), the persistence layer
//! and the sync driver of one account on one network. Account and network switches reset every
//! component under the ledger write lock and bump a generation counter; a sync that was in flight
//! sees the new generation and discards what it fetched.

use crate::config::{ChainParams, WalletConfig};
use crate::explorer::{ExplorerApi, FailoverExplorer, RawUtxo};
use crate::wallet::history::HistoricalTx;
use crate::wallet::ledger::{Balances, Ledger};
use crate::wallet::model::{Outpoint, TxOut};
use crate::wallet::ownership::{KeyProvider, OwnershipResolver, UtxoState};
use crate::wallet::sync::background::{SyncLoopHandle, spawn_sync_loop};
use crate::wallet::sync::events::{EventDispatcher, WalletEvent};
use crate::wallet::sync::repositories::{
    Database, Masternode, RecordStore, Settings, SettingsUpdate,
};
use crate::wallet::sync::state_persistence::LedgerPersistence;
use crate::wallet::sync::{SyncDriver, SyncHandles};
use crate::wallet::types::WalletSyncError;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

pub struct WalletContext {
    config: WalletConfig,
    params: RwLock<ChainParams>,
    ledger: Arc<RwLock<Ledger>>,
    persistence: LedgerPersistence,
    driver: Arc<Mutex<SyncDriver>>,
    events: Arc<EventDispatcher>,
    generation: Arc<AtomicU64>,
}

impl WalletContext {
    /// Open a wallet over an explicit explorer and record store.
    pub fn open(
        config: WalletConfig,
        keys: Arc<dyn KeyProvider>,
        explorer: Arc<dyn ExplorerApi>,
        store: Arc<dyn RecordStore>,
        events: EventDispatcher,
    ) -> Result<Self, WalletSyncError> {
        config.validate()?;
        let params = config.chain_params();

        let resolver = OwnershipResolver::new(keys, &params, config.gap_limit);
        let ledger = Arc::new(RwLock::new(Ledger::new(
            resolver,
            &params,
            config.selection.buffer_percent,
        )));
        let persistence = LedgerPersistence::new(Database::new(store));
        let events = Arc::new(events);
        let generation = Arc::new(AtomicU64::new(0));

        let handles = SyncHandles {
            ledger: ledger.clone(),
            persistence: persistence.clone(),
            events: events.clone(),
            generation: generation.clone(),
        };
        let driver = SyncDriver::new(explorer, handles, &config.sync);

        info!(
            "Opened {} wallet in profile {}",
            params.name, config.profile
        );
        Ok(Self {
            config,
            params: RwLock::new(params),
            ledger,
            persistence,
            driver: Arc::new(Mutex::new(driver)),
            events,
            generation,
        })
    }

    /// Failover explorer over the chain's Blockbook endpoints.
    pub fn connect_explorer(
        params: &ChainParams,
        config: &WalletConfig,
    ) -> Result<Arc<dyn ExplorerApi>, WalletSyncError> {
        let explorer = FailoverExplorer::from_endpoints(&params.explorers, &config.sync)?;
        Ok(Arc::new(explorer))
    }

    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    pub async fn chain_params(&self) -> ChainParams {
        self.params.read().await.clone()
    }

    pub fn database(&self) -> &Database {
        self.persistence.database()
    }

    /// Shared ledger handle, for callers that need several reads under one lock
    pub fn ledger(&self) -> &Arc<RwLock<Ledger>> {
        &self.ledger
    }

    pub fn driver(&self) -> &Arc<Mutex<SyncDriver>> {
        &self.driver
    }

    /// Current context generation; bumped on every account or network switch
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    async fn emit_balances(&self, balances: Balances) {
        self.events
            .dispatch(&WalletEvent::BalanceUpdated(balances))
            .await;
    }

    /// Replay persisted state and restore the collateral lock.
    pub async fn load_on_startup(&self) -> Result<bool, WalletSyncError> {
        let network = self.params.read().await.name;
        let (loaded, balances) = {
            let mut ledger = self.ledger.write().await;
            let loaded = self.persistence.load_on_startup(&mut ledger, network).await?;
            self.restore_collateral_lock_in(&mut ledger).await?;
            (loaded, ledger.balances())
        };
        self.emit_balances(balances).await;
        Ok(loaded)
    }

    /// Lock the stored masternode collateral, or forget it once spent.
    pub async fn restore_collateral_lock(&self) -> Result<Option<Outpoint>, WalletSyncError> {
        let mut ledger = self.ledger.write().await;
        self.restore_collateral_lock_in(&mut ledger).await
    }

    async fn restore_collateral_lock_in(
        &self,
        ledger: &mut Ledger,
    ) -> Result<Option<Outpoint>, WalletSyncError> {
        let db = self.persistence.database();
        let Some(masternode) = db.get_masternode().await? else {
            return Ok(None);
        };

        let outpoint = Outpoint::new(masternode.collateral_tx_id, masternode.output_index);
        if ledger.is_spent(&outpoint) {
            warn!("Masternode collateral {} was spent, removing it", outpoint);
            db.remove_masternode().await?;
            return Ok(None);
        }
        ledger.lock(outpoint.clone());
        Ok(Some(outpoint))
    }

    /// Record `outpoint` as the masternode collateral and lock it.
    pub async fn set_masternode(&self, outpoint: Outpoint) -> Result<(), WalletSyncError> {
        let masternode = Masternode {
            collateral_tx_id: outpoint.txid.clone(),
            output_index: outpoint.n,
        };
        self.persistence.database().add_masternode(&masternode).await?;
        self.lock_coin(outpoint).await;
        Ok(())
    }

    pub async fn full_sync(&self) -> Result<(), WalletSyncError> {
        self.driver.lock().await.full_sync().await
    }

    pub async fn poll(&self) -> Result<(), WalletSyncError> {
        self.driver.lock().await.poll_new_blocks().await
    }

    /// Start the background poll loop for this wallet.
    pub fn spawn_sync_loop(&self) -> SyncLoopHandle {
        spawn_sync_loop(
            self.driver.clone(),
            Duration::from_secs(self.config.sync.poll_interval_secs),
        )
    }

    pub async fn set_network_enabled(&self, enabled: bool) {
        let mut driver = self.driver.lock().await;
        if enabled {
            driver.enable().await;
        } else {
            driver.disable().await;
        }
    }

    pub async fn toggle_network(&self) -> bool {
        self.driver.lock().await.toggle().await
    }

    pub async fn balances(&self) -> Balances {
        self.ledger.read().await.balances()
    }

    pub async fn lock_coin(&self, outpoint: Outpoint) {
        let balances = {
            let mut ledger = self.ledger.write().await;
            ledger.lock(outpoint);
            ledger.balances()
        };
        self.emit_balances(balances).await;
    }

    pub async fn unlock_coin(&self, outpoint: &Outpoint) {
        let balances = {
            let mut ledger = self.ledger.write().await;
            ledger.unlock(outpoint);
            ledger.balances()
        };
        self.emit_balances(balances).await;
    }

    pub async fn select_utxos(
        &self,
        filter: UtxoState,
        target: Option<u64>,
        confirmed_only: bool,
        include_locked: bool,
    ) -> Vec<TxOut> {
        self.ledger
            .read()
            .await
            .select_utxos(filter, target, confirmed_only, include_locked)
    }

    pub async fn find_collateral_candidates(&self) -> Vec<(TxOut, String)> {
        let amount = self.params.read().await.collateral_amount;
        self.ledger.read().await.find_collateral_candidates(amount)
    }

    pub async fn history(&self) -> Vec<HistoricalTx> {
        let prefix = self.params.read().await.staking_address_prefix;
        self.ledger.read().await.history(prefix)
    }

    /// Next unused receive address and its path on `chain`
    pub async fn next_receive_address(&self, chain: u32) -> Option<(String, String)> {
        self.ledger
            .write()
            .await
            .resolver_mut()
            .next_receive_address(chain)
    }

    pub async fn broadcast(&self, raw_hex: &str) -> Result<String, WalletSyncError> {
        self.driver.lock().await.broadcast(raw_hex).await
    }

    pub async fn get_address_utxos(&self, key: &str) -> Result<Vec<RawUtxo>, WalletSyncError> {
        self.driver.lock().await.get_address_utxos(key).await
    }

    pub async fn settings(&self) -> Result<Settings, WalletSyncError> {
        Ok(self.persistence.database().get_settings().await?)
    }

    pub async fn update_settings(
        &self,
        update: SettingsUpdate,
    ) -> Result<Settings, WalletSyncError> {
        Ok(self.persistence.database().set_settings(update).await?)
    }

    /// Rebuild the wallet for other key material and replay its persisted state.
    ///
    /// Returns whether any stored transaction was loaded.
    pub async fn switch_account(
        &self,
        keys: Arc<dyn KeyProvider>,
    ) -> Result<bool, WalletSyncError> {
        {
            let params = self.params.read().await;
            let mut ledger = self.ledger.write().await;
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            ledger.replace_resolver(OwnershipResolver::new(keys, &params, self.config.gap_limit));
            ledger.reset();
            info!("Switched account (generation {})", generation);
        }
        self.load_on_startup().await
    }

    /// Rebuild the wallet for another network, keeping the key material.
    ///
    /// The stored account is bound to its network, so history saved on the previous network is
    /// discarded on replay and the store is rebound to the new one.
    pub async fn switch_network(
        &self,
        params: ChainParams,
        explorer: Arc<dyn ExplorerApi>,
    ) -> Result<bool, WalletSyncError> {
        {
            let mut current = self.params.write().await;
            let mut ledger = self.ledger.write().await;
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            let keys = ledger.resolver().key_provider().clone();
            ledger.set_chain_params(&params);
            ledger.replace_resolver(OwnershipResolver::new(keys, &params, self.config.gap_limit));
            ledger.reset();
            info!("Switched to {} (generation {})", params.name, generation);
            *current = params;
        }
        // Never held together with the ledger lock: an in-flight sync holds the driver while it
        // waits for the ledger.
        self.driver.lock().await.replace_explorer(explorer);
        self.load_on_startup().await
    }
}
