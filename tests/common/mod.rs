#![allow(dead_code)]

use aipg_state_sync::config::WalletConfig;
use aipg_state_sync::explorer::{
    AccountIdentity, ExplorerApi, ExplorerError, RawTransaction, RawUtxo, RawVin, RawVout, TxPage,
};
use aipg_state_sync::wallet::WalletContext;
use aipg_state_sync::wallet::ownership::KeyProvider;
use aipg_state_sync::wallet::script;
use aipg_state_sync::wallet::sync::events::{ChannelEventHandler, EventDispatcher, WalletEvent};
use aipg_state_sync::wallet::sync::repositories::RecordStore;

use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{Notify, mpsc};

/// Key provider deriving addresses from `sha256(identity || path)`
pub struct FakeKeys {
    identity: String,
}

impl FakeKeys {
    pub fn new(identity: &str) -> Arc<Self> {
        Arc::new(Self {
            identity: identity.to_string(),
        })
    }

    /// P2PKH script paying the external address at `index`
    pub fn receive_script(&self, index: u32) -> Vec<u8> {
        script::p2pkh_script(&self.receive_hash(index))
    }

    /// P2CS script delegating to a foreign staker, owned by the external address at `index`
    pub fn cold_script(&self, index: u32) -> Vec<u8> {
        script::p2cs_script(&[0x22; 20], &self.receive_hash(index))
    }

    fn receive_hash(&self, index: u32) -> [u8; 20] {
        let address = self.derive_address(&format!("m/44'/2686'/0'/0/{}", index));
        let (_, hash) = script::decode_address(&address).unwrap();
        hash
    }
}

impl KeyProvider for FakeKeys {
    fn derive_address(&self, path: &str) -> String {
        let digest = Sha256::digest(format!("{}{}", self.identity, path).as_bytes());
        script::encode_address(23, &digest[..20])
    }

    fn identity_export_key(&self) -> String {
        self.identity.clone()
    }

    fn is_hierarchical(&self) -> bool {
        true
    }
}

/// Funding txid outside the wallet's history
pub const EXTERNAL: &str = "eeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee";

pub fn foreign_script() -> Vec<u8> {
    script::p2pkh_script(&[0x11; 20])
}

/// Explorer record builder
pub fn raw_tx(
    txid: &str,
    height: Option<u32>,
    inputs: &[(&str, u32)],
    outputs: &[(Vec<u8>, u64)],
) -> RawTransaction {
    RawTransaction {
        txid: txid.to_string(),
        block_height: height.map_or(-1, i64::from),
        vin: inputs
            .iter()
            .map(|(prev, n)| RawVin {
                txid: Some(prev.to_string()),
                vout: *n,
                hex: Some("00".to_string()),
            })
            .collect(),
        vout: outputs
            .iter()
            .enumerate()
            .map(|(n, (script, value))| RawVout {
                value: value.to_string(),
                n: n as u32,
                hex: Some(hex::encode(script)),
            })
            .collect(),
        block_time: height.map(|h| 1_700_000_000 + i64::from(h) * 60),
    }
}

/// Explorer record of a coinbase paying `outputs`
pub fn coinbase_tx(txid: &str, height: u32, outputs: &[(Vec<u8>, u64)]) -> RawTransaction {
    let mut tx = raw_tx(txid, Some(height), &[], outputs);
    tx.vin.push(RawVin {
        txid: None,
        vout: 0,
        hex: Some("00".to_string()),
    });
    tx
}

pub fn txid(byte: u8) -> String {
    hex::encode([byte; 32])
}

/// In-process explorer serving a fixed history, newest first like Blockbook
#[derive(Default)]
pub struct FakeExplorer {
    pub height: AtomicU32,
    pub failing: AtomicBool,
    pub reject_broadcast: AtomicBool,
    txs: Mutex<Vec<RawTransaction>>,
    /// `(page, page_size)` of every history request, probes included
    pub requests: Mutex<Vec<(u32, u32)>>,
    /// `from_height` of every history request
    pub from_heights: Mutex<Vec<u32>>,
    pause: Mutex<Option<(Arc<Notify>, Arc<Notify>)>>,
}

impl FakeExplorer {
    pub fn new(height: u32, txs: Vec<RawTransaction>) -> Arc<Self> {
        let explorer = Self::default();
        explorer.height.store(height, Ordering::SeqCst);
        *explorer.txs.lock().unwrap() = txs;
        Arc::new(explorer)
    }

    pub fn push_tx(&self, tx: RawTransaction) {
        self.txs.lock().unwrap().push(tx);
    }

    pub fn set_height(&self, height: u32) {
        self.height.store(height, Ordering::SeqCst);
    }

    /// Make the next history request wait. Returns `(entered, release)`.
    pub fn pause_next_request(&self) -> (Arc<Notify>, Arc<Notify>) {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        *self.pause.lock().unwrap() = Some((entered.clone(), release.clone()));
        (entered, release)
    }

    /// Page sizes other than the one-transaction probe
    pub fn page_requests(&self) -> Vec<u32> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, size)| *size > 1)
            .map(|(page, _)| *page)
            .collect()
    }

    fn check(&self) -> Result<(), ExplorerError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(ExplorerError::StatusError(503))
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl ExplorerApi for FakeExplorer {
    async fn get_chain_height(&self) -> Result<u32, ExplorerError> {
        self.check()?;
        Ok(self.height.load(Ordering::SeqCst))
    }

    async fn get_transactions(
        &self,
        _identity: &AccountIdentity,
        from_height: u32,
        page: u32,
        page_size: u32,
    ) -> Result<TxPage, ExplorerError> {
        self.check()?;
        let pause = self.pause.lock().unwrap().take();
        if let Some((entered, release)) = pause {
            entered.notify_one();
            release.notified().await;
        }
        self.requests.lock().unwrap().push((page, page_size));
        self.from_heights.lock().unwrap().push(from_height);

        let all = self.txs.lock().unwrap().clone();
        let total = all.len() as u64;
        let mut matching: Vec<RawTransaction> = all
            .into_iter()
            .filter(|tx| tx.block_height < 0 || tx.block_height >= i64::from(from_height))
            .collect();
        matching.sort_by_key(|tx| {
            std::cmp::Reverse(if tx.block_height < 0 { i64::MAX } else { tx.block_height })
        });

        let size = page_size.max(1) as usize;
        let total_pages = matching.len().div_ceil(size) as u32;
        let transactions = matching
            .into_iter()
            .skip((page.saturating_sub(1) as usize) * size)
            .take(size)
            .collect();

        Ok(TxPage {
            page,
            total_pages,
            txs: total,
            transactions,
        })
    }

    async fn get_transaction(&self, txid: &str) -> Result<Option<RawTransaction>, ExplorerError> {
        self.check()?;
        Ok(self
            .txs
            .lock()
            .unwrap()
            .iter()
            .find(|tx| tx.txid == txid)
            .cloned())
    }

    async fn broadcast(&self, raw_hex: &str) -> Result<String, ExplorerError> {
        self.check()?;
        if self.reject_broadcast.load(Ordering::SeqCst) {
            return Err(ExplorerError::BroadcastRejected("bad-txns-inputs-spent".to_string()));
        }
        Ok(hex::encode(Sha256::digest(raw_hex.as_bytes())))
    }

    async fn get_address_utxos(&self, _key: &str) -> Result<Vec<RawUtxo>, ExplorerError> {
        self.check()?;
        Ok(Vec::new())
    }

    fn name(&self) -> &str {
        "fake"
    }
}

pub fn test_config(page_size: u32) -> WalletConfig {
    let mut config = WalletConfig::default();
    config.sync.page_size = page_size;
    config.sync.max_retries = 1;
    config.sync.retry_initial_interval_ms = 1;
    config
}

pub fn open_wallet(
    config: WalletConfig,
    keys: Arc<dyn KeyProvider>,
    explorer: Arc<dyn ExplorerApi>,
    store: Arc<dyn RecordStore>,
) -> (WalletContext, mpsc::UnboundedReceiver<WalletEvent>) {
    let (channel, receiver) = ChannelEventHandler::channel();
    let mut events = EventDispatcher::new();
    events.register_handler(Box::new(channel));
    let context = WalletContext::open(config, keys, explorer, store, events).unwrap();
    (context, receiver)
}

pub fn drain(receiver: &mut mpsc::UnboundedReceiver<WalletEvent>) -> Vec<WalletEvent> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    events
}
