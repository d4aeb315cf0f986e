use crate::explorer::{AccountIdentity, ExplorerApi, ExplorerError};

use tracing::debug;

/// Trait for different page estimation strategies
#[async_trait::async_trait]
pub trait SyncStrategy: Send + Sync {
    /// How many pages of history to walk for a fetch starting at `from_height`.
    ///
    /// `known_txs` is the number of transactions already in the ledger.
    async fn total_pages(
        &self,
        explorer: &dyn ExplorerApi,
        identity: &AccountIdentity,
        from_height: u32,
        known_txs: usize,
        fully_synced: bool,
    ) -> Result<u32, ExplorerError>;

    /// Get the name of this strategy
    fn name(&self) -> &'static str;
}

/// Strategy that probes the explorer's reported transaction count.
///
/// Before the wallet is fully synced the count of unseen transactions sizes the walk. After it,
/// the probe still runs on every poll (at least one page is walked) unless disabled, in which
/// case a single page is assumed.
pub struct ProbedHistorySync {
    page_size: u32,
    probe_after_full_sync: bool,
}

impl ProbedHistorySync {
    pub fn new(page_size: u32, probe_after_full_sync: bool) -> Self {
        Self {
            page_size: page_size.max(1),
            probe_after_full_sync,
        }
    }

    fn pages_for(&self, unseen: u64) -> u32 {
        let pages = unseen.div_ceil(u64::from(self.page_size));
        u32::try_from(pages).unwrap_or(u32::MAX)
    }
}

#[async_trait::async_trait]
impl SyncStrategy for ProbedHistorySync {
    async fn total_pages(
        &self,
        explorer: &dyn ExplorerApi,
        identity: &AccountIdentity,
        from_height: u32,
        known_txs: usize,
        fully_synced: bool,
    ) -> Result<u32, ExplorerError> {
        if fully_synced && !self.probe_after_full_sync {
            return Ok(1);
        }

        let probe = explorer
            .get_transactions(identity, from_height, 1, 1)
            .await?;
        let unseen = probe.txs.saturating_sub(known_txs as u64);
        let pages = self.pages_for(unseen);
        debug!(
            "Explorer reports {} transactions ({} unseen), walking {} pages",
            probe.txs, unseen, pages
        );

        Ok(if fully_synced { pages.max(1) } else { pages })
    }

    fn name(&self) -> &'static str {
        "ProbedHistorySync"
    }
}

/// Strategy that always walks exactly one page.
pub struct SinglePageSync;

#[async_trait::async_trait]
impl SyncStrategy for SinglePageSync {
    async fn total_pages(
        &self,
        _explorer: &dyn ExplorerApi,
        _identity: &AccountIdentity,
        _from_height: u32,
        _known_txs: usize,
        _fully_synced: bool,
    ) -> Result<u32, ExplorerError> {
        Ok(1)
    }

    fn name(&self) -> &'static str {
        "SinglePageSync"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::explorer::{RawTransaction, RawUtxo, TxPage};

    struct CountingExplorer {
        txs: u64,
    }

    #[async_trait::async_trait]
    impl ExplorerApi for CountingExplorer {
        async fn get_chain_height(&self) -> Result<u32, ExplorerError> {
            Ok(0)
        }

        async fn get_transactions(
            &self,
            _identity: &AccountIdentity,
            _from_height: u32,
            page: u32,
            _page_size: u32,
        ) -> Result<TxPage, ExplorerError> {
            Ok(TxPage {
                page,
                total_pages: 0,
                txs: self.txs,
                transactions: Vec::new(),
            })
        }

        async fn get_transaction(
            &self,
            _txid: &str,
        ) -> Result<Option<RawTransaction>, ExplorerError> {
            Ok(None)
        }

        async fn broadcast(&self, _raw_hex: &str) -> Result<String, ExplorerError> {
            Err(ExplorerError::BroadcastRejected("unsupported".to_string()))
        }

        async fn get_address_utxos(&self, _key: &str) -> Result<Vec<RawUtxo>, ExplorerError> {
            Ok(Vec::new())
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    fn identity() -> AccountIdentity {
        AccountIdentity {
            export_key: "xpub".to_string(),
            hierarchical: true,
        }
    }

    #[tokio::test]
    async fn test_pages_from_unseen_count() {
        let explorer = CountingExplorer { txs: 2500 };
        let strategy = ProbedHistorySync::new(1000, true);

        let pages = strategy
            .total_pages(&explorer, &identity(), 0, 0, false)
            .await
            .unwrap();
        assert_eq!(pages, 3);

        let pages = strategy
            .total_pages(&explorer, &identity(), 0, 2000, false)
            .await
            .unwrap();
        assert_eq!(pages, 1);

        let pages = strategy
            .total_pages(&explorer, &identity(), 0, 2500, false)
            .await
            .unwrap();
        assert_eq!(pages, 0);
    }

    #[tokio::test]
    async fn test_fully_synced_walks_at_least_one_page() {
        let explorer = CountingExplorer { txs: 10 };
        let probed = ProbedHistorySync::new(5, true);
        let pages = probed
            .total_pages(&explorer, &identity(), 100, 10, true)
            .await
            .unwrap();
        assert_eq!(pages, 1);

        let pages = probed
            .total_pages(&explorer, &identity(), 100, 0, true)
            .await
            .unwrap();
        assert_eq!(pages, 2);

        let unprobed = ProbedHistorySync::new(5, false);
        let pages = unprobed
            .total_pages(&explorer, &identity(), 100, 0, true)
            .await
            .unwrap();
        assert_eq!(pages, 1);

        let pages = SinglePageSync
            .total_pages(&explorer, &identity(), 100, 0, false)
            .await
            .unwrap();
        assert_eq!(pages, 1);
    }
}
