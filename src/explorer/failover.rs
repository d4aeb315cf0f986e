//!
//! Failover across explorer endpoints.
//!
//! Every call goes to the current endpoint. On failure the wrapper rotates round-robin to the
//! next endpoint and tries again, at most once per endpoint. Idempotent reads are additionally
//! retried with exponential backoff against a single endpoint before it is given up on.

use super::api::{AccountIdentity, ExplorerApi};
use super::types::{ExplorerError, RawTransaction, RawUtxo, TxPage};
use super::client::BlockbookClient;
use crate::config::{Endpoint, SyncConfig};

use backoff::ExponentialBackoffBuilder;
use backoff::future::retry;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

pub struct FailoverExplorer {
    endpoints: Vec<Arc<dyn ExplorerApi>>,
    current: AtomicUsize,
    auto_switch: AtomicBool,
    max_retries: u32,
    retry_initial_interval: Duration,
}

impl FailoverExplorer {
    pub fn new(
        endpoints: Vec<Arc<dyn ExplorerApi>>,
        config: &SyncConfig,
    ) -> Result<Self, ExplorerError> {
        if endpoints.is_empty() {
            return Err(ExplorerError::NoEndpoints);
        }
        Ok(Self {
            endpoints,
            current: AtomicUsize::new(0),
            auto_switch: AtomicBool::new(config.auto_switch),
            max_retries: config.max_retries.max(1),
            retry_initial_interval: Duration::from_millis(config.retry_initial_interval_ms),
        })
    }

    /// Build a Blockbook client per endpoint.
    pub fn from_endpoints(
        endpoints: &[Endpoint],
        config: &SyncConfig,
    ) -> Result<Self, ExplorerError> {
        let clients = endpoints
            .iter()
            .map(|endpoint| {
                BlockbookClient::new(endpoint)
                    .map(|client| Arc::new(client) as Arc<dyn ExplorerApi>)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(clients, config)
    }

    pub fn set_auto_switch(&self, enabled: bool) {
        self.auto_switch.store(enabled, Ordering::SeqCst);
    }

    /// Index of the endpoint the next call goes to
    pub fn current_index(&self) -> usize {
        self.current.load(Ordering::SeqCst) % self.endpoints.len()
    }

    fn current_endpoint(&self) -> &Arc<dyn ExplorerApi> {
        &self.endpoints[self.current_index()]
    }

    fn rotate(&self) {
        let next = (self.current_index() + 1) % self.endpoints.len();
        self.current.store(next, Ordering::SeqCst);
        debug!("Switched explorer to {}", self.endpoints[next].name());
    }

    /// Retry `op` against one endpoint with exponential backoff, up to `max_retries` attempts.
    async fn with_backoff<T, F, Fut>(
        &self,
        endpoint: &Arc<dyn ExplorerApi>,
        op: &F,
    ) -> Result<T, ExplorerError>
    where
        F: Fn(Arc<dyn ExplorerApi>) -> Fut,
        Fut: Future<Output = Result<T, ExplorerError>>,
    {
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(self.retry_initial_interval)
            .with_max_elapsed_time(None)
            .build();
        let max_retries = self.max_retries;
        let mut attempts = 0u32;

        retry(policy, || {
            attempts += 1;
            let attempt = attempts;
            let call = op(endpoint.clone());
            async move {
                call.await.map_err(|e| {
                    if attempt >= max_retries || !e.is_transient() {
                        backoff::Error::permanent(e)
                    } else {
                        debug!("Attempt {} on {} failed: {}", attempt, endpoint.name(), e);
                        backoff::Error::transient(e)
                    }
                })
            }
        })
        .await
    }

    /// Run `op` with rotation across endpoints.
    async fn call<T, F, Fut>(&self, idempotent: bool, op: F) -> Result<T, ExplorerError>
    where
        F: Fn(Arc<dyn ExplorerApi>) -> Fut,
        Fut: Future<Output = Result<T, ExplorerError>>,
    {
        let mut last_error = None;

        for _ in 0..self.endpoints.len() {
            let endpoint = self.current_endpoint().clone();
            let result = if idempotent {
                self.with_backoff(&endpoint, &op).await
            } else {
                op(endpoint.clone()).await
            };

            match result {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => {
                    warn!("Explorer {} failed: {}", endpoint.name(), e);
                    if !self.auto_switch.load(Ordering::SeqCst) {
                        return Err(e);
                    }
                    self.rotate();
                    last_error = Some(e);
                }
            }
        }

        Err(ExplorerError::Exhausted(Box::new(
            last_error.unwrap_or(ExplorerError::NoEndpoints),
        )))
    }
}

#[async_trait::async_trait]
impl ExplorerApi for FailoverExplorer {
    async fn get_chain_height(&self) -> Result<u32, ExplorerError> {
        self.call(true, |e| async move { e.get_chain_height().await })
            .await
    }

    async fn get_transactions(
        &self,
        identity: &AccountIdentity,
        from_height: u32,
        page: u32,
        page_size: u32,
    ) -> Result<TxPage, ExplorerError> {
        self.call(true, |e| async move {
            e.get_transactions(identity, from_height, page, page_size)
                .await
        })
        .await
    }

    async fn get_transaction(&self, txid: &str) -> Result<Option<RawTransaction>, ExplorerError> {
        self.call(true, |e| async move { e.get_transaction(txid).await })
            .await
    }

    async fn broadcast(&self, raw_hex: &str) -> Result<String, ExplorerError> {
        self.call(false, |e| async move { e.broadcast(raw_hex).await })
            .await
    }

    async fn get_address_utxos(&self, key: &str) -> Result<Vec<RawUtxo>, ExplorerError> {
        self.call(true, |e| async move { e.get_address_utxos(key).await })
            .await
    }

    fn name(&self) -> &str {
        self.current_endpoint().name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    /// Endpoint that fails its first `failures` chain-height calls
    struct Flaky {
        name: String,
        failures: u32,
        calls: AtomicU32,
    }

    impl Flaky {
        fn new(name: &str, failures: u32) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                failures,
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait::async_trait]
    impl ExplorerApi for Flaky {
        async fn get_chain_height(&self) -> Result<u32, ExplorerError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(ExplorerError::StatusError(500))
            } else {
                Ok(100)
            }
        }

        async fn get_transactions(
            &self,
            _identity: &AccountIdentity,
            _from_height: u32,
            _page: u32,
            _page_size: u32,
        ) -> Result<TxPage, ExplorerError> {
            Ok(TxPage::default())
        }

        async fn get_transaction(
            &self,
            _txid: &str,
        ) -> Result<Option<RawTransaction>, ExplorerError> {
            Ok(None)
        }

        async fn broadcast(&self, _raw_hex: &str) -> Result<String, ExplorerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(ExplorerError::StatusError(502))
        }

        async fn get_address_utxos(&self, _key: &str) -> Result<Vec<RawUtxo>, ExplorerError> {
            Ok(Vec::new())
        }

        fn name(&self) -> &str {
            &self.name
        }
    }

    fn config(max_retries: u32, auto_switch: bool) -> SyncConfig {
        SyncConfig {
            max_retries,
            auto_switch,
            retry_initial_interval_ms: 1,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_retries_single_endpoint() {
        let flaky = Flaky::new("a", 2);
        let explorer = FailoverExplorer::new(vec![flaky.clone()], &config(5, true)).unwrap();
        assert_eq!(explorer.get_chain_height().await.unwrap(), 100);
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_rotates_after_retries_exhausted() {
        let dead = Flaky::new("dead", u32::MAX);
        let alive = Flaky::new("alive", 0);
        let explorer =
            FailoverExplorer::new(vec![dead.clone(), alive.clone()], &config(3, true)).unwrap();

        assert_eq!(explorer.get_chain_height().await.unwrap(), 100);
        assert_eq!(dead.calls.load(Ordering::SeqCst), 3);
        assert_eq!(explorer.current_index(), 1);
        assert_eq!(explorer.name(), "alive");
    }

    #[tokio::test]
    async fn test_no_auto_switch_surfaces_first_failure() {
        let dead = Flaky::new("dead", u32::MAX);
        let alive = Flaky::new("alive", 0);
        let explorer =
            FailoverExplorer::new(vec![dead.clone(), alive.clone()], &config(1, false)).unwrap();

        assert!(matches!(
            explorer.get_chain_height().await,
            Err(ExplorerError::StatusError(500))
        ));
        assert_eq!(alive.calls.load(Ordering::SeqCst), 0);
        assert_eq!(explorer.current_index(), 0);
    }

    #[tokio::test]
    async fn test_broadcast_tries_each_endpoint_once() {
        let a = Flaky::new("a", 0);
        let b = Flaky::new("b", 0);
        let explorer = FailoverExplorer::new(vec![a.clone(), b.clone()], &config(5, true)).unwrap();

        assert!(matches!(
            explorer.broadcast("00").await,
            Err(ExplorerError::Exhausted(_))
        ));
        assert_eq!(a.calls.load(Ordering::SeqCst), 1);
        assert_eq!(b.calls.load(Ordering::SeqCst), 1);
        // Rotated once per endpoint, back at the start
        assert_eq!(explorer.current_index(), 0);
    }

    #[test]
    fn test_requires_endpoints() {
        assert!(matches!(
            FailoverExplorer::new(Vec::new(), &SyncConfig::default()),
            Err(ExplorerError::NoEndpoints)
        ));
    }
}
