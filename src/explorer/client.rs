//!
//! REST client for Blockbook-compatible explorers.
//!
//! This module provides an async client for the subset of the Blockbook v2 API the wallet needs:
//! chain tip, paged account history, single transaction lookup, broadcast and UTXO listing.
//! All methods are async and designed for use with Tokio.

use super::api::{AccountIdentity, ExplorerApi, is_txid};
use super::types::*;
use crate::config::Endpoint;

use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, info};

/// Blockbook explorer client
#[derive(Clone)]
pub struct BlockbookClient {
    /// The underlying HTTP client.
    http_client: Client,
    /// Human readable endpoint name
    name: String,
    /// Base URL, without trailing slash
    base_url: String,
}

impl BlockbookClient {
    /// Create a new explorer client.
    ///
    /// # Arguments
    /// * `endpoint` - The explorer name and base URL.
    ///
    /// # Returns
    /// A new `BlockbookClient`, or an `ExplorerError` if the HTTP client cannot be built.
    pub fn new(endpoint: &Endpoint) -> Result<Self, ExplorerError> {
        let http_client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(Self {
            http_client,
            name: endpoint.name.clone(),
            base_url: endpoint.url.trim_end_matches('/').to_string(),
        })
    }

    fn account_root(&self, identity: &AccountIdentity) -> String {
        let kind = if identity.hierarchical {
            "xpub"
        } else {
            "address"
        };
        format!("{}/api/v2/{}/{}", self.base_url, kind, identity.export_key)
    }

    /// GET a JSON document, mapping non-success statuses to `StatusError`.
    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, ExplorerError> {
        debug!("GET {} {:?}", url, query);
        let response = self.http_client.get(url).query(query).send().await?;

        if !response.status().is_success() {
            return Err(ExplorerError::StatusError(response.status().as_u16()));
        }

        Ok(response.json().await?)
    }
}

#[async_trait::async_trait]
impl ExplorerApi for BlockbookClient {
    async fn get_chain_height(&self) -> Result<u32, ExplorerError> {
        let info: ChainInfo = self
            .get_json(&format!("{}/api/v2/api", self.base_url), &[])
            .await?;
        Ok(info.backend.blocks)
    }

    async fn get_transactions(
        &self,
        identity: &AccountIdentity,
        from_height: u32,
        page: u32,
        page_size: u32,
    ) -> Result<TxPage, ExplorerError> {
        let query = [
            ("details", "txs".to_string()),
            ("from", from_height.to_string()),
            ("page", page.to_string()),
            ("pageSize", page_size.to_string()),
        ];
        self.get_json(&self.account_root(identity), &query).await
    }

    async fn get_transaction(&self, txid: &str) -> Result<Option<RawTransaction>, ExplorerError> {
        let url = format!("{}/api/v2/tx/{}", self.base_url, txid);
        let response = self.http_client.get(&url).send().await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.json().await?)),
            status => Err(ExplorerError::StatusError(status.as_u16())),
        }
    }

    async fn broadcast(&self, raw_hex: &str) -> Result<String, ExplorerError> {
        let url = format!("{}/api/v2/sendtx/", self.base_url);
        let response = self
            .http_client
            .post(&url)
            .header("Content-Type", "text/plain")
            .body(raw_hex.to_string())
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        // Blockbook reports node rejections as a JSON error body, often with a 400 status
        let parsed: Result<SendTxResponse, _> = serde_json::from_str(&body);
        if let Ok(SendTxResponse {
            error: Some(error), ..
        }) = &parsed
        {
            return Err(ExplorerError::BroadcastRejected(error.message.clone()));
        }
        if !status.is_success() {
            return Err(ExplorerError::StatusError(status.as_u16()));
        }

        match parsed?.result {
            Some(txid) if is_txid(&txid) => {
                info!("Broadcast accepted by {}: {}", self.name, txid);
                Ok(txid)
            }
            other => Err(ExplorerError::InvalidResponse(format!(
                "sendtx returned {:?}",
                other
            ))),
        }
    }

    async fn get_address_utxos(&self, key: &str) -> Result<Vec<RawUtxo>, ExplorerError> {
        self.get_json(&format!("{}/api/v2/utxo/{}", self.base_url, key), &[])
            .await
    }

    fn name(&self) -> &str {
        &self.name
    }
}
