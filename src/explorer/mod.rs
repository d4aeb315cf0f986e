//! Remote data-source integration.
//!
//! The wallet reads chain state from Blockbook-compatible REST explorers. This module provides
//! the `ExplorerApi` seam, the HTTP client, and a failover wrapper that rotates across the
//! configured endpoints.

/// Data-source trait consumed by the sync driver
mod api;
/// HTTP client for Blockbook explorers
mod client;
/// Round-robin failover and per-endpoint retry
mod failover;
/// Raw explorer records and errors
mod types;

pub use api::{AccountIdentity, ExplorerApi, is_txid};
pub use client::BlockbookClient;
pub use failover::FailoverExplorer;
pub use types::*;
