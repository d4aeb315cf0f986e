//! Wallet Synchronization Module
//!
//! This module provides the services that keep the wallet ledger in step with a remote block explorer
//! and with its on-disk copy. It is composed of several submodules, each responsible for a specific aspect of the sync process:
//!
//! - `orchestrator`: The `SyncDriver`, which walks explorer history pages into the ledger and tracks the chain tip.
//! - `background`: The interval loop that polls for new blocks with skip-if-busy semantics.
//! - `events`: Defines the wallet notifications and the observer trait used to publish them.
//! - `progress_tracker`: Tracks pages and transactions processed and summarises a fetch.
//! - `repositories`: The record store and the typed account, transaction, settings and masternode records on top of it.
//! - `state_persistence`: Incremental saves and the identity-checked replay on startup.
//! - `strategies`: Pluggable estimation of how many history pages a fetch must walk.
//! - `transaction_processor`: Responsible for parsing explorer records into ledger transactions.

/// Interval polling loop
pub mod background;
/// Wallet notifications and observers
pub mod events;
/// Main coordinator for the wallet sync process
pub mod orchestrator;
/// Tracks synchronization progress and statistics
pub mod progress_tracker;
/// Record store and typed records
pub mod repositories;
/// Ledger save and replay
pub mod state_persistence;
/// Pluggable page estimation strategies
pub mod strategies;
/// Transaction parsing service
pub mod transaction_processor;

pub use orchestrator::*;
