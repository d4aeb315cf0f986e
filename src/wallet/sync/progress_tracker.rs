//! Progress tracking for history fetches.
//!
//! This module provides the `SyncProgressTracker`, which records how many pages and transactions
//! a fetch has processed and the highest block height seen, and summarises them once the fetch
//! completes.

use tracing::info;

/// Service for tracking synchronization progress
#[derive(Debug, Clone)]
pub struct SyncProgressTracker {
    /// Height the fetch resumed from
    start_height: u32,
    /// Pages the fetch expects to process
    total_pages: u32,
    /// Pages processed so far
    pages_fetched: u32,
    /// Transactions returned by the explorer
    transactions_seen: usize,
    /// Transactions actually merged into the ledger
    transactions_merged: usize,
    /// Highest confirmed block height seen in any page
    highest_height: u32,
}

impl SyncProgressTracker {
    /// Create a new progress tracker for a fetch starting at the given height.
    pub fn new(start_height: u32, total_pages: u32) -> Self {
        Self {
            start_height,
            total_pages,
            pages_fetched: 0,
            transactions_seen: 0,
            transactions_merged: 0,
            highest_height: start_height,
        }
    }

    /// Record a processed page
    pub fn record_page(&mut self, seen: usize, merged: usize, highest_height: Option<u32>) {
        self.pages_fetched += 1;
        self.transactions_seen += seen;
        self.transactions_merged += merged;
        if let Some(height) = highest_height {
            self.highest_height = self.highest_height.max(height);
        }
    }

    /// Pages processed so far, 1-based page number of the last one
    pub fn current_page(&self) -> u32 {
        self.pages_fetched
    }

    pub fn total_pages(&self) -> u32 {
        self.total_pages
    }

    pub fn is_complete(&self) -> bool {
        self.pages_fetched >= self.total_pages
    }

    pub fn log_progress(&self) {
        info!(
            "Sync progress: page {}/{}, {} transactions merged",
            self.pages_fetched, self.total_pages, self.transactions_merged
        );
    }

    /// Get sync statistics as a SyncStats struct
    pub fn get_stats(&self) -> SyncStats {
        SyncStats {
            start_height: self.start_height,
            highest_height: self.highest_height,
            pages_fetched: self.pages_fetched,
            transactions_seen: self.transactions_seen,
            transactions_merged: self.transactions_merged,
        }
    }
}

/// Statistics about a completed fetch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub start_height: u32,
    pub highest_height: u32,
    pub pages_fetched: u32,
    pub transactions_seen: usize,
    pub transactions_merged: usize,
}

impl SyncStats {
    /// Get a human-readable summary of the sync statistics
    pub fn summary(&self) -> String {
        format!(
            "Sync from {} to {}: {} pages, {} transactions ({} new)",
            self.start_height,
            self.highest_height,
            self.pages_fetched,
            self.transactions_seen,
            self.transactions_merged
        )
    }
}
