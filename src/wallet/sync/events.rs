//! Event system for the wallet.
//!
//! This module defines the notifications the wallet emits outward, the handler trait observers
//! implement, and the dispatcher that fans events out to every registered handler. The core never
//! depends on a handler being present: dispatching to an empty dispatcher is a no-op.

use crate::wallet::ledger::Balances;
use crate::wallet::types::WalletSyncError;

use tokio::sync::mpsc;

/// Notifications emitted by the wallet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletEvent {
    /// Cached balances changed
    BalanceUpdated(Balances),
    /// The chain tip moved
    NewBlock { new_height: u32, old_height: u32 },
    /// Progress of a history fetch; `done` is sent once after a full sync
    SyncProgress {
        current_page: u32,
        total_pages: u32,
        done: bool,
    },
    /// Outcome of a broadcast: the txid on success, the error text otherwise
    TransactionBroadcast { success: bool, result: String },
    /// Remote calls were enabled or disabled
    NetworkToggled { enabled: bool },
}

/// Trait for handling wallet events.
#[async_trait::async_trait]
pub trait WalletEventHandler: Send + Sync {
    /// Handle a wallet event.
    async fn handle(&self, event: &WalletEvent) -> Result<(), WalletSyncError>;

    /// Get the name of this handler for logging and diagnostics.
    fn name(&self) -> &'static str;
}

/// Event dispatcher that manages multiple event handlers.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: Vec<Box<dyn WalletEventHandler>>,
}

impl EventDispatcher {
    /// Create a new, empty event dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new event handler.
    ///
    /// Handlers are called in the order they are registered.
    pub fn register_handler(&mut self, handler: Box<dyn WalletEventHandler>) {
        self.handlers.push(handler);
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Dispatch an event to all registered handlers.
    ///
    /// Errors from handlers are logged, but do not stop other handlers from running.
    pub async fn dispatch(&self, event: &WalletEvent) {
        for handler in &self.handlers {
            if let Err(e) = handler.handle(event).await {
                tracing::error!("Handler {} failed to process event: {}", handler.name(), e);
            }
        }
    }
}

/// Forwards events into an unbounded channel
pub struct ChannelEventHandler {
    sender: mpsc::UnboundedSender<WalletEvent>,
}

impl ChannelEventHandler {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<WalletEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait::async_trait]
impl WalletEventHandler for ChannelEventHandler {
    async fn handle(&self, event: &WalletEvent) -> Result<(), WalletSyncError> {
        // A dropped receiver just means nobody is listening any more
        let _ = self.sender.send(event.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "ChannelEventHandler"
    }
}

/// Logs every event through tracing
pub struct LoggingEventHandler;

#[async_trait::async_trait]
impl WalletEventHandler for LoggingEventHandler {
    async fn handle(&self, event: &WalletEvent) -> Result<(), WalletSyncError> {
        match event {
            WalletEvent::SyncProgress {
                current_page,
                total_pages,
                done: false,
            } => tracing::info!("Sync progress: page {}/{}", current_page, total_pages),
            WalletEvent::SyncProgress { done: true, .. } => tracing::info!("Sync finished"),
            other => tracing::debug!("Wallet event: {:?}", other),
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "LoggingEventHandler"
    }
}
