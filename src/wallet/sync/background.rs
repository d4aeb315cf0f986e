//! Background polling loop.
//!
//! Every tick either finishes the initial sync or polls for new blocks. A tick that finds the
//! driver busy (a manual sync, or a poll that outlived its interval) is skipped rather than queued.

use crate::wallet::sync::orchestrator::{SyncDriver, SyncState};

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Handle to a running sync loop
pub struct SyncLoopHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SyncLoopHandle {
    /// Stop the loop and wait for the current tick to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            error!("Sync loop terminated abnormally: {}", e);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Run one tick against the driver, unless it is busy or disabled.
///
/// Returns whether the tick actually ran.
pub async fn run_tick(driver: &Mutex<SyncDriver>) -> bool {
    let Ok(mut driver) = driver.try_lock() else {
        debug!("Sync still in flight, skipping tick");
        return false;
    };
    if !driver.is_enabled() {
        return false;
    }

    let result = if driver.state() == SyncState::FullySynced {
        driver.poll_new_blocks().await
    } else {
        driver.full_sync().await
    };
    if let Err(e) = result {
        warn!("Background sync failed: {}", e);
    }
    true
}

/// Spawn the polling loop on the current runtime.
pub fn spawn_sync_loop(driver: Arc<Mutex<SyncDriver>>, poll_interval: Duration) -> SyncLoopHandle {
    let (shutdown, mut shutdown_rx) = watch::channel(false);

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("Sync loop started, polling every {:?}", poll_interval);

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => break,
                _ = ticker.tick() => {
                    run_tick(&driver).await;
                }
            }
        }

        info!("Sync loop stopped");
    });

    SyncLoopHandle { shutdown, task }
}
