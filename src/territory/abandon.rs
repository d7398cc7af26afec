//! Background sweep that reverts relinquished sites once their grace period ends.
//!
//! The worker only decides *when* to look; [`TerritoryService::run_due_abandonments`]
//! decides what is due and re-validates each job under the territory lock.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{debug, info};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::{BuildSite, TerritoryService};

/// Outcome of one sweep.
#[derive(Debug, Clone, Default)]
pub struct AbandonReport {
    /// Sites that reverted to unowned, in their reset state.
    pub released: Vec<BuildSite>,
    /// Due jobs whose relinquish had been cancelled or superseded.
    pub skipped: usize,
}

impl AbandonReport {
    pub fn is_empty(&self) -> bool {
        self.released.is_empty() && self.skipped == 0
    }
}

pub struct AbandonWorker {
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl AbandonWorker {
    /// Stop the sweep loop and wait for it to exit.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = self.handle.await;
    }
}

/// Spawn the sweep loop on the current tokio runtime.
pub fn spawn_abandon_worker(territory: Arc<TerritoryService>, poll: Duration) -> AbandonWorker {
    let (tx, mut rx) = oneshot::channel::<()>();
    let poll = poll.max(Duration::from_millis(1));
    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(poll);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!("abandon worker started (poll {:?})", poll);
        loop {
            tokio::select! {
                _ = &mut rx => break,
                _ = ticker.tick() => {
                    let report = territory.run_due_abandonments(Utc::now());
                    if !report.is_empty() {
                        debug!(
                            "abandon sweep: {} released, {} skipped",
                            report.released.len(),
                            report.skipped
                        );
                    }
                }
            }
        }
        info!("abandon worker stopped");
    });
    AbandonWorker {
        shutdown: Some(tx),
        handle,
    }
}
