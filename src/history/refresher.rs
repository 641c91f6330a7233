//! Periodic history refresh as an owned background task.

use super::Snapshot;
use crate::client::AnalysisApi;
use crate::error::ApiResult;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

/// Fetches history on a fixed period and hands snapshots to the owner.
///
/// The first fetch happens immediately. A fetch is never started while the
/// previous snapshot is still unconsumed. Dropping the refresher stops it.
pub struct HistoryRefresher {
    handle: JoinHandle<()>,
    snapshots: mpsc::Receiver<ApiResult<Snapshot>>,
}

impl HistoryRefresher {
    pub fn spawn(api: Arc<dyn AnalysisApi>, period: Duration) -> Self {
        let (tx, snapshots) = mpsc::channel(1);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let started = Instant::now();
                let outcome = api
                    .list_history()
                    .await
                    .map(|entries| Snapshot { started, entries });
                if tx.send(outcome).await.is_err() {
                    debug!("History refresher owner went away");
                    break;
                }
            }
        });

        Self { handle, snapshots }
    }

    /// Next refresh outcome; `None` once stopped.
    pub async fn next(&mut self) -> Option<ApiResult<Snapshot>> {
        self.snapshots.recv().await
    }

    pub fn stop(&mut self) {
        self.handle.abort();
        self.snapshots.close();
    }
}

impl Drop for HistoryRefresher {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
