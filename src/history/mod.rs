//! History collection and its reconciliation with the backend.
//!
//! The local list is replaced wholesale by each server snapshot. Deletes and
//! clears are applied optimistically; failures roll the change back and
//! re-fetch. Snapshots that started before the last confirmed local change
//! are discarded so a slow refresh cannot resurrect deleted entries.

pub mod refresher;

pub use refresher::HistoryRefresher;

use crate::client::AnalysisApi;
use crate::error::{ApiResult, WatchdogError, EMPTY_FILE_MESSAGE, EMPTY_TEXT_MESSAGE};
use crate::models::{AnalysisId, AnalysisRequest};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// A server history listing and the moment its fetch started.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub started: Instant,
    pub entries: Vec<AnalysisRequest>,
}

/// Locally held history, owned by a single writer.
#[derive(Debug)]
pub struct History {
    entries: Vec<AnalysisRequest>,
    /// Deletes sent but not yet confirmed.
    pending_deletes: HashSet<AnalysisId>,
    /// Snapshots whose fetch started before this instant are stale.
    stale_before: Option<Instant>,
    alert_threshold: u8,
    last_error: Option<WatchdogError>,
    refreshed_at: Option<DateTime<Utc>>,
}

impl History {
    pub fn new(alert_threshold: u8) -> Self {
        Self {
            entries: Vec::new(),
            pending_deletes: HashSet::new(),
            stale_before: None,
            alert_threshold,
            last_error: None,
            refreshed_at: None,
        }
    }

    pub fn entries(&self) -> &[AnalysisRequest] {
        &self.entries
    }

    /// Completed entries at or above the alert threshold, in history order.
    pub fn alerts(&self) -> Vec<&AnalysisRequest> {
        self.entries
            .iter()
            .filter(|e| e.is_alert(self.alert_threshold))
            .collect()
    }

    pub fn alert_threshold(&self) -> u8 {
        self.alert_threshold
    }

    /// The last error surfaced by an operation, cleared by a good refresh.
    pub fn last_error(&self) -> Option<&WatchdogError> {
        self.last_error.as_ref()
    }

    pub fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.refreshed_at
    }

    /// Replace local state with a server snapshot.
    ///
    /// Returns `false` if the snapshot was discarded as stale.
    pub fn apply_snapshot(&mut self, snapshot: Snapshot) -> bool {
        if let Some(barrier) = self.stale_before {
            if snapshot.started < barrier {
                debug!("Discarding history snapshot older than the last local change");
                return false;
            }
        }

        let resolved: HashMap<AnalysisId, AnalysisRequest> = std::mem::take(&mut self.entries)
            .into_iter()
            .filter(|e| e.status.is_terminal())
            .map(|e| (e.id.clone(), e))
            .collect();

        let mut entries = Vec::with_capacity(snapshot.entries.len());
        for incoming in snapshot.entries {
            if self.pending_deletes.contains(&incoming.id) {
                continue;
            }
            match resolved.get(&incoming.id) {
                // Resolved entries never change again
                Some(local) => {
                    if local.status != incoming.status {
                        warn!(
                            "Server reports {} as {} but it already resolved as {}",
                            incoming.id, incoming.status, local.status
                        );
                    }
                    entries.push(local.clone());
                }
                None => entries.push(incoming),
            }
        }

        debug!("History refreshed: {} entries", entries.len());
        self.entries = entries;
        self.refreshed_at = Some(Utc::now());
        self.last_error = None;
        true
    }

    /// Apply the outcome of a background refresh.
    pub fn apply_refresh(&mut self, outcome: ApiResult<Snapshot>) -> ApiResult<bool> {
        match outcome {
            Ok(snapshot) => Ok(self.apply_snapshot(snapshot)),
            Err(err) => {
                warn!("History refresh failed: {}", err);
                self.last_error = Some(err.clone());
                Err(err)
            }
        }
    }

    /// Fetch and apply a snapshot now.
    pub async fn refresh(&mut self, api: &dyn AnalysisApi) -> ApiResult<()> {
        let started = Instant::now();
        let outcome = api
            .list_history()
            .await
            .map(|entries| Snapshot { started, entries });
        self.apply_refresh(outcome).map(|_| ())
    }

    /// Remove an entry locally before the backend confirms the delete.
    pub fn begin_delete(&mut self, id: &AnalysisId) -> Option<AnalysisRequest> {
        self.pending_deletes.insert(id.clone());
        let position = self.entries.iter().position(|e| &e.id == id)?;
        Some(self.entries.remove(position))
    }

    /// Settle a delete started with [`History::begin_delete`].
    pub fn finish_delete(&mut self, id: &AnalysisId, confirmed: bool) {
        self.pending_deletes.remove(id);
        if confirmed {
            self.mark_local_change();
        }
    }

    /// Delete one entry: optimistic removal, then backend call.
    ///
    /// On failure the removal is rolled back and history is re-fetched.
    pub async fn delete(&mut self, api: &dyn AnalysisApi, id: &AnalysisId) -> ApiResult<()> {
        let previous = self.entries.clone();
        if self.begin_delete(id).is_none() {
            debug!("Analysis {} not in local history", id);
        }

        match api.delete(id).await {
            Ok(()) => {
                self.finish_delete(id, true);
                info!("Deleted analysis {}", id);
                Ok(())
            }
            Err(err) => {
                self.finish_delete(id, false);
                Err(self.roll_back(api, previous, err).await)
            }
        }
    }

    /// Clear the whole history.
    pub async fn clear_all(&mut self, api: &dyn AnalysisApi) -> ApiResult<()> {
        let previous = std::mem::take(&mut self.entries);

        match api.clear_history().await {
            Ok(()) => {
                self.mark_local_change();
                info!("Cleared {} history entries", previous.len());
                Ok(())
            }
            Err(err) => Err(self.roll_back(api, previous, err).await),
        }
    }

    /// Clear only the entries in the alerts view.
    pub async fn clear_alerts(&mut self, api: &dyn AnalysisApi) -> ApiResult<()> {
        let previous = self.entries.clone();
        let threshold = self.alert_threshold;
        self.entries.retain(|e| !e.is_alert(threshold));

        match api.clear_alerts().await {
            Ok(()) => {
                self.mark_local_change();
                info!(
                    "Cleared {} alert entries",
                    previous.len() - self.entries.len()
                );
                Ok(())
            }
            Err(err) => Err(self.roll_back(api, previous, err).await),
        }
    }

    /// Enqueue one ticket for background analysis.
    pub async fn enqueue_text(&mut self, api: &dyn AnalysisApi, text: &str) -> ApiResult<()> {
        if text.trim().is_empty() {
            return Err(self.surface(WatchdogError::Validation(EMPTY_TEXT_MESSAGE.to_string())));
        }

        match api.enqueue_text(text).await {
            Ok(()) => {
                info!("Enqueued ticket ({} chars)", text.len());
                Ok(())
            }
            Err(err) => Err(self.surface(err)),
        }
    }

    /// Upload a newline-delimited batch file. Returns the number of entries.
    pub async fn enqueue_file(&mut self, api: &dyn AnalysisApi, path: &Path) -> ApiResult<usize> {
        let contents = match tokio::fs::read(path).await {
            Ok(contents) => contents,
            Err(e) => {
                return Err(self.surface(WatchdogError::Io(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                ))))
            }
        };

        let count = count_entries(&String::from_utf8_lossy(&contents));
        if count == 0 {
            return Err(self.surface(WatchdogError::Validation(EMPTY_FILE_MESSAGE.to_string())));
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "tickets.txt".to_string());

        match api.enqueue_file(&file_name, contents).await {
            Ok(()) => {
                info!("Uploaded {} with {} entries", file_name, count);
                Ok(count)
            }
            Err(err) => Err(self.surface(err)),
        }
    }

    fn mark_local_change(&mut self) {
        self.stale_before = Some(Instant::now());
    }

    fn surface(&mut self, err: WatchdogError) -> WatchdogError {
        self.last_error = Some(err.clone());
        err
    }

    /// Undo an optimistic change, then reconcile with the server.
    async fn roll_back(
        &mut self,
        api: &dyn AnalysisApi,
        previous: Vec<AnalysisRequest>,
        err: WatchdogError,
    ) -> WatchdogError {
        warn!("Backend rejected change, reconciling: {}", err);
        self.entries = previous;
        if let Err(refresh_err) = self.refresh(api).await {
            warn!("Reconciliation refresh failed: {}", refresh_err);
        }
        self.surface(err)
    }
}

/// Number of non-blank lines in a batch upload.
pub fn count_entries(contents: &str) -> usize {
    contents.lines().filter(|l| !l.trim().is_empty()).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{completed_request, pending_request, FakeApi};
    use std::sync::Arc;
    use tokio_test::{assert_err, assert_ok};

    fn snapshot(entries: Vec<AnalysisRequest>) -> Snapshot {
        Snapshot {
            started: Instant::now(),
            entries,
        }
    }

    fn ids(entries: &[AnalysisRequest]) -> Vec<&str> {
        entries.iter().map(|e| e.id.as_str()).collect()
    }

    fn id(raw: &str) -> AnalysisId {
        AnalysisId::parse(raw).unwrap()
    }

    #[test]
    fn test_alerts_view_selects_urgent_completed_entries() {
        let mut history = History::new(7);
        let mut failed = pending_request("f");
        failed.fail("boom").unwrap();
        history.apply_snapshot(snapshot(vec![
            completed_request("a", 3),
            completed_request("b", 7),
            completed_request("c", 9),
            completed_request("d", 5),
            pending_request("e"),
            failed,
        ]));

        let alerts: Vec<&str> = history.alerts().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(alerts, vec!["b", "c"]);
    }

    #[test]
    fn test_snapshot_replaces_wholesale_in_server_order() {
        let mut history = History::new(7);
        history.apply_snapshot(snapshot(vec![pending_request("1"), pending_request("2")]));
        history.apply_snapshot(snapshot(vec![pending_request("3"), pending_request("1")]));

        assert_eq!(ids(history.entries()), vec!["3", "1"]);
        assert!(history.refreshed_at().is_some());
    }

    #[test]
    fn test_snapshot_never_moves_entry_backward() {
        let mut history = History::new(7);
        history.apply_snapshot(snapshot(vec![completed_request("1", 8)]));
        history.apply_snapshot(snapshot(vec![pending_request("1")]));

        let entry = &history.entries()[0];
        assert!(entry.status.is_terminal());
        assert_eq!(entry.urgency().unwrap().value(), 8);
    }

    #[test]
    fn test_pending_delete_hides_entry_from_snapshots() {
        let mut history = History::new(7);
        history.apply_snapshot(snapshot(vec![pending_request("1"), pending_request("2")]));

        let removed = history.begin_delete(&id("1"));
        assert_eq!(removed.unwrap().id.as_str(), "1");
        assert_eq!(ids(history.entries()), vec!["2"]);

        // A refresh landing while the delete is in flight still hides it
        history.apply_snapshot(snapshot(vec![pending_request("1"), pending_request("2")]));
        assert_eq!(ids(history.entries()), vec!["2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_snapshot_cannot_resurrect_deleted_entry() {
        let mut history = History::new(7);
        history.apply_snapshot(snapshot(vec![pending_request("1"), pending_request("2")]));

        let fetched_before_delete = snapshot(vec![pending_request("1"), pending_request("2")]);
        tokio::time::advance(std::time::Duration::from_millis(10)).await;

        history.begin_delete(&id("1"));
        history.finish_delete(&id("1"), true);

        assert!(!history.apply_snapshot(fetched_before_delete));
        assert_eq!(ids(history.entries()), vec!["2"]);

        tokio::time::advance(std::time::Duration::from_millis(10)).await;
        assert!(history.apply_snapshot(snapshot(vec![pending_request("2")])));
        assert_eq!(ids(history.entries()), vec!["2"]);
    }

    #[tokio::test]
    async fn test_delete_confirmed_by_backend() {
        let api = Arc::new(FakeApi::new());
        api.set_history(vec![completed_request("1", 8), completed_request("2", 2)]);
        let mut history = History::new(7);
        assert_ok!(history.refresh(api.as_ref()).await);

        assert_ok!(history.delete(api.as_ref(), &id("1")).await);

        assert_eq!(ids(history.entries()), vec!["2"]);
        assert_eq!(api.count("delete:1"), 1);
        assert!(history.last_error().is_none());
    }

    #[tokio::test]
    async fn test_failed_delete_restores_entry() {
        let api = Arc::new(FakeApi::new());
        api.set_history(vec![completed_request("1", 8), completed_request("2", 2)]);
        api.fail_deletes();
        let mut history = History::new(7);
        assert_ok!(history.refresh(api.as_ref()).await);

        let err = assert_err!(history.delete(api.as_ref(), &id("1")).await);

        assert_eq!(err.user_message(), "Failed to delete analysis.");
        assert_eq!(ids(history.entries()), vec!["1", "2"]);
        assert_eq!(history.last_error(), Some(&err));
        // One initial load plus the reconciliation fetch
        assert_eq!(api.count("history"), 2);
    }

    #[tokio::test]
    async fn test_failed_delete_rolls_back_when_refetch_fails() {
        let api = Arc::new(FakeApi::new());
        api.set_history(vec![completed_request("1", 8)]);
        let mut history = History::new(7);
        assert_ok!(history.refresh(api.as_ref()).await);

        api.fail_deletes();
        api.fail_history(Some(WatchdogError::Transport("offline".to_string())));
        assert_err!(history.delete(api.as_ref(), &id("1")).await);

        assert_eq!(ids(history.entries()), vec!["1"]);
        assert_eq!(
            history.last_error().map(|e| e.user_message()),
            Some("Failed to delete analysis.".to_string())
        );
    }

    #[tokio::test]
    async fn test_refresh_error_keeps_entries() {
        let api = Arc::new(FakeApi::new());
        api.set_history(vec![pending_request("1")]);
        let mut history = History::new(7);
        assert_ok!(history.refresh(api.as_ref()).await);

        api.fail_history(Some(WatchdogError::Transport("offline".to_string())));
        assert_err!(history.refresh(api.as_ref()).await);

        assert_eq!(ids(history.entries()), vec!["1"]);
        assert!(history.last_error().is_some());
    }

    #[tokio::test]
    async fn test_clear_alerts_and_clear_all() {
        let api = Arc::new(FakeApi::new());
        api.set_history(vec![
            completed_request("1", 3),
            completed_request("2", 9),
            pending_request("3"),
        ]);
        let mut history = History::new(7);
        assert_ok!(history.refresh(api.as_ref()).await);

        assert_ok!(history.clear_alerts(api.as_ref()).await);
        assert_eq!(ids(history.entries()), vec!["1", "3"]);
        assert_eq!(api.count("clear-alerts"), 1);

        assert_ok!(history.clear_all(api.as_ref()).await);
        assert!(history.entries().is_empty());
        assert_eq!(api.count("clear"), 2);
    }

    #[tokio::test]
    async fn test_enqueue_text_validates_locally() {
        let api = Arc::new(FakeApi::new());
        let mut history = History::new(7);

        let err = assert_err!(history.enqueue_text(api.as_ref(), "  ").await);
        assert_eq!(err.user_message(), EMPTY_TEXT_MESSAGE);
        assert!(api.calls().is_empty());

        assert_ok!(history.enqueue_text(api.as_ref(), "app crashes on login").await);
        assert_eq!(api.count("enqueue-text:app crashes on login"), 1);
    }

    #[tokio::test]
    async fn test_enqueue_file_counts_entries() {
        let api = Arc::new(FakeApi::new());
        let mut history = History::new(7);
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/tickets.txt");

        let count = assert_ok!(history.enqueue_file(api.as_ref(), &path).await);

        assert_eq!(count, 5);
        assert_eq!(api.count("enqueue-file:tickets.txt"), 1);
    }

    #[tokio::test]
    async fn test_enqueue_empty_file_is_rejected() {
        let api = Arc::new(FakeApi::new());
        let mut history = History::new(7);
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("empty.txt");
        std::fs::write(&path, "\n   \n\n").unwrap();

        let err = assert_err!(history.enqueue_file(api.as_ref(), &path).await);

        assert_eq!(err.user_message(), EMPTY_FILE_MESSAGE);
        assert!(api.calls().is_empty());

        let missing = assert_err!(
            history
                .enqueue_file(api.as_ref(), &dir.path().join("missing.txt"))
                .await
        );
        assert!(matches!(missing, WatchdogError::Io(_)));
    }

    #[test]
    fn test_count_entries() {
        assert_eq!(count_entries("a\n\nb\n  \nc"), 3);
        assert_eq!(count_entries(""), 0);
    }
}
