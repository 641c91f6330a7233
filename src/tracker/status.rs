//! Single-request status tracking.
//!
//! A [`StatusTracker`] submits one ticket, then polls its status until the
//! backend resolves it. Polling runs in a spawned task owned by the tracker;
//! cancelling, replacing or dropping the tracker aborts that task, so no
//! update can land after teardown.

use super::policy::PollPolicy;
use crate::client::AnalysisApi;
use crate::error::{ApiResult, WatchdogError, ANALYSIS_FAILED_MESSAGE, EMPTY_TEXT_MESSAGE};
use crate::models::{AnalysisId, AnalysisRequest, AnalysisResult, AnalysisStatus};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Observable state of a tracker.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerState {
    /// Nothing submitted yet, or the last run was cancelled.
    Idle,
    /// Waiting for the backend; `attempts` status fetches so far.
    Tracking { id: AnalysisId, attempts: u32 },
    /// The analysis completed.
    Resolved(AnalysisRequest),
    /// Submission, polling or the analysis itself failed.
    Failed {
        id: Option<AnalysisId>,
        error: WatchdogError,
    },
}

/// One outcome reported by the poll task.
#[derive(Debug, Clone, PartialEq)]
pub enum PollEvent {
    Pending { attempt: u32 },
    Complete(AnalysisResult),
    Failed(WatchdogError),
}

impl PollEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PollEvent::Pending { .. })
    }
}

/// A running poll loop. Dropping it aborts the loop.
struct PollTask {
    id: AnalysisId,
    handle: JoinHandle<()>,
    events: mpsc::Receiver<PollEvent>,
}

impl Drop for PollTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Submits tickets and follows one analysis at a time to resolution.
pub struct StatusTracker {
    api: Arc<dyn AnalysisApi>,
    policy: PollPolicy,
    request: Option<AnalysisRequest>,
    error: Option<WatchdogError>,
    attempts: u32,
    poll: Option<PollTask>,
}

impl StatusTracker {
    pub fn new(api: Arc<dyn AnalysisApi>, policy: PollPolicy) -> Self {
        Self {
            api,
            policy,
            request: None,
            error: None,
            attempts: 0,
            poll: None,
        }
    }

    pub fn state(&self) -> TrackerState {
        if let Some(poll) = &self.poll {
            return TrackerState::Tracking {
                id: poll.id.clone(),
                attempts: self.attempts,
            };
        }

        if let Some(error) = &self.error {
            return TrackerState::Failed {
                id: self.request.as_ref().map(|r| r.id.clone()),
                error: error.clone(),
            };
        }

        match &self.request {
            Some(request) if request.status == AnalysisStatus::Complete => {
                TrackerState::Resolved(request.clone())
            }
            _ => TrackerState::Idle,
        }
    }

    /// The most recently submitted or tracked request.
    pub fn request(&self) -> Option<&AnalysisRequest> {
        self.request.as_ref()
    }

    /// Number of live poll loops (0 or 1).
    #[cfg(test)]
    pub fn active_polls(&self) -> usize {
        usize::from(self.poll.is_some())
    }

    /// Validate and submit `text`, then start polling the returned id.
    ///
    /// Any previous tracking is cancelled first. Empty input never reaches
    /// the network.
    pub async fn submit(&mut self, text: &str) -> ApiResult<AnalysisId> {
        self.reset();

        if text.trim().is_empty() {
            let err = WatchdogError::Validation(EMPTY_TEXT_MESSAGE.to_string());
            self.error = Some(err.clone());
            return Err(err);
        }

        match self.api.submit(text).await {
            Ok(id) => {
                info!("Submitted analysis {}", id);
                self.request = Some(AnalysisRequest::pending(id.clone(), text));
                self.start_polling(id.clone());
                Ok(id)
            }
            Err(err) => {
                warn!("Submission failed: {}", err);
                self.error = Some(err.clone());
                Err(err)
            }
        }
    }

    /// Start polling an analysis that was submitted elsewhere.
    pub fn track(&mut self, id: AnalysisId) {
        self.reset();
        self.request = Some(AnalysisRequest::pending(id.clone(), String::new()));
        self.start_polling(id);
    }

    /// Stop polling. Safe to call at any time.
    pub fn cancel(&mut self) {
        if let Some(poll) = self.poll.take() {
            debug!("Stopped polling analysis {}", poll.id);
        }
    }

    /// Wait for the next poll outcome and apply it.
    ///
    /// Returns `None` when nothing is being tracked.
    pub async fn next_event(&mut self) -> Option<PollEvent> {
        let poll = self.poll.as_mut()?;
        let event = poll.events.recv().await.unwrap_or_else(|| {
            PollEvent::Failed(WatchdogError::StatusFetch(
                "polling stopped unexpectedly".to_string(),
            ))
        });
        self.apply(&event);
        Some(event)
    }

    /// Drive polling until the tracked analysis resolves.
    pub async fn wait(&mut self) -> TrackerState {
        while self.next_event().await.is_some() {}
        self.state()
    }

    fn start_polling(&mut self, id: AnalysisId) {
        self.cancel();
        self.attempts = 0;

        let (tx, rx) = mpsc::channel(8);
        let handle = tokio::spawn(poll_until_resolved(
            self.api.clone(),
            id.clone(),
            self.policy.clone(),
            tx,
        ));

        debug!("Polling analysis {} every {:?}", id, self.policy.interval);
        self.poll = Some(PollTask {
            id,
            handle,
            events: rx,
        });
    }

    fn reset(&mut self) {
        self.cancel();
        self.request = None;
        self.error = None;
        self.attempts = 0;
    }

    fn apply(&mut self, event: &PollEvent) {
        match event {
            PollEvent::Pending { attempt } => {
                self.attempts = *attempt;
            }
            PollEvent::Complete(result) => {
                self.poll = None;
                if let Some(request) = self.request.as_mut() {
                    if let Err(e) = request.complete(result.clone()) {
                        warn!("Ignoring result: {}", e);
                    }
                    info!(
                        "Analysis {} complete: {} / {}",
                        request.id, result.emotion, result.urgency_score
                    );
                }
            }
            PollEvent::Failed(error) => {
                self.poll = None;
                if let (Some(request), WatchdogError::AnalysisFailed(message)) =
                    (self.request.as_mut(), error)
                {
                    if let Err(e) = request.fail(message.clone()) {
                        warn!("Ignoring failure: {}", e);
                    }
                }
                warn!("Tracking stopped: {}", error);
                self.error = Some(error.clone());
            }
        }
    }
}

/// Fetch the status of `id` until it resolves, one request at a time.
async fn poll_until_resolved(
    api: Arc<dyn AnalysisApi>,
    id: AnalysisId,
    policy: PollPolicy,
    events: mpsc::Sender<PollEvent>,
) {
    let mut attempts = 0u32;

    loop {
        tokio::time::sleep(policy.delay_before(attempts)).await;
        attempts += 1;
        debug!("Fetching status of {} (attempt {})", id, attempts);

        let event = match api.fetch_status(&id).await {
            Ok(snapshot) => match snapshot.status {
                AnalysisStatus::Complete => match snapshot.result {
                    Some(result) => PollEvent::Complete(result),
                    None => PollEvent::Failed(WatchdogError::UnexpectedResponse(format!(
                        "analysis {} is COMPLETE without a result",
                        id
                    ))),
                },
                AnalysisStatus::Failed => PollEvent::Failed(WatchdogError::AnalysisFailed(
                    snapshot
                        .error_message
                        .filter(|m| !m.trim().is_empty())
                        .unwrap_or_else(|| ANALYSIS_FAILED_MESSAGE.to_string()),
                )),
                AnalysisStatus::Pending if policy.is_exhausted(attempts) => {
                    PollEvent::Failed(WatchdogError::PollTimeout { attempts })
                }
                AnalysisStatus::Pending => PollEvent::Pending { attempt: attempts },
            },
            Err(err) => {
                warn!("Status fetch for {} failed: {}", id, err);
                PollEvent::Failed(WatchdogError::StatusFetch(err.to_string()))
            }
        };

        let terminal = event.is_terminal();
        if events.send(event).await.is_err() || terminal {
            break;
        }
    }
}
