//! Scripted in-memory backend for unit tests.

use crate::client::{AnalysisApi, Download, DownloadTarget};
use crate::error::{ApiResult, WatchdogError};
use crate::models::{
    AnalysisId, AnalysisRequest, AnalysisResult, AnalysisStatus, Emotion, StatusSnapshot,
    UrgencyScore,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Fake backend. Status replies are consumed in order; once the queue is
/// empty every poll answers PENDING.
#[derive(Default)]
pub struct FakeApi {
    submit_reply: Mutex<Option<ApiResult<AnalysisId>>>,
    statuses: Mutex<VecDeque<ApiResult<StatusSnapshot>>>,
    history: Mutex<Vec<AnalysisRequest>>,
    history_error: Mutex<Option<WatchdogError>>,
    fail_deletes: AtomicBool,
    fetch_delay: Mutex<Duration>,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_submit_id(self, id: &str) -> Self {
        *self.submit_reply.lock().unwrap() = Some(Ok(AnalysisId::parse(id).unwrap()));
        self
    }

    pub fn with_submit_error(self, error: WatchdogError) -> Self {
        *self.submit_reply.lock().unwrap() = Some(Err(error));
        self
    }

    pub fn push_status(&self, reply: ApiResult<StatusSnapshot>) {
        self.statuses.lock().unwrap().push_back(reply);
    }

    pub fn set_fetch_delay(&self, delay: Duration) {
        *self.fetch_delay.lock().unwrap() = delay;
    }

    pub fn set_history(&self, entries: Vec<AnalysisRequest>) {
        *self.history.lock().unwrap() = entries;
    }

    pub fn fail_history(&self, error: Option<WatchdogError>) {
        *self.history_error.lock().unwrap() = error;
    }

    pub fn fail_deletes(&self) {
        self.fail_deletes.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of recorded calls starting with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn server_error(message: &str) -> WatchdogError {
        WatchdogError::Rejected {
            status: 500,
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl AnalysisApi for FakeApi {
    async fn submit(&self, text: &str) -> ApiResult<AnalysisId> {
        self.record("submit".to_string());
        let reply = self.submit_reply.lock().unwrap().clone();
        let reply = reply.unwrap_or_else(|| Ok(AnalysisId::parse("1").unwrap()));
        if let Ok(id) = &reply {
            self.history
                .lock()
                .unwrap()
                .push(AnalysisRequest::pending(id.clone(), text));
        }
        reply
    }

    async fn fetch_status(&self, id: &AnalysisId) -> ApiResult<StatusSnapshot> {
        self.record(format!("status:{}", id));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let delay = *self.fetch_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let reply = self.statuses.lock().unwrap().pop_front();
        reply.unwrap_or_else(|| Ok(pending_snapshot()))
    }

    async fn enqueue_text(&self, text: &str) -> ApiResult<()> {
        self.record(format!("enqueue-text:{}", text));
        Ok(())
    }

    async fn enqueue_file(&self, file_name: &str, contents: Vec<u8>) -> ApiResult<()> {
        self.record(format!("enqueue-file:{}:{}", file_name, contents.len()));
        Ok(())
    }

    async fn list_history(&self) -> ApiResult<Vec<AnalysisRequest>> {
        self.record("history".to_string());
        if let Some(error) = self.history_error.lock().unwrap().clone() {
            return Err(error);
        }
        Ok(self.history.lock().unwrap().clone())
    }

    async fn delete(&self, id: &AnalysisId) -> ApiResult<()> {
        self.record(format!("delete:{}", id));
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(Self::server_error("Failed to delete analysis."));
        }
        self.history.lock().unwrap().retain(|r| &r.id != id);
        Ok(())
    }

    async fn clear_history(&self) -> ApiResult<()> {
        self.record("clear".to_string());
        self.history.lock().unwrap().clear();
        Ok(())
    }

    async fn clear_alerts(&self) -> ApiResult<()> {
        self.record("clear-alerts".to_string());
        self.history.lock().unwrap().retain(|r| !r.is_alert(7));
        Ok(())
    }

    async fn download(&self, target: &DownloadTarget) -> ApiResult<Download> {
        self.record(format!("download:{}", target.path()));
        Ok(Download {
            filename: None,
            content_type: Some("text/csv".to_string()),
            bytes: b"id,emotion\n".to_vec(),
        })
    }
}

pub fn sample_result(emotion: &str, topic: &str, urgency: u8) -> AnalysisResult {
    AnalysisResult {
        emotion: Emotion::from(emotion),
        topic: topic.to_string(),
        summary: format!("Customer writes about {}", topic),
        urgency_score: UrgencyScore::new(urgency).unwrap(),
    }
}

pub fn pending_snapshot() -> StatusSnapshot {
    StatusSnapshot {
        id: None,
        status: AnalysisStatus::Pending,
        result: None,
        error_message: None,
    }
}

pub fn complete_snapshot(emotion: &str, topic: &str, urgency: u8) -> StatusSnapshot {
    StatusSnapshot {
        id: None,
        status: AnalysisStatus::Complete,
        result: Some(sample_result(emotion, topic, urgency)),
        error_message: None,
    }
}

pub fn failed_snapshot(message: Option<&str>) -> StatusSnapshot {
    StatusSnapshot {
        id: None,
        status: AnalysisStatus::Failed,
        result: None,
        error_message: message.map(String::from),
    }
}

/// A history entry that completed with `urgency`.
pub fn completed_request(id: &str, urgency: u8) -> AnalysisRequest {
    let mut request = AnalysisRequest::pending(AnalysisId::parse(id).unwrap(), "ticket");
    request
        .complete(sample_result("anger", "shipping", urgency))
        .unwrap();
    request
}

pub fn pending_request(id: &str) -> AnalysisRequest {
    AnalysisRequest::pending(AnalysisId::parse(id).unwrap(), "ticket")
}
