//! Client side of the analysis API.
//!
//! [`AnalysisApi`] is the seam between the state machines and the network;
//! [`HttpApiClient`] is the reqwest implementation used by the binary.

pub mod http;

pub use http::HttpApiClient;

use crate::error::ApiResult;
use crate::models::{AnalysisId, AnalysisRequest, StatusSnapshot};
use async_trait::async_trait;

/// Operations offered by the analysis backend.
#[async_trait]
pub trait AnalysisApi: Send + Sync {
    /// Submit one ticket for tracked analysis (`POST /api/analyze`).
    async fn submit(&self, text: &str) -> ApiResult<AnalysisId>;

    /// Fetch the current status of one analysis.
    async fn fetch_status(&self, id: &AnalysisId) -> ApiResult<StatusSnapshot>;

    /// Enqueue one ticket into the history model without tracking it.
    async fn enqueue_text(&self, text: &str) -> ApiResult<()>;

    /// Upload a newline-delimited batch of tickets.
    async fn enqueue_file(&self, file_name: &str, contents: Vec<u8>) -> ApiResult<()>;

    /// Fetch the full history snapshot.
    async fn list_history(&self) -> ApiResult<Vec<AnalysisRequest>>;

    /// Delete one history entry.
    async fn delete(&self, id: &AnalysisId) -> ApiResult<()>;

    /// Clear the whole history.
    async fn clear_history(&self) -> ApiResult<()>;

    /// Clear only the high-urgency entries.
    async fn clear_alerts(&self) -> ApiResult<()>;

    /// Download an export.
    async fn download(&self, target: &DownloadTarget) -> ApiResult<Download>;
}

/// What to export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadTarget {
    One(AnalysisId),
    All,
    Alerts,
}

impl DownloadTarget {
    /// Request path relative to the API base.
    pub fn path(&self) -> String {
        match self {
            DownloadTarget::One(id) => format!("api/analysis/{}/download", id),
            DownloadTarget::All => "api/analyses/download-all".to_string(),
            DownloadTarget::Alerts => "api/analyses/download-alerts".to_string(),
        }
    }

    /// File stem used when the server does not name the file.
    pub fn default_stem(&self) -> String {
        match self {
            DownloadTarget::One(id) => format!("analysis_{}", id),
            DownloadTarget::All => "all_analyses".to_string(),
            DownloadTarget::Alerts => "alert_analyses".to_string(),
        }
    }
}

/// A downloaded export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    /// Filename suggested by `Content-Disposition`, if any.
    pub filename: Option<String>,
    /// Value of the `Content-Type` header, if any.
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}
