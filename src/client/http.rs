//! reqwest implementation of [`AnalysisApi`].

use super::{AnalysisApi, Download, DownloadTarget};
use crate::error::{ApiResult, WatchdogError, SUBMIT_FAILED_MESSAGE};
use crate::models::{
    AnalysisId, AnalysisRequest, HistoryEntry, StatusSnapshot, SubmitResponse, TicketRequest,
};
use async_trait::async_trait;
use reqwest::header::{HeaderName, CONTENT_DISPOSITION, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

/// HTTP client for the analysis backend.
#[derive(Debug, Clone)]
pub struct HttpApiClient {
    base_url: Url,
    http: reqwest::Client,
    timeout_seconds: u64,
}

impl HttpApiClient {
    /// Create a client rooted at `base_url` (e.g. `http://localhost:8000`).
    pub fn new(base_url: &str, timeout_seconds: u64) -> ApiResult<Self> {
        let mut parsed = Url::parse(base_url).map_err(|e| {
            WatchdogError::Validation(format!("Invalid API URL {}: {}", base_url, e))
        })?;

        // Url::join replaces the last segment unless the base ends with '/'
        if !parsed.path().ends_with('/') {
            let path = format!("{}/", parsed.path());
            parsed.set_path(&path);
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| WatchdogError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        debug!("HTTP client timeout {}s", timeout_seconds);

        Ok(Self {
            base_url: parsed,
            http,
            timeout_seconds,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> ApiResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| WatchdogError::Validation(format!("Invalid endpoint {}: {}", path, e)))
    }

    fn map_send_error(&self, err: reqwest::Error) -> WatchdogError {
        if err.is_timeout() {
            WatchdogError::Transport(format!(
                "Request timed out after {}s",
                self.timeout_seconds
            ))
        } else if err.is_connect() {
            WatchdogError::Transport(format!(
                "Cannot connect to analysis API at {}",
                self.base_url
            ))
        } else {
            WatchdogError::Transport(format!("Request failed: {}", err))
        }
    }

    async fn send(&self, request: RequestBuilder) -> ApiResult<Response> {
        request.send().await.map_err(|e| self.map_send_error(e))
    }

    /// Pass through 2xx responses, turn everything else into `Rejected`.
    async fn expect_success(&self, response: Response, fallback: &str) -> ApiResult<Response> {
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(rejected(response, fallback).await)
        }
    }

    async fn parse_json<T: DeserializeOwned>(&self, response: Response) -> ApiResult<T> {
        let body = response.text().await.map_err(|e| self.map_send_error(e))?;
        serde_json::from_str(&body).map_err(|e| WatchdogError::UnexpectedResponse(e.to_string()))
    }
}

/// Build a `Rejected` error from a non-success response.
async fn rejected(response: Response, fallback: &str) -> WatchdogError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    debug!("Backend returned {}: {}", status, body);

    WatchdogError::Rejected {
        status: status.as_u16(),
        message: extract_detail(&body).unwrap_or_else(|| fallback.to_string()),
    }
}

/// First error message in a FastAPI-style error body.
///
/// `detail` is either a string or a list of validation errors carrying `msg`.
pub fn extract_detail(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    match value.get("detail")? {
        Value::String(message) if !message.trim().is_empty() => Some(message.clone()),
        Value::Array(items) => items
            .iter()
            .find_map(|item| item.get("msg").and_then(Value::as_str))
            .map(String::from),
        _ => None,
    }
}

/// Filename from a `Content-Disposition` header value.
pub fn parse_content_disposition(value: &str) -> Option<String> {
    value.split(';').map(str::trim).find_map(|param| {
        let (key, raw) = param.split_once('=')?;
        if !key.trim().eq_ignore_ascii_case("filename") {
            return None;
        }
        let name = raw.trim().trim_matches('"');
        (!name.is_empty()).then(|| name.to_string())
    })
}

#[async_trait]
impl AnalysisApi for HttpApiClient {
    async fn submit(&self, text: &str) -> ApiResult<AnalysisId> {
        let url = self.endpoint("api/analyze")?;
        debug!("POST {}", url);

        let response = self
            .send(self.http.post(url).json(&TicketRequest { text }))
            .await?;

        if response.status() != StatusCode::ACCEPTED {
            return Err(rejected(response, SUBMIT_FAILED_MESSAGE).await);
        }

        let submitted: SubmitResponse = self.parse_json(response).await?;
        info!("Analysis {} accepted", submitted.analysis_id);
        Ok(submitted.analysis_id)
    }

    async fn fetch_status(&self, id: &AnalysisId) -> ApiResult<StatusSnapshot> {
        let url = self.endpoint(&format!("api/analysis/{}", id))?;
        debug!("GET {}", url);

        let response = self.send(self.http.get(url)).await?;
        let response = self
            .expect_success(response, "Network response was not ok")
            .await?;
        self.parse_json(response).await
    }

    async fn enqueue_text(&self, text: &str) -> ApiResult<()> {
        let url = self.endpoint("api/analyze-text")?;
        debug!("POST {}", url);

        let response = self
            .send(self.http.post(url).json(&TicketRequest { text }))
            .await?;
        self.expect_success(response, SUBMIT_FAILED_MESSAGE).await?;
        Ok(())
    }

    async fn enqueue_file(&self, file_name: &str, contents: Vec<u8>) -> ApiResult<()> {
        let url = self.endpoint("api/analyze-file")?;
        debug!("POST {} ({} bytes)", url, contents.len());

        let part = Part::bytes(contents)
            .file_name(file_name.to_string())
            .mime_str("text/plain")
            .map_err(|e| WatchdogError::Transport(format!("Failed to build upload: {}", e)))?;
        let form = Form::new().part("file", part);

        let response = self.send(self.http.post(url).multipart(form)).await?;
        self.expect_success(response, "Failed to upload file.").await?;
        Ok(())
    }

    async fn list_history(&self) -> ApiResult<Vec<AnalysisRequest>> {
        let url = self.endpoint("api/analyses/")?;
        debug!("GET {}", url);

        let response = self.send(self.http.get(url)).await?;
        let response = self
            .expect_success(response, "Failed to load history.")
            .await?;
        let entries: Vec<HistoryEntry> = self.parse_json(response).await?;
        Ok(entries.into_iter().map(AnalysisRequest::from).collect())
    }

    async fn delete(&self, id: &AnalysisId) -> ApiResult<()> {
        let url = self.endpoint(&format!("api/analysis/{}", id))?;
        debug!("DELETE {}", url);

        let response = self.send(self.http.delete(url)).await?;
        self.expect_success(response, "Failed to delete analysis.").await?;
        Ok(())
    }

    async fn clear_history(&self) -> ApiResult<()> {
        let url = self.endpoint("api/analyses/")?;
        debug!("DELETE {}", url);

        let response = self.send(self.http.delete(url)).await?;
        self.expect_success(response, "Failed to clear history.").await?;
        Ok(())
    }

    async fn clear_alerts(&self) -> ApiResult<()> {
        let url = self.endpoint("api/analyses/alerts")?;
        debug!("DELETE {}", url);

        let response = self.send(self.http.delete(url)).await?;
        self.expect_success(response, "Failed to clear alerts.").await?;
        Ok(())
    }

    async fn download(&self, target: &DownloadTarget) -> ApiResult<Download> {
        let url = self.endpoint(&target.path())?;
        debug!("GET {}", url);

        let response = self.send(self.http.get(url)).await?;
        let response = self
            .expect_success(response, "Failed to download results.")
            .await?;

        let header = |name: HeaderName| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(String::from)
        };
        let filename = header(CONTENT_DISPOSITION).and_then(|v| parse_content_disposition(&v));
        let content_type = header(CONTENT_TYPE);

        let bytes = response.bytes().await.map_err(|e| self.map_send_error(e))?;

        Ok(Download {
            filename,
            content_type,
            bytes: bytes.to_vec(),
        })
    }
}
