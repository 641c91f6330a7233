//! Data models for the sentiment watchdog.
//!
//! This module contains the analysis request lifecycle, the result payload
//! returned by the backend, and the wire shapes used by the HTTP API.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::debug;

/// Identifier assigned by the backend when an analysis is submitted.
///
/// The backend uses integer primary keys, but the client treats identifiers
/// as opaque strings so both `"abc123"` and `42` are accepted on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct AnalysisId(String);

impl AnalysisId {
    /// Parse an identifier supplied by the user.
    ///
    /// Only ASCII alphanumerics, `-` and `_` are allowed so the value can be
    /// placed in a URL path without escaping.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err("Analysis id must not be empty".to_string());
        }
        if !trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(format!("Invalid analysis id: {}", trimmed));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AnalysisId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for AnalysisId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl<'de> Deserialize<'de> for AnalysisId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Number(u64),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Text(text) => AnalysisId(text),
            RawId::Number(n) => AnalysisId(n.to_string()),
        })
    }
}

/// Lifecycle status of an analysis request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AnalysisStatus {
    /// Queued or running on the backend.
    Pending,
    /// Finished with a result.
    #[serde(alias = "COMPLETED")]
    Complete,
    /// Finished with an error message.
    Failed,
}

impl AnalysisStatus {
    /// Whether the status can no longer change.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AnalysisStatus::Pending)
    }
}

impl fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisStatus::Pending => write!(f, "PENDING"),
            AnalysisStatus::Complete => write!(f, "COMPLETE"),
            AnalysisStatus::Failed => write!(f, "FAILED"),
        }
    }
}

/// Emotion label attached to a ticket.
///
/// Labels outside the known set are kept verbatim instead of being rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Emotion {
    Anger,
    Delight,
    Sadness,
    Neutral,
    Confusion,
    Other(String),
}

impl Emotion {
    /// Lowercase label as used on the wire and in palette keys.
    pub fn label(&self) -> &str {
        match self {
            Emotion::Anger => "anger",
            Emotion::Delight => "delight",
            Emotion::Sadness => "sadness",
            Emotion::Neutral => "neutral",
            Emotion::Confusion => "confusion",
            Emotion::Other(label) => label,
        }
    }
}

impl From<String> for Emotion {
    fn from(s: String) -> Self {
        match s.trim().to_lowercase().as_str() {
            "anger" => Emotion::Anger,
            "delight" => Emotion::Delight,
            "sadness" => Emotion::Sadness,
            "neutral" => Emotion::Neutral,
            "confusion" => Emotion::Confusion,
            other => Emotion::Other(other.to_string()),
        }
    }
}

impl From<&str> for Emotion {
    fn from(s: &str) -> Self {
        Emotion::from(s.to_string())
    }
}

impl From<Emotion> for String {
    fn from(emotion: Emotion) -> Self {
        emotion.label().to_string()
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Urgency score between 1 and 10 inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct UrgencyScore(u8);

impl UrgencyScore {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 10;

    pub fn new(value: u8) -> Result<Self, String> {
        Self::try_from(i64::from(value))
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for UrgencyScore {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if (i64::from(Self::MIN)..=i64::from(Self::MAX)).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(format!(
                "urgency score {} is outside {}-{}",
                value,
                Self::MIN,
                Self::MAX
            ))
        }
    }
}

impl From<UrgencyScore> for u8 {
    fn from(score: UrgencyScore) -> Self {
        score.0
    }
}

impl fmt::Display for UrgencyScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.0, Self::MAX)
    }
}

/// Result of a completed analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Detected emotion.
    pub emotion: Emotion,
    /// Free-form topic label.
    pub topic: String,
    /// One-sentence summary of the ticket.
    pub summary: String,
    /// How urgently the ticket needs attention.
    pub urgency_score: UrgencyScore,
}

/// Rejected lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("analysis {id} is already {status}")]
pub struct TransitionError {
    pub id: AnalysisId,
    pub status: AnalysisStatus,
}

/// A submitted ticket and its analysis state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    /// Backend-assigned identifier.
    pub id: AnalysisId,
    /// Submitted ticket text (empty when tracking an id without its text).
    pub text: String,
    /// Current lifecycle status.
    pub status: AnalysisStatus,
    /// Result, present once the status is COMPLETE.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<AnalysisResult>,
    /// Error message, present once the status is FAILED.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// When the backend recorded the submission.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl AnalysisRequest {
    /// A freshly submitted request awaiting its result.
    pub fn pending(id: AnalysisId, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
            status: AnalysisStatus::Pending,
            result: None,
            error_message: None,
            created_at: None,
        }
    }

    /// Attach a result. Only legal from PENDING.
    pub fn complete(&mut self, result: AnalysisResult) -> Result<(), TransitionError> {
        self.ensure_pending()?;
        self.status = AnalysisStatus::Complete;
        self.result = Some(result);
        Ok(())
    }

    /// Record a failure. Only legal from PENDING.
    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), TransitionError> {
        self.ensure_pending()?;
        self.status = AnalysisStatus::Failed;
        self.error_message = Some(message.into());
        Ok(())
    }

    fn ensure_pending(&self) -> Result<(), TransitionError> {
        if self.status.is_terminal() {
            return Err(TransitionError {
                id: self.id.clone(),
                status: self.status,
            });
        }
        Ok(())
    }

    /// Urgency of the result, if the request completed.
    pub fn urgency(&self) -> Option<UrgencyScore> {
        self.result.as_ref().map(|r| r.urgency_score)
    }

    /// Whether the request belongs in the alerts view.
    pub fn is_alert(&self, threshold: u8) -> bool {
        self.status == AnalysisStatus::Complete
            && self.urgency().is_some_and(|u| u.value() >= threshold)
    }
}

// === Wire types ===

/// Body of `POST /api/analyze` and `POST /api/analyze-text`.
#[derive(Debug, Clone, Serialize)]
pub struct TicketRequest<'a> {
    pub text: &'a str,
}

/// Response of `POST /api/analyze`.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitResponse {
    pub analysis_id: AnalysisId,
}

/// Response of `GET /api/analysis/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    #[serde(default, alias = "analysis_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<AnalysisId>,
    pub status: AnalysisStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<AnalysisResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl StatusSnapshot {
    /// View the snapshot as a request for `id`, text unknown.
    pub fn into_request(self, id: AnalysisId) -> AnalysisRequest {
        let mut request = AnalysisRequest::pending(self.id.unwrap_or(id), String::new());
        match (self.status, self.result) {
            (AnalysisStatus::Complete, Some(result)) => request.result = Some(result),
            (AnalysisStatus::Complete, None) | (AnalysisStatus::Pending, _) => {
                return request;
            }
            (AnalysisStatus::Failed, _) => request.error_message = self.error_message,
        }
        request.status = self.status;
        request
    }
}

/// One element of `GET /api/analyses/`.
///
/// Accepts both the nested `result` object and the flat column layout of
/// the history table.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryEntry {
    #[serde(alias = "analysis_id")]
    pub id: AnalysisId,
    #[serde(default, alias = "ticket_text")]
    pub text: String,
    pub status: AnalysisStatus,
    #[serde(default)]
    pub result: Option<AnalysisResult>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub emotion: Option<Emotion>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub urgency_score: Option<UrgencyScore>,
}

impl From<HistoryEntry> for AnalysisRequest {
    fn from(entry: HistoryEntry) -> Self {
        let result = entry.result.or_else(|| {
            match (entry.emotion, entry.urgency_score) {
                (Some(emotion), Some(urgency_score)) => Some(AnalysisResult {
                    emotion,
                    topic: entry.topic.unwrap_or_default(),
                    summary: entry.summary.unwrap_or_default(),
                    urgency_score,
                }),
                _ => None,
            }
        });

        // COMPLETE without a payload stays PENDING until a later snapshot fills it in.
        let (status, result) = match (entry.status, result) {
            (AnalysisStatus::Complete, Some(result)) => (AnalysisStatus::Complete, Some(result)),
            (AnalysisStatus::Complete, None) => (AnalysisStatus::Pending, None),
            (status, _) => (status, None),
        };

        AnalysisRequest {
            id: entry.id,
            text: entry.text,
            status,
            result,
            error_message: if status == AnalysisStatus::Failed {
                entry.error_message
            } else {
                None
            },
            created_at: entry.created_at,
        }
    }
}

/// `created_at` as RFC 3339, or without an offset (read as UTC).
///
/// A value that parses neither way is dropped rather than failing the
/// whole history listing.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_timestamp))
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(stamp) = DateTime::parse_from_rfc3339(raw) {
        return Some(stamp.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
        .or_else(|| {
            debug!("Ignoring unparsable created_at '{}'", raw);
            None
        })
}
