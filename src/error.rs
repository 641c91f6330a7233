//! Error kinds surfaced by the watchdog.
//!
//! Every failure ends up as a message shown to the user; none of them are
//! fatal, and nothing is retried automatically.

use thiserror::Error;

pub const EMPTY_TEXT_MESSAGE: &str = "Please enter some text to analyze.";
pub const EMPTY_FILE_MESSAGE: &str = "The selected file contains no entries.";
pub const SUBMIT_FAILED_MESSAGE: &str = "Failed to start analysis.";
pub const ANALYSIS_FAILED_MESSAGE: &str = "Analysis failed. Please try again.";
pub const STATUS_FETCH_MESSAGE: &str = "Failed to fetch analysis status.";
pub const UNKNOWN_ERROR_MESSAGE: &str = "Unknown error occurred.";

/// Result alias for API and state-machine operations.
pub type ApiResult<T> = std::result::Result<T, WatchdogError>;

/// Everything that can go wrong between the user and the analysis API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WatchdogError {
    /// Input rejected locally before any request was sent.
    #[error("invalid input: {0}")]
    Validation(String),

    /// The request never produced a response (connect failure, timeout).
    #[error("transport error: {0}")]
    Transport(String),

    /// The backend answered with an unexpected status code.
    #[error("request rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    /// The analysis itself resolved to FAILED.
    #[error("analysis failed: {0}")]
    AnalysisFailed(String),

    /// A status poll failed; polling stops on the first such error.
    #[error("status fetch failed: {0}")]
    StatusFetch(String),

    /// Polling gave up after the configured number of attempts.
    #[error("analysis still pending after {attempts} status checks")]
    PollTimeout { attempts: u32 },

    /// The backend sent a body we could not understand.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Reading an upload or writing a download failed.
    #[error("i/o error: {0}")]
    Io(String),
}

impl WatchdogError {
    /// The message shown to the user.
    pub fn user_message(&self) -> String {
        match self {
            WatchdogError::Validation(message)
            | WatchdogError::Transport(message)
            | WatchdogError::Rejected { message, .. }
            | WatchdogError::AnalysisFailed(message)
            | WatchdogError::Io(message) => message.clone(),
            WatchdogError::StatusFetch(_) => STATUS_FETCH_MESSAGE.to_string(),
            WatchdogError::PollTimeout { attempts } => format!(
                "Analysis did not complete after {} status checks.",
                attempts
            ),
            WatchdogError::UnexpectedResponse(_) => UNKNOWN_ERROR_MESSAGE.to_string(),
        }
    }

    /// Whether this error describes the analysis outcome rather than the client.
    pub fn is_analysis_outcome(&self) -> bool {
        matches!(
            self,
            WatchdogError::AnalysisFailed(_) | WatchdogError::PollTimeout { .. }
        )
    }
}

impl From<std::io::Error> for WatchdogError {
    fn from(err: std::io::Error) -> Self {
        WatchdogError::Io(err.to_string())
    }
}
