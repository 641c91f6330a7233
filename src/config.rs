//! Configuration file handling.
//!
//! Settings are loaded from `.watchdog.toml` and merged with command-line
//! arguments. Every field has a default, so a partial file is fine.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Name of the config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = ".watchdog.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Backend connection settings.
    #[serde(default)]
    pub api: ApiConfig,

    /// Status polling settings.
    #[serde(default)]
    pub polling: PollingConfig,

    /// History and alerts settings.
    #[serde(default)]
    pub history: HistoryConfig,

    /// Terminal output settings.
    #[serde(default)]
    pub display: DisplayConfig,
}

/// Backend connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the analysis API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_seconds: default_timeout(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_timeout() -> u64 {
    30
}

/// Status polling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Delay between status fetches in milliseconds.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Status fetches before giving up (0 = unlimited).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay multiplier after each pending result (1.0 = fixed rate).
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,

    /// Upper bound for the backed-off delay in milliseconds.
    #[serde(default = "default_max_interval_ms")]
    pub max_interval_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            max_attempts: default_max_attempts(),
            backoff_factor: default_backoff_factor(),
            max_interval_ms: default_max_interval_ms(),
        }
    }
}

fn default_interval_ms() -> u64 {
    2000
}

fn default_max_attempts() -> u32 {
    150 // five minutes at the default interval
}

fn default_backoff_factor() -> f64 {
    1.0
}

fn default_max_interval_ms() -> u64 {
    30_000
}

/// History and alerts settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Refresh period for `watch` in seconds.
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,

    /// Minimum urgency for an entry to count as an alert.
    #[serde(default = "default_alert_threshold")]
    pub alert_threshold: u8,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_refresh_interval(),
            alert_threshold: default_alert_threshold(),
        }
    }
}

fn default_refresh_interval() -> u64 {
    5
}

fn default_alert_threshold() -> u8 {
    7
}

/// Colors for one inclusive range of urgency scores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrgencyBand {
    pub min: u8,
    pub max: u8,
    pub color: String,
}

impl UrgencyBand {
    fn new(min: u8, max: u8, color: &str) -> Self {
        Self {
            min,
            max,
            color: color.to_string(),
        }
    }
}

/// Terminal output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Use colors when stdout is a terminal.
    #[serde(default = "default_true")]
    pub color: bool,

    /// Color per emotion label. Unlisted labels use `other`.
    #[serde(default = "default_emotion_colors")]
    pub emotion_colors: BTreeMap<String, String>,

    /// Color per status (pending, complete, failed).
    #[serde(default = "default_status_colors")]
    pub status_colors: BTreeMap<String, String>,

    /// Urgency color bands.
    #[serde(default = "default_urgency_bands")]
    pub urgency_bands: Vec<UrgencyBand>,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            color: true,
            emotion_colors: default_emotion_colors(),
            status_colors: default_status_colors(),
            urgency_bands: default_urgency_bands(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn color_map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn default_emotion_colors() -> BTreeMap<String, String> {
    color_map(&[
        ("anger", "red"),
        ("delight", "green"),
        ("sadness", "blue"),
        ("neutral", "white"),
        ("confusion", "yellow"),
        ("other", "white"),
    ])
}

fn default_status_colors() -> BTreeMap<String, String> {
    color_map(&[
        ("pending", "yellow"),
        ("complete", "green"),
        ("failed", "red"),
    ])
}

fn default_urgency_bands() -> Vec<UrgencyBand> {
    vec![
        UrgencyBand::new(1, 1, "green"),
        UrgencyBand::new(2, 2, "154"), // lime
        UrgencyBand::new(3, 3, "yellow"),
        UrgencyBand::new(4, 4, "208"), // orange
        UrgencyBand::new(5, 10, "red"),
    ]
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        Self::load_from_dir(Path::new("."))
    }

    /// Try to load `.watchdog.toml` from a directory.
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(DEFAULT_CONFIG_FILE);

        if path.exists() {
            Ok(Some(Self::load(&path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// Only values given on the command line (or via environment) override the file.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref url) = args.api_url {
            self.api.base_url = url.clone();
        }

        if let Some(timeout) = args.timeout {
            self.api.timeout_seconds = timeout;
        }

        if args.no_color {
            self.display.color = false;
        }
    }

    /// Check values that serde alone cannot reject.
    pub fn validate(&self) -> Result<()> {
        let url = reqwest::Url::parse(&self.api.base_url)
            .with_context(|| format!("Invalid API base URL: {}", self.api.base_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!("API base URL must use http or https: {}", self.api.base_url);
        }

        if self.api.timeout_seconds == 0 {
            bail!("api.timeout_seconds must be at least 1");
        }
        if self.polling.interval_ms == 0 {
            bail!("polling.interval_ms must be at least 1");
        }
        if !(self.polling.backoff_factor >= 1.0 && self.polling.backoff_factor.is_finite()) {
            bail!(
                "polling.backoff_factor must be at least 1.0, got {}",
                self.polling.backoff_factor
            );
        }
        if self.history.refresh_interval_secs == 0 {
            bail!("history.refresh_interval_secs must be at least 1");
        }
        if !(1..=10).contains(&self.history.alert_threshold) {
            bail!(
                "history.alert_threshold must be between 1 and 10, got {}",
                self.history.alert_threshold
            );
        }

        for band in &self.display.urgency_bands {
            if band.min > band.max || band.min < 1 || band.max > 10 {
                bail!(
                    "Invalid urgency band {}-{}: bounds must satisfy 1 <= min <= max <= 10",
                    band.min,
                    band.max
                );
            }
        }

        let colors = self
            .display
            .emotion_colors
            .values()
            .chain(self.display.status_colors.values())
            .chain(self.display.urgency_bands.iter().map(|b| &b.color));
        for color in colors {
            if crate::view::palette::parse_color(color).is_none() {
                bail!("Unknown color in [display]: {}", color);
            }
        }

        Ok(())
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
