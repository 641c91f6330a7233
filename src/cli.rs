//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::client::DownloadTarget;
use crate::models::AnalysisId;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Sentiment Watchdog - terminal client for the sentiment analysis API
///
/// Submit support tickets for emotion, topic and urgency analysis, follow
/// them to completion, and keep an eye on urgent tickets.
///
/// Examples:
///   watchdog analyze "The app crashes every time I log in"
///   echo "Refund still missing" | watchdog analyze --stdin
///   watchdog enqueue --file tickets.txt
///   watchdog history --alerts --fail-on-alert
///   watchdog watch --alerts
///   watchdog download --all -o exports/
///   watchdog --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Base URL of the analysis API
    ///
    /// Overrides the [api] base_url setting in .watchdog.toml.
    #[arg(long, value_name = "URL", env = "WATCHDOG_API_URL", global = true)]
    pub api_url: Option<String>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .watchdog.toml in the current directory
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output format (text, json)
    #[arg(long, default_value = "text", value_name = "FORMAT", global = true)]
    pub format: OutputFormat,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Request timeout in seconds
    #[arg(long, value_name = "SECS", global = true)]
    pub timeout: Option<u64>,

    /// Generate a default .watchdog.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Submit a ticket and wait for its analysis
    Analyze {
        /// Ticket text
        text: Option<String>,

        /// Read the ticket text from stdin
        #[arg(long, conflicts_with = "text")]
        stdin: bool,

        /// Print the analysis id and exit without polling
        #[arg(long)]
        no_wait: bool,
    },

    /// Poll an existing analysis until it resolves
    Track {
        #[arg(value_parser = AnalysisId::parse)]
        id: AnalysisId,
    },

    /// Fetch the current status of an analysis once
    Status {
        #[arg(value_parser = AnalysisId::parse)]
        id: AnalysisId,
    },

    /// Queue tickets for background analysis
    ///
    /// The results show up in `watchdog history`.
    Enqueue {
        /// Ticket text
        text: Option<String>,

        /// Upload a file with one ticket per line
        #[arg(long, value_name = "PATH", conflicts_with = "text")]
        file: Option<PathBuf>,
    },

    /// Show the analysis history
    History {
        /// Only show entries at or above the alert threshold
        #[arg(long)]
        alerts: bool,

        /// Exit with code 2 when any alert is present
        #[arg(long)]
        fail_on_alert: bool,
    },

    /// Keep refreshing the history until interrupted
    Watch {
        /// Only show entries at or above the alert threshold
        #[arg(long)]
        alerts: bool,
    },

    /// Delete one analysis from the history
    Delete {
        #[arg(value_parser = AnalysisId::parse)]
        id: AnalysisId,
    },

    /// Clear the whole history, or only the alerts
    Clear {
        #[arg(long)]
        alerts: bool,
    },

    /// Download results as a file
    Download {
        /// Analysis to download
        #[arg(value_parser = AnalysisId::parse, required_unless_present_any = ["all", "alerts"])]
        id: Option<AnalysisId>,

        /// Download the full history
        #[arg(long, conflicts_with_all = ["id", "alerts"])]
        all: bool,

        /// Download alerts only
        #[arg(long, conflicts_with = "id")]
        alerts: bool,

        /// Output file or directory
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

/// Output format for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text (default)
    #[default]
    Text,
    /// JSON format
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        let Some(command) = &self.command else {
            return Err("No command given. Run `watchdog --help` for usage.".to_string());
        };

        if let Some(ref url) = self.api_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("API URL must start with 'http://' or 'https://'".to_string());
            }
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        // Validate timeout if provided
        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        match command {
            Command::Analyze { text, stdin, .. } => {
                if text.is_none() && !stdin {
                    return Err("Provide the ticket text or use --stdin".to_string());
                }
            }
            Command::Enqueue { text, file } => {
                if text.is_none() && file.is_none() {
                    return Err("Provide the ticket text or use --file".to_string());
                }
                if let Some(ref path) = file {
                    if !path.is_file() {
                        return Err(format!("File does not exist: {}", path.display()));
                    }
                }
            }
            Command::History {
                alerts,
                fail_on_alert,
            } => {
                if *fail_on_alert && !alerts {
                    return Err("--fail-on-alert requires --alerts".to_string());
                }
            }
            _ => {}
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }

    pub fn is_json(&self) -> bool {
        self.format == OutputFormat::Json
    }
}

impl Command {
    /// What `download` should fetch, if this is a download.
    pub fn download_target(&self) -> Option<DownloadTarget> {
        match self {
            Command::Download { id: Some(id), .. } => Some(DownloadTarget::One(id.clone())),
            Command::Download { all: true, .. } => Some(DownloadTarget::All),
            Command::Download { alerts: true, .. } => Some(DownloadTarget::Alerts),
            _ => None,
        }
    }
}
