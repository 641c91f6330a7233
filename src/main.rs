//! Sentiment Watchdog - terminal client for the sentiment analysis API
//!
//! Submits support tickets for analysis, follows them to completion, and
//! keeps the analysis history and urgent-ticket alerts in view.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (validation, connection, config, etc.)
//!   2 - The analysis failed or timed out, or --fail-on-alert found alerts

mod cli;
mod client;
mod config;
mod error;
mod export;
mod history;
mod models;
mod tracker;
mod view;

#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use cli::{Args, Command};
use client::{AnalysisApi, DownloadTarget, HttpApiClient};
use config::{Config, DEFAULT_CONFIG_FILE};
use error::WatchdogError;
use history::{History, HistoryRefresher};
use indicatif::{ProgressBar, ProgressStyle};
use models::AnalysisId;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracker::{PollEvent, PollPolicy, StatusTracker, TrackerState};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use view::{Palette, Renderer};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    init_logging(&args);

    debug!("Sentiment Watchdog v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run(args).await {
        Ok(exit_code) => std::process::exit(exit_code),
        Err(e) => {
            error!("Command failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .watchdog.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(DEFAULT_CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            DEFAULT_CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", DEFAULT_CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", DEFAULT_CONFIG_FILE);
    println!("   Edit it to change the API URL, polling, alert threshold and colors.");
    Ok(())
}

/// Initialize logging on stderr. `RUST_LOG` overrides the verbosity flags.
fn init_logging(args: &Args) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level().to_string()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Everything a command handler needs.
struct App {
    api: Arc<dyn AnalysisApi>,
    config: Config,
    renderer: Renderer,
    quiet: bool,
}

impl App {
    fn print(&self, output: &str) {
        println!("{}", output.trim_end());
    }

    /// Report an error and return the exit code for it.
    fn fail(&self, err: &WatchdogError) -> i32 {
        let line = self.renderer.error(err);
        if self.renderer.is_json() {
            println!("{}", line);
        } else {
            eprintln!("{}", line);
        }
        if err.is_analysis_outcome() {
            2
        } else {
            1
        }
    }

    fn spinner(&self, message: String) -> Option<ProgressBar> {
        if self.quiet || self.renderer.is_json() {
            return None;
        }

        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg} [{elapsed}]")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(message);
        pb.enable_steady_tick(Duration::from_millis(120));
        Some(pb)
    }

    fn history(&self) -> History {
        History::new(self.config.history.alert_threshold)
    }
}

/// Run the selected command. Returns the exit code.
async fn run(args: Args) -> Result<i32> {
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);
    config.validate().context("Invalid configuration")?;

    console::set_colors_enabled(config.display.color);

    let client = HttpApiClient::new(&config.api.base_url, config.api.timeout_seconds)
        .context("Failed to create API client")?;
    debug!("Using analysis API at {}", client.base_url());
    let api: Arc<dyn AnalysisApi> = Arc::new(client);
    let palette = if args.is_json() {
        Palette::plain()
    } else {
        Palette::from_config(&config.display)
    };
    let renderer = Renderer::new(palette, args.is_json());

    let Some(command) = args.command.clone() else {
        return Ok(0);
    };

    let app = App {
        api,
        config,
        renderer,
        quiet: args.quiet,
    };

    match command {
        Command::Analyze {
            text,
            stdin,
            no_wait,
        } => {
            let text = match text {
                Some(text) if !stdin => text,
                _ => std::io::read_to_string(std::io::stdin())
                    .context("Failed to read ticket text from stdin")?,
            };
            analyze(&app, &text, no_wait).await
        }
        Command::Track { id } => track(&app, id).await,
        Command::Status { id } => status(&app, id).await,
        Command::Enqueue { text, file } => enqueue(&app, text, file).await,
        Command::History {
            alerts,
            fail_on_alert,
        } => show_history(&app, alerts, fail_on_alert).await,
        Command::Watch { alerts } => watch(&app, alerts).await,
        Command::Delete { id } => delete(&app, id).await,
        Command::Clear { alerts } => clear(&app, alerts).await,
        ref download @ Command::Download { ref output, .. } => match download.download_target() {
            Some(target) => save_download(&app, target, output.clone()).await,
            None => Ok(1),
        },
    }
}

async fn analyze(app: &App, text: &str, no_wait: bool) -> Result<i32> {
    let mut tracker = StatusTracker::new(app.api.clone(), PollPolicy::from(&app.config.polling));

    let id = match tracker.submit(text).await {
        Ok(id) => id,
        Err(err) => return Ok(app.fail(&err)),
    };

    if no_wait {
        tracker.cancel();
        if app.renderer.is_json() {
            app.print(&serde_json::json!({ "analysis_id": id }).to_string());
        } else {
            println!("📨 Submitted analysis {}", id);
            println!("   Follow it with: watchdog track {}", id);
        }
        return Ok(0);
    }

    follow(app, &mut tracker, &id).await
}

async fn track(app: &App, id: AnalysisId) -> Result<i32> {
    let mut tracker = StatusTracker::new(app.api.clone(), PollPolicy::from(&app.config.polling));
    tracker.track(id.clone());
    follow(app, &mut tracker, &id).await
}

/// Drive a tracker to resolution, showing a spinner until it resolves.
async fn follow(app: &App, tracker: &mut StatusTracker, id: &AnalysisId) -> Result<i32> {
    let spinner = app.spinner(format!("Analyzing ticket {}...", id));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let resolved = match &spinner {
        None => tokio::select! {
            _ = &mut ctrl_c => false,
            _ = tracker.wait() => true,
        },
        Some(pb) => loop {
            tokio::select! {
                _ = &mut ctrl_c => break false,
                event = tracker.next_event() => match event {
                    Some(PollEvent::Pending { attempt }) => {
                        pb.set_message(format!("Analyzing ticket {}... ({} checks)", id, attempt));
                    }
                    Some(_) | None => break true,
                }
            }
        },
    };

    if let Some(pb) = &spinner {
        pb.finish_and_clear();
    }

    if !resolved {
        tracker.cancel();
        eprintln!("⏹  Stopped tracking {}. Resume with: watchdog track {}", id, id);
        return Ok(1);
    }

    match tracker.state() {
        TrackerState::Resolved(request) => {
            app.print(&app.renderer.analysis(&request));
            Ok(0)
        }
        TrackerState::Failed { error, .. } => {
            // A failed analysis still gets its card; other errors only the message
            match tracker.request() {
                Some(request) if matches!(error, WatchdogError::AnalysisFailed(_)) => {
                    app.print(&app.renderer.analysis(request));
                    Ok(2)
                }
                _ => Ok(app.fail(&error)),
            }
        }
        TrackerState::Idle | TrackerState::Tracking { .. } => {
            warn!("Tracking of {} ended without a result", id);
            Ok(1)
        }
    }
}

async fn status(app: &App, id: AnalysisId) -> Result<i32> {
    match app.api.fetch_status(&id).await {
        Ok(snapshot) => {
            app.print(&app.renderer.analysis(&snapshot.into_request(id)));
            Ok(0)
        }
        Err(err) => Ok(app.fail(&WatchdogError::StatusFetch(err.to_string()))),
    }
}

async fn enqueue(app: &App, text: Option<String>, file: Option<PathBuf>) -> Result<i32> {
    let mut history = app.history();

    let outcome = match (file, text) {
        (Some(path), _) => history
            .enqueue_file(app.api.as_ref(), &path)
            .await
            .map(|count| format!("Queued {} tickets from {}", count, path.display())),
        (None, Some(text)) => history
            .enqueue_text(app.api.as_ref(), &text)
            .await
            .map(|()| "Ticket queued for analysis".to_string()),
        (None, None) => Err(WatchdogError::Validation(
            error::EMPTY_TEXT_MESSAGE.to_string(),
        )),
    };

    match outcome {
        Ok(message) => {
            app.print(&app.renderer.success(&message));
            Ok(0)
        }
        Err(err) => Ok(app.fail(&err)),
    }
}

async fn show_history(app: &App, alerts: bool, fail_on_alert: bool) -> Result<i32> {
    let mut history = app.history();
    if let Err(err) = history.refresh(app.api.as_ref()).await {
        return Ok(app.fail(&err));
    }

    let alert_entries = history.alerts();
    let entries: Vec<_> = if alerts {
        alert_entries.clone()
    } else {
        history.entries().iter().collect()
    };
    app.print(&app.renderer.history(&entries, alerts));

    if fail_on_alert && !alert_entries.is_empty() {
        eprintln!(
            "\n⛔ {} alerts at or above urgency {}. Failing (exit code 2).",
            alert_entries.len(),
            history.alert_threshold()
        );
        return Ok(2);
    }

    Ok(0)
}

/// Refresh the history on a timer until Ctrl-C.
async fn watch(app: &App, alerts: bool) -> Result<i32> {
    let period = Duration::from_secs(app.config.history.refresh_interval_secs);
    let mut history = app.history();
    let mut refresher = HistoryRefresher::spawn(app.api.clone(), period);
    let term = console::Term::stdout();

    info!("Refreshing history every {}s", period.as_secs());
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                refresher.stop();
                info!("Stopped watching");
                break;
            }
            outcome = refresher.next() => {
                let Some(outcome) = outcome else { break };
                match history.apply_refresh(outcome) {
                    Ok(true) => render_watch(app, &history, alerts, period, &term),
                    Ok(false) => {}
                    Err(err) if app.renderer.is_json() => {
                        app.fail(&err);
                    }
                    Err(_) => render_watch(app, &history, alerts, period, &term),
                }
            }
        }
    }

    Ok(0)
}

/// Redraw the watch screen. After a failed refresh the last good data stays
/// on screen with the error in the footer.
fn render_watch(
    app: &App,
    history: &History,
    alerts: bool,
    period: Duration,
    term: &console::Term,
) {
    let entries: Vec<_> = if alerts {
        history.alerts()
    } else {
        history.entries().iter().collect()
    };

    if app.renderer.is_json() {
        app.print(&app.renderer.history(&entries, alerts));
        return;
    }

    if term.is_term() {
        if let Err(e) = term.clear_screen() {
            debug!("Could not clear the screen: {}", e);
        }
    }
    app.print(&app.renderer.history(&entries, alerts));

    let at = history
        .refreshed_at()
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "never".to_string());
    match history.last_error() {
        Some(err) => println!("\n{}\nShowing data from {}", app.renderer.error(err), at),
        None if !app.quiet => {
            println!("\nUpdated {} · every {}s · Ctrl-C to stop", at, period.as_secs())
        }
        None => {}
    }
}

async fn delete(app: &App, id: AnalysisId) -> Result<i32> {
    let mut history = app.history();
    if let Err(err) = history.refresh(app.api.as_ref()).await {
        warn!("Could not load history before delete: {}", err);
    }

    match history.delete(app.api.as_ref(), &id).await {
        Ok(()) => {
            app.print(&app.renderer.success(&format!(
                "Deleted analysis {} ({} remaining)",
                id,
                history.entries().len()
            )));
            Ok(0)
        }
        Err(err) => Ok(app.fail(&err)),
    }
}

async fn clear(app: &App, alerts: bool) -> Result<i32> {
    let mut history = app.history();
    if let Err(err) = history.refresh(app.api.as_ref()).await {
        warn!("Could not load history before clearing: {}", err);
    }

    let before = history.entries().len();
    let outcome = if alerts {
        history.clear_alerts(app.api.as_ref()).await
    } else {
        history.clear_all(app.api.as_ref()).await
    };

    match outcome {
        Ok(()) => {
            let removed = before - history.entries().len();
            let message = if alerts {
                format!("Cleared {} alerts", removed)
            } else {
                format!("Cleared history ({} entries)", removed)
            };
            app.print(&app.renderer.success(&message));
            Ok(0)
        }
        Err(err) => Ok(app.fail(&err)),
    }
}

async fn save_download(app: &App, target: DownloadTarget, output: Option<PathBuf>) -> Result<i32> {
    let spinner = app.spinner("Downloading results...".to_string());
    let fetched = app.api.download(&target).await;
    if let Some(pb) = &spinner {
        pb.finish_and_clear();
    }

    let saved = fetched.and_then(|download| export::save(&download, &target, output.as_deref()));
    match saved {
        Ok(path) => {
            app.print(&app.renderer.success(&format!("Saved {}", path.display())));
            Ok(0)
        }
        Err(err) => Ok(app.fail(&err)),
    }
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            debug!("Loaded default config from {}", DEFAULT_CONFIG_FILE);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {:#}", e);
            Ok(Config::default())
        }
    }
}
