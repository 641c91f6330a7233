//! Text and JSON rendering of analyses and history.

use super::palette::Palette;
use crate::error::WatchdogError;
use crate::models::{AnalysisRequest, AnalysisStatus, UrgencyScore};
use console::Style;
use serde::Serialize;

const TOPIC_WIDTH: usize = 28;

/// Renders every command's output with one palette and format.
#[derive(Debug, Clone)]
pub struct Renderer {
    palette: Palette,
    json: bool,
}

impl Renderer {
    pub fn new(palette: Palette, json: bool) -> Self {
        Self { palette, json }
    }

    pub fn is_json(&self) -> bool {
        self.json
    }

    /// Full view of one analysis.
    pub fn analysis(&self, request: &AnalysisRequest) -> String {
        if self.json {
            return to_json(request);
        }

        let p = &self.palette;
        let mut out = format!(
            "Analysis {}  {}\n",
            p.paint(&Style::new().bold(), &request.id),
            self.status(request.status)
        );

        if !request.text.is_empty() {
            out.push_str(&format!("  Ticket:   {}\n", request.text.trim()));
        }

        match (&request.status, &request.result, &request.error_message) {
            (AnalysisStatus::Complete, Some(result), _) => {
                out.push_str(&format!(
                    "  Emotion:  {}\n",
                    p.paint(p.emotion(&result.emotion), capitalize(result.emotion.label()))
                ));
                out.push_str(&format!("  Topic:    {}\n", result.topic));
                out.push_str(&format!(
                    "  Urgency:  {}\n",
                    self.urgency_bar(result.urgency_score)
                ));
                out.push_str(&format!("  Summary:  {}\n", result.summary));
            }
            (AnalysisStatus::Failed, _, message) => {
                out.push_str(&format!(
                    "  Error:    {}\n",
                    message.as_deref().unwrap_or("Analysis failed.")
                ));
            }
            _ => out.push_str("  Waiting for the analysis to finish...\n"),
        }

        out
    }

    /// History listing; `alerts_only` only changes the heading.
    pub fn history(&self, entries: &[&AnalysisRequest], alerts_only: bool) -> String {
        if self.json {
            return to_json(&entries);
        }

        let heading = if alerts_only { "Alerts" } else { "History" };
        if entries.is_empty() {
            return if alerts_only {
                "No alerts.\n".to_string()
            } else {
                "No analyses yet.\n".to_string()
            };
        }

        let mut out = format!("{} ({} entries)\n", heading, entries.len());
        out.push_str(&format!(
            "{:<10} {:<9} {:<10} {:<7} {:<width$} {}\n",
            "ID",
            "STATUS",
            "EMOTION",
            "URGENCY",
            "TOPIC",
            "CREATED",
            width = TOPIC_WIDTH
        ));

        for entry in entries {
            let (emotion, urgency, topic) = match &entry.result {
                Some(result) => (
                    self.palette.paint(
                        self.palette.emotion(&result.emotion),
                        format!("{:<10}", result.emotion.label()),
                    ),
                    self.palette.paint(
                        &self.palette.urgency(result.urgency_score),
                        format!("{:<7}", result.urgency_score.to_string()),
                    ),
                    truncate(&result.topic, TOPIC_WIDTH),
                ),
                None => (format!("{:<10}", "-"), format!("{:<7}", "-"), "-".to_string()),
            };

            let created = entry
                .created_at
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default();

            out.push_str(&format!(
                "{:<10} {} {} {} {:<width$} {}\n",
                entry.id.as_str(),
                self.palette.paint(
                    &self.palette.status(entry.status),
                    format!("{:<9}", entry.status.to_string())
                ),
                emotion,
                urgency,
                topic,
                created,
                width = TOPIC_WIDTH
            ));
        }

        out
    }

    pub fn error(&self, err: &WatchdogError) -> String {
        if self.json {
            return to_json(&serde_json::json!({ "error": err.user_message() }));
        }
        format!(
            "{} {}",
            self.palette.paint(&Style::new().red(), "✗"),
            err.user_message()
        )
    }

    pub fn success(&self, message: &str) -> String {
        if self.json {
            return to_json(&serde_json::json!({ "ok": true, "message": message }));
        }
        format!("{} {}", self.palette.paint(&Style::new().green(), "✓"), message)
    }

    /// Ten-cell bar followed by the score, e.g. `████████░░ 8/10`.
    pub fn urgency_bar(&self, score: UrgencyScore) -> String {
        let filled = usize::from(score.value());
        let bar = format!(
            "{}{}",
            "█".repeat(filled),
            "░".repeat(usize::from(UrgencyScore::MAX) - filled)
        );
        format!(
            "{} {}",
            self.palette.paint(&self.palette.urgency(score), bar),
            score
        )
    }

    fn status(&self, status: AnalysisStatus) -> String {
        self.palette.paint(&self.palette.status(status), status)
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("{{\"error\":\"{}\"}}", e))
}

fn capitalize(label: &str) -> String {
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let cut: String = text.chars().take(width.saturating_sub(1)).collect();
    format!("{}…", cut)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AnalysisId;
    use crate::testing::{completed_request, pending_request, sample_result};

    fn plain() -> Renderer {
        Renderer::new(Palette::plain(), false)
    }

    #[test]
    fn test_result_card_shows_urgency_out_of_ten() {
        let id = AnalysisId::parse("abc123").unwrap();
        let mut request = AnalysisRequest::pending(id, "my order never arrived");
        request.complete(sample_result("anger", "shipping", 8)).unwrap();

        let card = plain().analysis(&request);

        assert!(card.starts_with("Analysis abc123  COMPLETE\n"));
        assert!(card.contains("Emotion:  Anger"));
        assert!(card.contains("Topic:    shipping"));
        assert!(card.contains("████████░░ 8/10"));
        assert!(card.contains("Ticket:   my order never arrived"));
    }

    #[test]
    fn test_failed_and_pending_cards() {
        let mut failed = pending_request("7");
        failed.fail("model unavailable").unwrap();
        assert!(plain().analysis(&failed).contains("Error:    model unavailable"));

        assert!(plain()
            .analysis(&pending_request("8"))
            .contains("Waiting for the analysis"));
    }

    #[test]
    fn test_history_table() {
        let a = completed_request("1", 9);
        let b = pending_request("2");
        let table = plain().history(&[&a, &b], false);

        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0], "History (2 entries)");
        assert!(lines[1].starts_with("ID"));
        assert!(lines[2].starts_with("1          COMPLETE  anger      9/10"));
        assert!(lines[3].starts_with("2          PENDING   -"));

        assert_eq!(plain().history(&[], true), "No alerts.\n");
    }

    #[test]
    fn test_json_output() {
        let renderer = Renderer::new(Palette::plain(), true);
        let a = completed_request("1", 9);

        let value: serde_json::Value =
            serde_json::from_str(&renderer.history(&[&a], true)).unwrap();
        assert_eq!(value[0]["id"], "1");
        assert_eq!(value[0]["status"], "COMPLETE");
        assert_eq!(value[0]["result"]["urgency_score"], 9);

        let err = WatchdogError::Validation("Please enter some text to analyze.".to_string());
        let value: serde_json::Value = serde_json::from_str(&renderer.error(&err)).unwrap();
        assert_eq!(value["error"], "Please enter some text to analyze.");
    }

    #[test]
    fn test_truncate_and_capitalize() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a very long topic name", 8), "a very …");
        assert_eq!(capitalize("delight"), "Delight");
    }
}
