//! Color choices for terminal output.

use crate::config::DisplayConfig;
use crate::models::{AnalysisStatus, Emotion, UrgencyScore};
use console::{Color, Style};
use std::collections::HashMap;
use std::ops::RangeInclusive;
use tracing::warn;

/// Parse a color name (`red`, `cyan`, ...) or a 256-color index (`208`).
pub fn parse_color(name: &str) -> Option<Color> {
    let name = name.trim().to_ascii_lowercase();
    let color = match name.as_str() {
        "black" => Color::Black,
        "red" => Color::Red,
        "green" => Color::Green,
        "yellow" => Color::Yellow,
        "blue" => Color::Blue,
        "magenta" | "purple" => Color::Magenta,
        "cyan" => Color::Cyan,
        "white" | "gray" | "grey" => Color::White,
        other => Color::Color256(other.parse().ok()?),
    };
    Some(color)
}

/// Styles for emotions, urgency bands and statuses.
#[derive(Debug, Clone)]
pub struct Palette {
    emotions: HashMap<String, Style>,
    fallback_emotion: Style,
    statuses: HashMap<AnalysisStatus, Style>,
    bands: Vec<(RangeInclusive<u8>, Style)>,
    enabled: bool,
}

impl Palette {
    pub fn from_config(display: &DisplayConfig) -> Self {
        let mut emotions: HashMap<String, Style> = display
            .emotion_colors
            .iter()
            .filter_map(|(label, color)| Some((label.to_ascii_lowercase(), style_for(color)?)))
            .collect();
        let fallback_emotion = emotions.remove("other").unwrap_or_default();

        let statuses = display
            .status_colors
            .iter()
            .filter_map(|(name, color)| {
                let status = match name.to_ascii_lowercase().as_str() {
                    "pending" => AnalysisStatus::Pending,
                    "complete" | "completed" => AnalysisStatus::Complete,
                    "failed" => AnalysisStatus::Failed,
                    other => {
                        warn!("Ignoring color for unknown status '{}'", other);
                        return None;
                    }
                };
                Some((status, style_for(color)?))
            })
            .collect();

        let bands = display
            .urgency_bands
            .iter()
            .filter_map(|band| Some((band.min..=band.max, style_for(&band.color)?)))
            .collect();

        Self {
            emotions,
            fallback_emotion,
            statuses,
            bands,
            enabled: display.color,
        }
    }

    /// A palette that never styles anything.
    pub fn plain() -> Self {
        Self {
            emotions: HashMap::new(),
            fallback_emotion: Style::new(),
            statuses: HashMap::new(),
            bands: Vec::new(),
            enabled: false,
        }
    }

    pub fn emotion(&self, emotion: &Emotion) -> &Style {
        self.emotions
            .get(&emotion.label().to_ascii_lowercase())
            .unwrap_or(&self.fallback_emotion)
    }

    /// Style of the first band containing `score`.
    pub fn urgency(&self, score: UrgencyScore) -> Style {
        self.bands
            .iter()
            .find(|(range, _)| range.contains(&score.value()))
            .map(|(_, style)| style.clone())
            .unwrap_or_default()
    }

    pub fn status(&self, status: AnalysisStatus) -> Style {
        self.statuses.get(&status).cloned().unwrap_or_default()
    }

    /// Apply `style` to `text` if colors are enabled.
    pub fn paint(&self, style: &Style, text: impl std::fmt::Display) -> String {
        if self.enabled {
            style.apply_to(text).to_string()
        } else {
            text.to_string()
        }
    }
}

fn style_for(color: &str) -> Option<Style> {
    match parse_color(color) {
        Some(color) => Some(Style::new().fg(color)),
        None => {
            warn!("Ignoring unknown color '{}'", color);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UrgencyBand;

    fn score(value: u8) -> UrgencyScore {
        UrgencyScore::new(value).unwrap()
    }

    #[test]
    fn test_parse_color() {
        assert_eq!(parse_color("Red"), Some(Color::Red));
        assert_eq!(parse_color("208"), Some(Color::Color256(208)));
        assert_eq!(parse_color("256"), None);
        assert_eq!(parse_color("infrared"), None);
    }

    #[test]
    fn test_default_urgency_bands() {
        let palette = Palette::from_config(&DisplayConfig::default());
        assert_eq!(palette.urgency(score(1)), Style::new().fg(Color::Green));
        assert_eq!(palette.urgency(score(2)), Style::new().fg(Color::Color256(154)));
        assert_eq!(palette.urgency(score(4)), Style::new().fg(Color::Color256(208)));
        assert_eq!(palette.urgency(score(5)), Style::new().fg(Color::Red));
        assert_eq!(palette.urgency(score(10)), Style::new().fg(Color::Red));
    }

    #[test]
    fn test_custom_bands_and_emotions() {
        let mut display = DisplayConfig::default();
        display.urgency_bands = vec![UrgencyBand {
            min: 8,
            max: 10,
            color: "magenta".to_string(),
        }];
        display
            .emotion_colors
            .insert("frustration".to_string(), "cyan".to_string());

        let palette = Palette::from_config(&display);
        assert_eq!(palette.urgency(score(9)), Style::new().fg(Color::Magenta));
        assert_eq!(palette.urgency(score(3)), Style::new());
        assert_eq!(
            palette.emotion(&Emotion::from("frustration")),
            &Style::new().fg(Color::Cyan)
        );
        assert_eq!(
            palette.emotion(&Emotion::from("boredom")),
            &Style::new().fg(Color::White)
        );
        assert_eq!(
            palette.emotion(&Emotion::Anger),
            &Style::new().fg(Color::Red)
        );
    }

    #[test]
    fn test_paint_respects_enabled_flag() {
        let plain = Palette::plain();
        assert_eq!(plain.paint(&Style::new().red(), "x"), "x");

        let palette = Palette::from_config(&DisplayConfig::default());
        let painted = palette.paint(&Style::new().red().force_styling(true), "x");
        assert!(painted.contains("\u{1b}["));
    }
}
