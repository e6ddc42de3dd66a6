//! Highlight domain types
//!
//! Highlights are read-only annotations on the source video, produced by
//! the content understanding stage.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{CoreError, Result};

/// Kind of moment a highlight marks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HighlightKind {
    HighEngagement,
    KeyMoment,
    EmotionalPeak,
    Transition,
}

impl std::fmt::Display for HighlightKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HighlightKind::HighEngagement => write!(f, "high-engagement"),
            HighlightKind::KeyMoment => write!(f, "key-moment"),
            HighlightKind::EmotionalPeak => write!(f, "emotional-peak"),
            HighlightKind::Transition => write!(f, "transition"),
        }
    }
}

/// An annotated time range within a source video
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Highlight {
    pub id: u32,
    #[serde(rename = "type")]
    pub kind: HighlightKind,
    pub start_offset: Duration,
    pub end_offset: Duration,
    pub title: String,
    pub description: String,
}

impl Highlight {
    /// Creates a highlight, rejecting empty or inverted ranges
    pub fn new(
        id: u32,
        kind: HighlightKind,
        start_offset: Duration,
        end_offset: Duration,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<Self> {
        if end_offset <= start_offset {
            return Err(CoreError::InvalidHighlight {
                start_secs: start_offset.as_secs(),
                end_secs: end_offset.as_secs(),
            });
        }

        Ok(Self {
            id,
            kind,
            start_offset,
            end_offset,
            title: title.into(),
            description: description.into(),
        })
    }

    /// Length of the highlighted range
    pub fn duration(&self) -> Duration {
        self.end_offset - self.start_offset
    }

    /// Renders the range as `m:ss - m:ss`
    pub fn range_label(&self) -> String {
        format!(
            "{} - {}",
            format_offset(self.start_offset),
            format_offset(self.end_offset)
        )
    }
}

/// Formats an offset as minutes and zero-padded seconds
pub fn format_offset(offset: Duration) -> String {
    let secs = offset.as_secs();
    format!("{}:{:02}", secs / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_highlight_rejects_inverted_range() {
        let err = Highlight::new(
            1,
            HighlightKind::KeyMoment,
            Duration::from_secs(75),
            Duration::from_secs(15),
            "intro",
            "",
        )
        .unwrap_err();

        assert_eq!(
            err,
            CoreError::InvalidHighlight {
                start_secs: 75,
                end_secs: 15
            }
        );
    }

    #[test]
    fn test_highlight_rejects_empty_range() {
        let at = Duration::from_secs(30);
        assert!(Highlight::new(1, HighlightKind::Transition, at, at, "cut", "").is_err());
    }

    #[test]
    fn test_range_label() {
        let highlight = Highlight::new(
            3,
            HighlightKind::EmotionalPeak,
            Duration::from_secs(892),
            Duration::from_secs(967),
            "Success story",
            "A personal story that lands",
        )
        .unwrap();

        assert_eq!(highlight.range_label(), "14:52 - 16:07");
        assert_eq!(highlight.duration(), Duration::from_secs(75));
    }

    #[test]
    fn test_kind_serializes_kebab_case() {
        let highlight = Highlight::new(
            1,
            HighlightKind::HighEngagement,
            Duration::from_secs(15),
            Duration::from_secs(75),
            "Hook",
            "Strong opening",
        )
        .unwrap();

        let value = serde_json::to_value(&highlight).unwrap();
        assert_eq!(value["type"], "high-engagement");
    }
}
