//! Analysis output of a run
//!
//! The content understanding and expression analysis stages each fill in
//! part of an [`AnalysisReport`]; clip generation turns highlights into
//! [`GeneratedClip`]s no longer than the report's optimal clip duration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::highlight::{Highlight, format_offset};

/// Clip length used when no stage has suggested one
pub const DEFAULT_CLIP_DURATION: Duration = Duration::from_secs(45);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub name: String,
    /// Relative prominence, 0.0 to 1.0
    pub weight: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keyword {
    pub word: String,
    pub frequency: u32,
}

/// Share of the transcript per sentiment, in percent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sentiment {
    pub positive: u8,
    pub neutral: u8,
    pub negative: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmotionalMoment {
    pub offset: Duration,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestedTitle {
    pub text: String,
    /// Predicted success rate in percent
    pub success_rate: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub title: String,
    pub description: String,
}

/// What the analysis stages learned about the video
///
/// Stages contribute partial reports which are merged into the run's.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub engagement_score: Option<u8>,
    pub quality_score: Option<u8>,
    pub optimal_clip_duration: Option<Duration>,
    pub strengths: Vec<String>,
    pub topics: Vec<Topic>,
    pub keywords: Vec<Keyword>,
    pub sentiment: Option<Sentiment>,
    pub emotional_moments: Vec<EmotionalMoment>,
    pub suggested_titles: Vec<SuggestedTitle>,
    pub recommendations: Vec<Recommendation>,
}

impl AnalysisReport {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Folds a stage's partial report into this one
    ///
    /// Scores and sentiment from `other` replace existing values; lists are
    /// appended.
    pub fn merge(&mut self, other: AnalysisReport) {
        self.engagement_score = other.engagement_score.or(self.engagement_score);
        self.quality_score = other.quality_score.or(self.quality_score);
        self.optimal_clip_duration = other.optimal_clip_duration.or(self.optimal_clip_duration);
        self.sentiment = other.sentiment.or(self.sentiment);
        self.strengths.extend(other.strengths);
        self.topics.extend(other.topics);
        self.keywords.extend(other.keywords);
        self.emotional_moments.extend(other.emotional_moments);
        self.suggested_titles.extend(other.suggested_titles);
        self.recommendations.extend(other.recommendations);
    }

    /// Clip length to cut highlights into
    pub fn clip_duration(&self) -> Duration {
        self.optimal_clip_duration
            .filter(|d| !d.is_zero())
            .unwrap_or(DEFAULT_CLIP_DURATION)
    }
}

/// A short clip cut from a highlight
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedClip {
    pub id: u32,
    pub highlight_id: u32,
    pub title: String,
    pub start_offset: Duration,
    pub end_offset: Duration,
}

impl GeneratedClip {
    pub fn duration(&self) -> Duration {
        self.end_offset - self.start_offset
    }

    pub fn range_label(&self) -> String {
        format!(
            "{} - {}",
            format_offset(self.start_offset),
            format_offset(self.end_offset)
        )
    }
}

/// Cuts every highlight into consecutive clips of at most `max_len`
///
/// Clip ids are numbered from 1 in highlight order. A highlight that needs
/// more than one clip gets a part number in its clip titles.
pub fn plan_clips(highlights: &[Highlight], max_len: Duration) -> Vec<GeneratedClip> {
    let mut clips = Vec::new();
    if max_len.is_zero() {
        return clips;
    }

    for highlight in highlights {
        let parts = clip_count(highlight.duration(), max_len);
        let mut start = highlight.start_offset;

        for part in 1..=parts {
            let end = (start + max_len).min(highlight.end_offset);
            let title = if parts > 1 {
                format!("{} (part {})", highlight.title, part)
            } else {
                highlight.title.clone()
            };

            clips.push(GeneratedClip {
                id: clips.len() as u32 + 1,
                highlight_id: highlight.id,
                title,
                start_offset: start,
                end_offset: end,
            });
            start = end;
        }
    }

    clips
}

/// Number of clips [`plan_clips`] would produce
pub fn estimate_clips(highlights: &[Highlight], max_len: Duration) -> usize {
    if max_len.is_zero() {
        return 0;
    }
    highlights
        .iter()
        .map(|h| clip_count(h.duration(), max_len))
        .sum()
}

fn clip_count(length: Duration, max_len: Duration) -> usize {
    let length = length.as_millis();
    let max_len = max_len.as_millis();
    length.div_ceil(max_len) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::highlight::HighlightKind;

    fn highlight(id: u32, start: u64, end: u64) -> Highlight {
        Highlight::new(
            id,
            HighlightKind::KeyMoment,
            Duration::from_secs(start),
            Duration::from_secs(end),
            format!("Moment {}", id),
            "",
        )
        .unwrap()
    }

    #[test]
    fn test_merge_keeps_earlier_values() {
        let mut report = AnalysisReport {
            engagement_score: Some(87),
            topics: vec![Topic {
                name: "ai".to_string(),
                weight: 0.9,
            }],
            ..Default::default()
        };

        report.merge(AnalysisReport {
            quality_score: Some(94),
            strengths: vec!["Clear audio".to_string()],
            ..Default::default()
        });

        assert_eq!(report.engagement_score, Some(87));
        assert_eq!(report.quality_score, Some(94));
        assert_eq!(report.topics.len(), 1);
        assert_eq!(report.strengths, vec!["Clear audio".to_string()]);
        assert!(!report.is_empty());
        assert!(AnalysisReport::default().is_empty());
    }

    #[test]
    fn test_plan_clips_splits_long_highlights() {
        let highlights = vec![highlight(1, 15, 75), highlight(2, 245, 280)];

        let clips = plan_clips(&highlights, Duration::from_secs(45));

        assert_eq!(clips.len(), 3);
        assert_eq!(clips[0].title, "Moment 1 (part 1)");
        assert_eq!(clips[0].range_label(), "0:15 - 1:00");
        assert_eq!(clips[1].start_offset, Duration::from_secs(60));
        assert_eq!(clips[1].duration(), Duration::from_secs(15));
        assert_eq!(clips[2].title, "Moment 2");
        assert_eq!(clips[2].highlight_id, 2);
        assert_eq!(
            clips.iter().map(|c| c.id).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(estimate_clips(&highlights, Duration::from_secs(45)), 3);
    }

    #[test]
    fn test_zero_clip_length_falls_back() {
        let report = AnalysisReport {
            optimal_clip_duration: Some(Duration::ZERO),
            ..Default::default()
        };
        assert_eq!(report.clip_duration(), DEFAULT_CLIP_DURATION);
        assert!(plan_clips(&[highlight(1, 0, 10)], Duration::ZERO).is_empty());
    }
}
