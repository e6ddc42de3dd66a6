//! Stage domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::analysis::{AnalysisReport, GeneratedClip};
use super::highlight::Highlight;

/// Definition of a pipeline stage
///
/// Stage definitions are immutable input; each run builds its own
/// [`Stage`] records from them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDefinition {
    pub id: String,
    pub title: String,
    pub description: String,
    pub estimated_duration: Duration,
}

impl StageDefinition {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        estimated_duration: Duration,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: description.into(),
            estimated_duration,
        }
    }
}

/// One stage of a run
///
/// Owned exclusively by its [`PipelineRun`](super::run::PipelineRun).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage {
    pub id: String,
    pub title: String,
    pub description: String,
    pub progress_percent: u8,
    pub estimated_time_remaining: Duration,
    pub status: StageStatus,
    /// What the stage is doing right now, for display
    pub current_task: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Stage {
    /// Creates a pending stage from its definition
    pub fn from_definition(definition: &StageDefinition) -> Self {
        Self {
            id: definition.id.clone(),
            title: definition.title.clone(),
            description: definition.description.clone(),
            progress_percent: 0,
            estimated_time_remaining: definition.estimated_duration,
            status: StageStatus::Pending,
            current_task: None,
            started_at: None,
            completed_at: None,
        }
    }

    /// Time spent in this stage, if it has started
    pub fn duration(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        let started = self.started_at?;
        Some(self.completed_at.unwrap_or(now).signed_duration_since(started))
    }
}

/// What a stage produced when it completed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageOutput {
    pub highlights: Vec<Highlight>,
    /// Partial report, merged into the run's
    pub analysis: Option<AnalysisReport>,
    pub clips: Vec<GeneratedClip>,
}

impl StageOutput {
    pub fn is_empty(&self) -> bool {
        self.highlights.is_empty() && self.analysis.is_none() && self.clips.is_empty()
    }
}

/// Stage execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageStatus::Pending => write!(f, "Pending"),
            StageStatus::Running => write!(f, "Running"),
            StageStatus::Completed => write!(f, "Completed"),
            StageStatus::Failed => write!(f, "Failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_from_definition() {
        let def = StageDefinition::new(
            "speech-to-text",
            "Speech to text",
            "Transcribe the audio track",
            Duration::from_secs(120),
        );

        let stage = Stage::from_definition(&def);
        assert_eq!(stage.id, "speech-to-text");
        assert_eq!(stage.status, StageStatus::Pending);
        assert_eq!(stage.progress_percent, 0);
        assert_eq!(stage.estimated_time_remaining, Duration::from_secs(120));
        assert!(stage.duration(Utc::now()).is_none());
    }

    #[test]
    fn test_stage_status_serializes_as_variant_name() {
        let json = serde_json::to_string(&StageStatus::Running).unwrap();
        assert_eq!(json, "\"Running\"");
    }
}
