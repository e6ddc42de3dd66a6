//! Pipeline run domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::analysis::{AnalysisReport, GeneratedClip, estimate_clips};
use super::highlight::Highlight;
use super::stage::{Stage, StageDefinition, StageStatus};

/// One end-to-end execution of the pipeline for a single video
///
/// Readers get snapshots of this structure; only the
/// [`ProgressTracker`](crate::tracker::ProgressTracker) mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: Uuid,
    pub video_ref: String,
    pub stages: Vec<Stage>,
    pub current_stage_index: usize,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub failure: Option<StageFailure>,
    pub highlights: Vec<Highlight>,
    pub analysis: AnalysisReport,
    pub clips: Vec<GeneratedClip>,
    /// 1 for the first attempt, incremented by every retry
    pub attempt: u32,
}

/// Run execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    /// Completed, Failed and Cancelled are terminal
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled
        )
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Pending => write!(f, "Pending"),
            RunStatus::Running => write!(f, "Running"),
            RunStatus::Completed => write!(f, "Completed"),
            RunStatus::Failed => write!(f, "Failed"),
            RunStatus::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// Why a run failed, kept for display next to the retry affordance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFailure {
    pub stage_id: String,
    pub reason: String,
}

/// Aggregate view of a run's progress
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub completed_stages: usize,
    pub total_stages: usize,
    pub overall_percent: u8,
    pub elapsed_secs: i64,
    pub highlight_count: usize,
    /// Clips generated so far, or expected from the highlights found
    pub estimated_clips: usize,
    pub clip_count: usize,
    pub engagement_score: Option<u8>,
    pub quality_score: Option<u8>,
}

impl PipelineRun {
    /// Creates a pending run with one stage per definition
    pub fn new<'a>(
        video_ref: impl Into<String>,
        definitions: impl IntoIterator<Item = &'a StageDefinition>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            video_ref: video_ref.into(),
            stages: definitions
                .into_iter()
                .map(Stage::from_definition)
                .collect(),
            current_stage_index: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            status: RunStatus::Pending,
            failure: None,
            highlights: Vec::new(),
            analysis: AnalysisReport::default(),
            clips: Vec::new(),
            attempt: 1,
        }
    }

    /// The stage at `current_stage_index`
    pub fn current_stage(&self) -> Option<&Stage> {
        self.stages.get(self.current_stage_index)
    }

    /// Position of a stage by id
    pub fn stage_index(&self, stage_id: &str) -> Option<usize> {
        self.stages.iter().position(|s| s.id == stage_id)
    }

    pub fn completed_stages(&self) -> usize {
        self.stages
            .iter()
            .filter(|s| s.status == StageStatus::Completed)
            .count()
    }

    /// Mean progress across all stages
    pub fn overall_progress(&self) -> u8 {
        if self.stages.is_empty() {
            return 0;
        }
        let total: u32 = self
            .stages
            .iter()
            .map(|s| u32::from(s.progress_percent))
            .sum();
        (total / self.stages.len() as u32) as u8
    }

    /// Time since the run started, frozen once it finishes
    pub fn elapsed(&self, now: DateTime<Utc>) -> chrono::Duration {
        match self.started_at {
            Some(started) => self
                .completed_at
                .unwrap_or(now)
                .signed_duration_since(started),
            None => chrono::Duration::zero(),
        }
    }

    /// Clips generated, or the number the highlights will be cut into
    pub fn estimated_clips(&self) -> usize {
        if !self.clips.is_empty() {
            return self.clips.len();
        }
        estimate_clips(&self.highlights, self.analysis.clip_duration())
    }

    pub fn summary(&self, now: DateTime<Utc>) -> RunSummary {
        RunSummary {
            completed_stages: self.completed_stages(),
            total_stages: self.stages.len(),
            overall_percent: self.overall_progress(),
            elapsed_secs: self.elapsed(now).num_seconds(),
            highlight_count: self.highlights.len(),
            estimated_clips: self.estimated_clips(),
            clip_count: self.clips.len(),
            engagement_score: self.analysis.engagement_score,
            quality_score: self.analysis.quality_score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::StageRegistry;

    #[test]
    fn test_new_run_is_pending() {
        let registry = StageRegistry::default_pipeline();
        let run = PipelineRun::new("video.mp4", registry.iter());

        assert_eq!(run.status, RunStatus::Pending);
        assert_eq!(run.stages.len(), 4);
        assert_eq!(run.current_stage_index, 0);
        assert_eq!(run.attempt, 1);
        assert!(run.stages.iter().all(|s| s.status == StageStatus::Pending));
        assert!(run.analysis.is_empty());
        assert!(run.clips.is_empty());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!RunStatus::Pending.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(RunStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_summary_counts() {
        let registry = StageRegistry::default_pipeline();
        let mut run = PipelineRun::new("video.mp4", registry.iter());
        run.stages[0].progress_percent = 100;
        run.stages[0].status = StageStatus::Completed;
        run.stages[1].progress_percent = 75;

        let summary = run.summary(Utc::now());
        assert_eq!(summary.completed_stages, 1);
        assert_eq!(summary.total_stages, 4);
        assert_eq!(summary.overall_percent, 43);
        assert_eq!(summary.elapsed_secs, 0);
        assert_eq!(summary.estimated_clips, 0);
        assert_eq!(summary.quality_score, None);
        assert_eq!(run.stage_index("expression-analysis"), Some(2));
        assert_eq!(run.stage_index("missing"), None);
    }
}
