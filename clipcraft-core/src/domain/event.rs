//! Run event types
//!
//! Every state transition the tracker makes is described by one
//! [`RunEvent`]. Observers render timelines and progress bars from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::run::RunStatus;

/// A single state transition of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEvent {
    pub run_id: Uuid,
    /// Monotonic per run, across retries
    pub sequence: u64,
    pub stage_index: usize,
    /// Progress of the stage at `stage_index`
    pub percent: u8,
    pub status: RunStatus,
    pub kind: RunEventKind,
    pub timestamp: DateTime<Utc>,
}

/// What happened
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEventKind {
    Started,
    StageStarted { stage_id: String },
    Progress { stage_id: String },
    StageCompleted { stage_id: String },
    HighlightsDetected { count: usize },
    AnalysisUpdated,
    ClipsGenerated { count: usize },
    Completed,
    Failed { stage_id: String, reason: String },
    /// The run was stopped after an internal error
    Halted { reason: String },
    Cancelled,
    Reset { attempt: u32 },
}

impl RunEventKind {
    /// Whether this event ends the run
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunEventKind::Completed
                | RunEventKind::Failed { .. }
                | RunEventKind::Halted { .. }
                | RunEventKind::Cancelled
        )
    }
}
