//! Error types for the ClipCraft core

use thiserror::Error;
use uuid::Uuid;

use crate::domain::run::RunStatus;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised by the stage registry and the progress tracker
///
/// A stage failing is not an error here: it is recorded on the run and
/// reported as an event. These variants describe misuse of the API.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// The requested transition is not valid from the run's current status
    #[error("Invalid transition for run {run_id}: cannot {action} while {status}")]
    InvalidTransition {
        run_id: Uuid,
        status: RunStatus,
        action: &'static str,
    },

    /// The named stage does not belong to the run
    #[error("Unknown stage '{stage_id}' in run {run_id}")]
    UnknownStage { run_id: Uuid, stage_id: String },

    /// Progress must be a percentage
    #[error("Invalid progress value: {0} (expected 0-100)")]
    InvalidProgress(u8),

    /// A pipeline needs at least one stage
    #[error("Pipeline has no stages")]
    EmptyPipeline,

    /// Stage ids must be unique within a pipeline
    #[error("Duplicate stage id: {0}")]
    DuplicateStage(String),

    /// Highlight ranges must be non-empty
    #[error("Invalid highlight range: end ({end_secs}s) must be after start ({start_secs}s)")]
    InvalidHighlight { start_secs: u64, end_secs: u64 },
}

impl CoreError {
    /// Create an invalid transition error
    pub fn invalid_transition(run_id: Uuid, status: RunStatus, action: &'static str) -> Self {
        Self::InvalidTransition {
            run_id,
            status,
            action,
        }
    }

    /// Check if this error is an invalid state transition
    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, Self::InvalidTransition { .. })
    }
}
