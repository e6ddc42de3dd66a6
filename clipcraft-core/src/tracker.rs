//! Progress tracker
//!
//! Single owner of one [`PipelineRun`]. Every mutation goes through here and
//! returns the events it produced, in the order the transitions happened.
//!
//! Rules enforced:
//! - stages run strictly in registry order, none is skipped
//! - at most one stage is Running at a time
//! - a stage never goes back from Completed to Running
//! - terminal runs only leave their status through an explicit [`retry`]
//!
//! [`retry`]: ProgressTracker::retry

use chrono::Utc;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::event::{RunEvent, RunEventKind};
use crate::domain::analysis::{AnalysisReport, GeneratedClip};
use crate::domain::highlight::Highlight;
use crate::domain::run::{PipelineRun, RunStatus, StageFailure};
use crate::domain::stage::{StageOutput, StageStatus};
use crate::error::{CoreError, Result};

/// Percentage added to the current stage by each [`ProgressTracker::advance`]
pub const DEFAULT_PROGRESS_STEP: u8 = 25;

/// Owns a run and applies state transitions to it
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    run: PipelineRun,
    step: u8,
    next_sequence: u64,
    baseline_estimates: Vec<Duration>,
}

impl ProgressTracker {
    /// Takes ownership of a run
    pub fn new(run: PipelineRun) -> Self {
        let baseline_estimates = run
            .stages
            .iter()
            .map(|s| s.estimated_time_remaining)
            .collect();

        Self {
            run,
            step: DEFAULT_PROGRESS_STEP,
            next_sequence: 0,
            baseline_estimates,
        }
    }

    /// Sets the advance step, clamped to 1..=100
    pub fn with_step(mut self, step: u8) -> Self {
        self.step = step.clamp(1, 100);
        self
    }

    pub fn run(&self) -> &PipelineRun {
        &self.run
    }

    pub fn run_id(&self) -> Uuid {
        self.run.id
    }

    pub fn status(&self) -> RunStatus {
        self.run.status
    }

    /// Moves a pending run to Running and activates the first stage
    pub fn start(&mut self) -> Result<Vec<RunEvent>> {
        if self.run.status != RunStatus::Pending {
            return Err(self.invalid("start"));
        }
        if self.run.stages.is_empty() {
            return Err(CoreError::EmptyPipeline);
        }

        let now = Utc::now();
        self.run.status = RunStatus::Running;
        self.run.started_at = Some(now);
        self.run.completed_at = None;
        self.run.current_stage_index = 0;

        let mut events = vec![self.event(RunEventKind::Started)];
        events.push(self.activate_current());
        Ok(events)
    }

    /// Records progress reported by the worker of the Running stage
    ///
    /// Progress never goes backwards: values at or below the current percent
    /// are ignored, though `remaining` is still updated.
    pub fn report_progress(
        &mut self,
        percent: u8,
        remaining: Option<Duration>,
    ) -> Result<Vec<RunEvent>> {
        if percent > 100 {
            return Err(CoreError::InvalidProgress(percent));
        }
        if self.run.status != RunStatus::Running {
            return Err(self.invalid("report progress"));
        }

        let idx = self.run.current_stage_index;
        let stage = &mut self.run.stages[idx];
        if let Some(remaining) = remaining {
            stage.estimated_time_remaining = remaining;
        }
        if percent <= stage.progress_percent {
            return Ok(Vec::new());
        }

        stage.progress_percent = percent;
        if percent == 100 {
            stage.estimated_time_remaining = Duration::ZERO;
        }
        let stage_id = stage.id.clone();

        Ok(vec![self.event(RunEventKind::Progress { stage_id })])
    }

    /// Moves the Running stage toward 100% by the tracker's step
    ///
    /// Never completes the stage; that is left to [`advance`](Self::advance).
    pub fn step_progress(&mut self) -> Result<Vec<RunEvent>> {
        if self.run.status != RunStatus::Running {
            return Err(self.invalid("step progress"));
        }
        let current = self.run.stages[self.run.current_stage_index].progress_percent;
        let next = current.saturating_add(self.step).min(100);
        self.report_progress(next, None)
    }

    /// Sets the human-readable task of the Running stage
    pub fn set_current_task(&mut self, task: impl Into<String>) -> Result<()> {
        if self.run.status != RunStatus::Running {
            return Err(self.invalid("set task"));
        }
        let idx = self.run.current_stage_index;
        self.run.stages[idx].current_task = Some(task.into());
        Ok(())
    }

    /// Drives the run one step forward
    ///
    /// A pending run is started. A Running stage below 100% moves toward it
    /// by the tracker's step; a stage at 100% is completed and the next one
    /// activated, or the run is completed when no stages remain.
    pub fn advance(&mut self) -> Result<Vec<RunEvent>> {
        match self.run.status {
            RunStatus::Pending => return self.start(),
            RunStatus::Running => {}
            _ => return Err(self.invalid("advance")),
        }

        let mut events = Vec::new();
        let idx = self.run.current_stage_index;

        if self.run.stages[idx].progress_percent < 100 {
            events.extend(self.step_progress()?);
            if self.run.stages[idx].progress_percent < 100 {
                return Ok(events);
            }
        }

        events.push(self.complete_current());

        if idx + 1 < self.run.stages.len() {
            self.run.current_stage_index = idx + 1;
            events.push(self.activate_current());
        } else {
            self.run.status = RunStatus::Completed;
            self.run.completed_at = Some(Utc::now());
            events.push(self.event(RunEventKind::Completed));
        }

        Ok(events)
    }

    /// Marks the run Cancelled
    ///
    /// A no-op on terminal runs: nothing changes and no event is produced.
    pub fn cancel(&mut self) -> Vec<RunEvent> {
        if self.run.status.is_terminal() {
            return Vec::new();
        }

        self.run.status = RunStatus::Cancelled;
        self.run.completed_at = Some(Utc::now());
        vec![self.event(RunEventKind::Cancelled)]
    }

    /// Fails the Running stage and with it the whole run
    pub fn fail(&mut self, stage_id: &str, reason: impl Into<String>) -> Result<Vec<RunEvent>> {
        let idx = self
            .run
            .stage_index(stage_id)
            .ok_or_else(|| CoreError::UnknownStage {
                run_id: self.run.id,
                stage_id: stage_id.to_string(),
            })?;

        if self.run.status != RunStatus::Running
            || idx != self.run.current_stage_index
            || self.run.stages[idx].status != StageStatus::Running
        {
            return Err(self.invalid("fail stage"));
        }

        let now = Utc::now();
        let reason = reason.into();

        let stage = &mut self.run.stages[idx];
        stage.status = StageStatus::Failed;
        stage.completed_at = Some(now);
        stage.current_task = None;

        self.run.status = RunStatus::Failed;
        self.run.completed_at = Some(now);
        self.run.failure = Some(StageFailure {
            stage_id: stage_id.to_string(),
            reason: reason.clone(),
        });

        Ok(vec![self.event(RunEventKind::Failed {
            stage_id: stage_id.to_string(),
            reason,
        })])
    }

    /// Resets a failed or cancelled run to Pending at stage 0
    ///
    /// The run then behaves exactly like a fresh one; only `attempt` and
    /// the event sequence carry over.
    pub fn retry(&mut self) -> Result<Vec<RunEvent>> {
        if !matches!(self.run.status, RunStatus::Failed | RunStatus::Cancelled) {
            return Err(self.invalid("retry"));
        }

        for (stage, estimate) in self.run.stages.iter_mut().zip(&self.baseline_estimates) {
            stage.status = StageStatus::Pending;
            stage.progress_percent = 0;
            stage.estimated_time_remaining = *estimate;
            stage.current_task = None;
            stage.started_at = None;
            stage.completed_at = None;
        }

        self.run.current_stage_index = 0;
        self.run.status = RunStatus::Pending;
        self.run.started_at = None;
        self.run.completed_at = None;
        self.run.failure = None;
        self.run.highlights.clear();
        self.run.analysis = AnalysisReport::default();
        self.run.clips.clear();
        self.run.attempt += 1;

        let attempt = self.run.attempt;
        Ok(vec![self.event(RunEventKind::Reset { attempt })])
    }

    /// Records highlights found while the run is in flight
    pub fn attach_highlights(&mut self, highlights: Vec<Highlight>) -> Result<Vec<RunEvent>> {
        if self.run.status != RunStatus::Running {
            return Err(self.invalid("attach highlights"));
        }
        if highlights.is_empty() {
            return Ok(Vec::new());
        }

        let count = highlights.len();
        self.run.highlights.extend(highlights);
        Ok(vec![self.event(RunEventKind::HighlightsDetected { count })])
    }

    /// Merges a stage's partial analysis report into the run's
    pub fn attach_analysis(&mut self, report: AnalysisReport) -> Result<Vec<RunEvent>> {
        if self.run.status != RunStatus::Running {
            return Err(self.invalid("attach analysis"));
        }
        if report.is_empty() {
            return Ok(Vec::new());
        }

        self.run.analysis.merge(report);
        Ok(vec![self.event(RunEventKind::AnalysisUpdated)])
    }

    /// Records clips cut by the clip generation stage
    pub fn attach_clips(&mut self, clips: Vec<GeneratedClip>) -> Result<Vec<RunEvent>> {
        if self.run.status != RunStatus::Running {
            return Err(self.invalid("attach clips"));
        }
        if clips.is_empty() {
            return Ok(Vec::new());
        }

        let count = clips.len();
        self.run.clips.extend(clips);
        Ok(vec![self.event(RunEventKind::ClipsGenerated { count })])
    }

    /// Records everything a completed stage produced
    pub fn record_output(&mut self, output: StageOutput) -> Result<Vec<RunEvent>> {
        if self.run.status != RunStatus::Running {
            return Err(self.invalid("record output"));
        }

        let mut events = self.attach_highlights(output.highlights)?;
        if let Some(report) = output.analysis {
            events.extend(self.attach_analysis(report)?);
        }
        events.extend(self.attach_clips(output.clips)?);
        Ok(events)
    }

    /// Fails the run after an internal error
    ///
    /// For transitions the driver relied on but the tracker rejected. The
    /// Running stage, if there is one, fails with the run. A no-op on
    /// terminal runs.
    pub fn halt(&mut self, reason: impl Into<String>) -> Vec<RunEvent> {
        if self.run.status.is_terminal() {
            return Vec::new();
        }

        let now = Utc::now();
        let reason = reason.into();

        let idx = self.run.current_stage_index;
        let stage_id = match self.run.stages.get_mut(idx) {
            Some(stage) => {
                if stage.status == StageStatus::Running {
                    stage.status = StageStatus::Failed;
                    stage.completed_at = Some(now);
                    stage.current_task = None;
                }
                stage.id.clone()
            }
            None => String::new(),
        };

        self.run.status = RunStatus::Failed;
        self.run.completed_at = Some(now);
        self.run.failure = Some(StageFailure {
            stage_id,
            reason: reason.clone(),
        });

        vec![self.event(RunEventKind::Halted { reason })]
    }

    fn activate_current(&mut self) -> RunEvent {
        let idx = self.run.current_stage_index;
        let stage = &mut self.run.stages[idx];
        stage.status = StageStatus::Running;
        stage.started_at = Some(Utc::now());
        let stage_id = stage.id.clone();

        self.event(RunEventKind::StageStarted { stage_id })
    }

    fn complete_current(&mut self) -> RunEvent {
        let idx = self.run.current_stage_index;
        let stage = &mut self.run.stages[idx];
        stage.status = StageStatus::Completed;
        stage.progress_percent = 100;
        stage.estimated_time_remaining = Duration::ZERO;
        stage.current_task = None;
        stage.completed_at = Some(Utc::now());
        let stage_id = stage.id.clone();

        self.event(RunEventKind::StageCompleted { stage_id })
    }

    fn event(&mut self, kind: RunEventKind) -> RunEvent {
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        let stage_index = self.run.current_stage_index;
        let percent = self
            .run
            .stages
            .get(stage_index)
            .map(|s| s.progress_percent)
            .unwrap_or(0);

        RunEvent {
            run_id: self.run.id,
            sequence,
            stage_index,
            percent,
            status: self.run.status,
            kind,
            timestamp: Utc::now(),
        }
    }

    fn invalid(&self, action: &'static str) -> CoreError {
        CoreError::invalid_transition(self.run.id, self.run.status, action)
    }
}
