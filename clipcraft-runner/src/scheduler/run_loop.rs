//! Run loop
//!
//! Drives a single run on its own timer. The loop owns the run's tracker
//! for as long as it executes and hands it back through its join handle
//! once the run reaches a terminal status.
//!
//! Every run the loop gives up on ends terminal: a tracker error halts the
//! run and is reported to subscribers like any other transition.

use anyhow::{Context as AnyhowContext, Result, anyhow};
use clipcraft_core::{CoreError, ProgressTracker};
use clipcraft_core::domain::event::{RunEvent, RunEventKind};
use clipcraft_core::domain::run::{PipelineRun, RunStatus};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, watch};
use tokio::time::{self, Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::publisher::StatusPublisher;
use crate::service::worker::{StageWorker, StepOutcome};

/// Timer-driven loop advancing one run
pub struct RunLoop {
    tracker: ProgressTracker,
    worker: Arc<dyn StageWorker>,
    publisher: StatusPublisher,
    snapshot: watch::Sender<PipelineRun>,
    cancel: CancellationToken,
    tick_interval: Duration,
    /// Capacity slot, released as soon as the run is terminal
    slot: Option<OwnedSemaphorePermit>,
}

impl RunLoop {
    /// Creates a loop for a tracker
    ///
    /// # Arguments
    /// * `tracker` - Tracker owning the run; moved into the loop
    /// * `worker` - Performs the work of each stage
    /// * `publisher` - Receives every event the run produces
    /// * `snapshot` - Updated with the run state after every tick
    /// * `cancel` - Checked at the start of every tick
    /// * `tick_interval` - Timer period
    pub fn new(
        tracker: ProgressTracker,
        worker: Arc<dyn StageWorker>,
        publisher: StatusPublisher,
        snapshot: watch::Sender<PipelineRun>,
        cancel: CancellationToken,
        tick_interval: Duration,
    ) -> Self {
        Self {
            tracker,
            worker,
            publisher,
            snapshot,
            cancel,
            tick_interval,
            slot: None,
        }
    }

    /// Holds a capacity slot for the lifetime of the run
    ///
    /// The slot is freed before the terminal event is published, so an
    /// observer that saw the run end can start or retry a run right away.
    pub fn with_slot(mut self, slot: OwnedSemaphorePermit) -> Self {
        self.slot = Some(slot);
        self
    }

    /// Runs until the run is terminal, or a tracker error halts it
    pub async fn run(mut self) -> ProgressTracker {
        let run_id = self.tracker.run_id();
        info!(
            "Starting run loop for {} (interval: {:?})",
            run_id, self.tick_interval
        );

        let mut ticker = time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        let mut last_tick = Instant::now();

        if self.tracker.status() == RunStatus::Pending {
            match self.tracker.start() {
                Ok(events) => self.emit(&events),
                Err(e) => {
                    error!("Run {} could not start: {}", run_id, e);
                    self.halt(e.to_string());
                    return self.tracker;
                }
            }
        }

        while !self.tracker.status().is_terminal() {
            ticker.tick().await;
            let now = Instant::now();
            let elapsed = now.duration_since(last_tick);
            last_tick = now;

            if self.cancel.is_cancelled() {
                let events = self.tracker.cancel();
                self.emit(&events);
                break;
            }

            debug!("Tick for run {} ({:?} since last)", run_id, elapsed);

            if let Err(e) = self.tick(elapsed).await {
                error!("Run {} halted: {:#}", run_id, e);
                self.halt(format!("{:#}", e));
                break;
            }
        }

        info!(
            "Run loop for {} finished with status {}",
            run_id,
            self.tracker.status()
        );
        self.tracker
    }

    /// Performs one tick of work on the Running stage
    async fn tick(&mut self, elapsed: Duration) -> Result<()> {
        let run = self.tracker.run();
        let stage = run
            .current_stage()
            .ok_or_else(|| anyhow!("Run {} has no current stage", run.id))?;
        let stage_id = stage.id.clone();

        if stage.progress_percent < 100 {
            let outcome = match self.worker.step(run, stage, elapsed).await {
                Ok(outcome) => outcome,
                Err(e) => StepOutcome::Failed {
                    reason: format!("{:#}", e),
                },
            };

            let events = match outcome {
                StepOutcome::Progress {
                    percent,
                    remaining,
                    task,
                } => {
                    if let Some(task) = task {
                        self.tracker.set_current_task(task)?;
                    }
                    match self.tracker.report_progress(percent, Some(remaining)) {
                        Err(e @ CoreError::InvalidProgress(_)) => {
                            warn!("Worker for stage '{}' reported {}", stage_id, e);
                            self.tracker
                                .fail(&stage_id, format!("Worker reported {}", e))?
                        }
                        other => other?,
                    }
                }
                StepOutcome::Unmeasured => self.tracker.step_progress()?,
                StepOutcome::Failed { reason } => self.tracker.fail(&stage_id, reason)?,
            };
            self.emit(&events);

            if self.tracker.status().is_terminal() {
                return Ok(());
            }
        }

        self.finish_stage_if_done(&stage_id).await
    }

    /// Completes the Running stage once it reaches 100%
    async fn finish_stage_if_done(&mut self, stage_id: &str) -> Result<()> {
        let run = self.tracker.run();
        let done = run
            .current_stage()
            .is_some_and(|s| s.progress_percent >= 100);
        if !done {
            self.publish_snapshot();
            return Ok(());
        }

        let stage = run.current_stage().context("Current stage disappeared")?;
        let produced = self.worker.on_stage_completed(run, stage).await;
        match produced {
            Ok(output) => {
                let events = self.tracker.record_output(output)?;
                self.emit(&events);
            }
            Err(e) => {
                let events = self.tracker.fail(stage_id, format!("{:#}", e))?;
                self.emit(&events);
                return Ok(());
            }
        }

        let events = self.tracker.advance()?;
        self.emit(&events);
        Ok(())
    }

    /// Ends the run after a tracker error and tells subscribers
    fn halt(&mut self, reason: String) {
        let events = self.tracker.halt(reason);
        self.emit(&events);
    }

    fn emit(&mut self, events: &[RunEvent]) {
        if self.tracker.status().is_terminal() {
            self.slot.take();
        }
        for event in events {
            log_event(event);
        }
        self.publisher.publish_all(events);
        self.publish_snapshot();
    }

    fn publish_snapshot(&self) {
        self.snapshot.send_replace(self.tracker.run().clone());
    }
}

fn log_event(event: &RunEvent) {
    match &event.kind {
        RunEventKind::Started => info!("Run {} started", event.run_id),
        RunEventKind::StageStarted { stage_id } => info!(
            "Run {} stage {} '{}' started",
            event.run_id,
            event.stage_index + 1,
            stage_id
        ),
        RunEventKind::Progress { stage_id } => debug!(
            "Run {} stage '{}' at {}%",
            event.run_id, stage_id, event.percent
        ),
        RunEventKind::StageCompleted { stage_id } => {
            info!("Run {} stage '{}' completed", event.run_id, stage_id)
        }
        RunEventKind::HighlightsDetected { count } => {
            info!("Run {} detected {} highlight(s)", event.run_id, count)
        }
        RunEventKind::AnalysisUpdated => debug!("Run {} analysis updated", event.run_id),
        RunEventKind::ClipsGenerated { count } => {
            info!("Run {} generated {} clip(s)", event.run_id, count)
        }
        RunEventKind::Completed => info!("Run {} completed", event.run_id),
        RunEventKind::Failed { stage_id, reason } => warn!(
            "Run {} failed in stage '{}': {}",
            event.run_id, stage_id, reason
        ),
        RunEventKind::Halted { reason } => error!("Run {} halted: {}", event.run_id, reason),
        RunEventKind::Cancelled => info!("Run {} cancelled", event.run_id),
        RunEventKind::Reset { attempt } => {
            info!("Run {} reset for attempt {}", event.run_id, attempt)
        }
    }
}
