//! Run service
//!
//! Entry point for starting, cancelling and retrying pipeline runs.
//! Each run gets its own loop task, cancellation token and snapshot
//! channel; runs share nothing but the publisher.

use clipcraft_core::domain::run::{PipelineRun, RunStatus};
use clipcraft_core::domain::stage::StageDefinition;
use clipcraft_core::{CoreError, ProgressTracker, StageRegistry};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::publisher::StatusPublisher;
use crate::scheduler::RunLoop;
use crate::service::worker::StageWorker;

/// Result type alias for run service operations
pub type Result<T> = std::result::Result<T, ServiceError>;

/// Errors returned by the run service
#[derive(Debug, Error)]
pub enum ServiceError {
    /// No run with this id was started
    #[error("Run not found: {0}")]
    RunNotFound(Uuid),

    /// Too many runs are being driven already
    #[error("At capacity: {0} run(s) already in flight")]
    AtCapacity(usize),

    /// Another retry of this run is still being set up
    #[error("Retry already in progress for run {0}")]
    RetryInProgress(Uuid),

    /// Tracker or registry rejected the operation
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The run's loop task panicked or was aborted
    #[error("Run task failed: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),
}

struct RunEntry {
    snapshot: watch::Receiver<PipelineRun>,
    cancel: CancellationToken,
    task: Option<JoinHandle<ProgressTracker>>,
}

/// Starts and controls pipeline runs
pub struct RunService {
    config: Config,
    worker: Arc<dyn StageWorker>,
    publisher: StatusPublisher,
    runs: Mutex<HashMap<Uuid, RunEntry>>,
    capacity: Arc<Semaphore>,
}

impl RunService {
    /// Creates a new run service
    ///
    /// # Arguments
    /// * `config` - Timer and capacity settings
    /// * `worker` - Performs the work of every stage
    /// * `publisher` - Receives the events of all runs
    pub fn new(config: Config, worker: Arc<dyn StageWorker>, publisher: StatusPublisher) -> Self {
        let capacity = Arc::new(Semaphore::new(config.max_concurrent_runs));
        Self {
            config,
            worker,
            publisher,
            runs: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    pub fn publisher(&self) -> &StatusPublisher {
        &self.publisher
    }

    /// Creates a run for `video_ref` and starts driving it
    ///
    /// Returns the run as created, still Pending; it starts on its loop's
    /// first tick.
    pub async fn start_run(
        &self,
        video_ref: impl Into<String>,
        stage_definitions: Vec<StageDefinition>,
    ) -> Result<PipelineRun> {
        let registry = StageRegistry::new(stage_definitions)?;
        let permit = self.acquire_slot()?;

        let run = PipelineRun::new(video_ref, registry.iter());
        let tracker = ProgressTracker::new(run.clone()).with_step(self.config.progress_step);

        info!(
            "Starting run {} for '{}' ({} stages)",
            run.id,
            run.video_ref,
            registry.len()
        );

        let entry = self.spawn_loop(tracker, permit);
        self.runs.lock().await.insert(run.id, entry);

        Ok(run)
    }

    /// Requests cancellation of a run
    ///
    /// Takes effect on the run's next tick. Cancelling a run that already
    /// finished changes nothing.
    pub async fn cancel_run(&self, run_id: Uuid) -> Result<()> {
        let runs = self.runs.lock().await;
        let entry = runs.get(&run_id).ok_or(ServiceError::RunNotFound(run_id))?;

        if entry.snapshot.borrow().status.is_terminal() {
            debug!("Run {} already finished, cancel ignored", run_id);
            return Ok(());
        }

        entry.cancel.cancel();
        info!("Cancellation requested for run {}", run_id);
        Ok(())
    }

    /// Resets a failed or cancelled run and drives it again from stage 0
    ///
    /// The previous attempt's loop is awaited before a capacity slot is
    /// taken, so the slot it held is free again by then.
    pub async fn retry_run(&self, run_id: Uuid) -> Result<PipelineRun> {
        let task = {
            let mut runs = self.runs.lock().await;
            let entry = runs
                .get_mut(&run_id)
                .ok_or(ServiceError::RunNotFound(run_id))?;

            let status = entry.snapshot.borrow().status;
            if !matches!(status, RunStatus::Failed | RunStatus::Cancelled) {
                return Err(CoreError::invalid_transition(run_id, status, "retry").into());
            }

            entry
                .task
                .take()
                .ok_or(ServiceError::RetryInProgress(run_id))?
        };

        let mut tracker = task.await?;
        let permit = match self.acquire_slot() {
            Ok(permit) => permit,
            Err(e) => {
                warn!("Run {} cannot be retried: {}", run_id, e);
                self.park(run_id, tracker).await;
                return Err(e);
            }
        };

        let events = match tracker.retry() {
            Ok(events) => events,
            Err(e) => {
                warn!("Run {} could not be reset: {}", run_id, e);
                self.park(run_id, tracker).await;
                return Err(e.into());
            }
        };
        self.publisher.publish_all(&events);

        let run = tracker.run().clone();
        info!("Retrying run {} (attempt {})", run_id, run.attempt);

        let entry = self.spawn_loop(tracker, permit);
        self.runs.lock().await.insert(run_id, entry);

        Ok(run)
    }

    /// Latest snapshot of a run
    pub async fn get_run(&self, run_id: Uuid) -> Option<PipelineRun> {
        let runs = self.runs.lock().await;
        runs.get(&run_id).map(|e| e.snapshot.borrow().clone())
    }

    /// Snapshots of all runs, oldest first
    pub async fn list_runs(&self) -> Vec<PipelineRun> {
        let runs = self.runs.lock().await;
        let mut list: Vec<PipelineRun> = runs
            .values()
            .map(|e| e.snapshot.borrow().clone())
            .collect();
        list.sort_by_key(|r| r.created_at);
        list
    }

    /// Receiver of a run's snapshots for its current attempt
    pub async fn watch_run(&self, run_id: Uuid) -> Option<watch::Receiver<PipelineRun>> {
        let runs = self.runs.lock().await;
        runs.get(&run_id).map(|e| e.snapshot.clone())
    }

    /// Waits until the current attempt of a run is terminal
    ///
    /// Also returns if the run's loop stopped early; the snapshot then
    /// shows the status it halted in.
    pub async fn wait_for_terminal(&self, run_id: Uuid) -> Result<PipelineRun> {
        let mut rx = self
            .watch_run(run_id)
            .await
            .ok_or(ServiceError::RunNotFound(run_id))?;

        if let Ok(run) = rx.wait_for(|r| r.status.is_terminal()).await {
            return Ok(run.clone());
        }
        let run = rx.borrow().clone();
        Ok(run)
    }

    /// Cancels every run and waits for their loops to finish
    pub async fn shutdown(&self) {
        let tasks: Vec<(Uuid, JoinHandle<ProgressTracker>)> = {
            let mut runs = self.runs.lock().await;
            runs.iter_mut()
                .filter_map(|(id, entry)| {
                    entry.cancel.cancel();
                    entry.task.take().map(|t| (*id, t))
                })
                .collect()
        };

        for (run_id, task) in tasks {
            match task.await {
                Ok(tracker) => self.park(run_id, tracker).await,
                Err(e) => warn!("Run {} task failed during shutdown: {}", run_id, e),
            }
        }
    }

    fn acquire_slot(&self) -> Result<OwnedSemaphorePermit> {
        Arc::clone(&self.capacity)
            .try_acquire_owned()
            .map_err(|_| ServiceError::AtCapacity(self.config.max_concurrent_runs))
    }

    fn spawn_loop(&self, tracker: ProgressTracker, permit: OwnedSemaphorePermit) -> RunEntry {
        let (tx, snapshot) = watch::channel(tracker.run().clone());
        let cancel = CancellationToken::new();

        let run_loop = RunLoop::new(
            tracker,
            Arc::clone(&self.worker),
            self.publisher.clone(),
            tx,
            cancel.clone(),
            self.config.tick_interval,
        )
        .with_slot(permit);

        let task = tokio::spawn(run_loop.run());

        RunEntry {
            snapshot,
            cancel,
            task: Some(task),
        }
    }

    /// Stores a finished tracker back so the run can be retried later
    async fn park(&self, run_id: Uuid, tracker: ProgressTracker) {
        let mut runs = self.runs.lock().await;
        if let Some(entry) = runs.get_mut(&run_id) {
            entry.task = Some(tokio::spawn(async move { tracker }));
        }
    }
}
