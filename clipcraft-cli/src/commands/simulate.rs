//! Simulate command
//!
//! Drives one run through the default pipeline and renders its events as
//! they happen.

use anyhow::{Context, Result, bail};
use clap::{Args, ValueEnum};
use clipcraft_core::StageRegistry;
use clipcraft_core::domain::event::RunEvent;
use clipcraft_core::domain::run::{PipelineRun, RunStatus};
use clipcraft_runner::service::{SimulatedStageWorker, StageWorker, TimerStageWorker};
use clipcraft_runner::{RunService, StatusPublisher};
use colored::*;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::{Overrides, load_config};
use crate::render;

/// How stage work is produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum WorkerMode {
    /// Progress follows each stage's estimated duration
    #[default]
    Simulated,
    /// Every tick advances the stage by the fixed progress step
    Timer,
}

/// Arguments of `clipcraft simulate`
#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Video to process (file name or URL)
    pub video: String,

    /// Timer period in milliseconds
    #[arg(long, env = "CLIPCRAFT_TICK_MS")]
    pub tick_ms: Option<u64>,

    /// Simulated seconds of work per real second
    #[arg(long, env = "CLIPCRAFT_TIME_SCALE")]
    pub time_scale: Option<f64>,

    /// Percentage added per tick in timer mode
    #[arg(long, env = "CLIPCRAFT_PROGRESS_STEP")]
    pub progress_step: Option<u8>,

    /// How stage work is produced
    #[arg(long, value_enum, default_value_t = WorkerMode::Simulated)]
    pub mode: WorkerMode,

    /// Stage to fail on the first attempt
    #[arg(long)]
    pub fail_stage: Option<String>,

    /// Progress at which the stage fails
    #[arg(long, default_value_t = 50, requires = "fail_stage")]
    pub fail_at: u8,

    /// Failure reason reported by the stage
    #[arg(long, default_value = "stage failed", requires = "fail_stage")]
    pub fail_reason: String,

    /// Keep failing the stage on retries too
    #[arg(long, requires = "fail_stage")]
    pub fail_every_attempt: bool,

    /// Cancel the run after this many seconds
    #[arg(long)]
    pub cancel_after: Option<u64>,

    /// Retry once if the run fails or is cancelled
    #[arg(long)]
    pub retry: bool,

    /// Print events and the final run as JSON lines
    #[arg(long)]
    pub json: bool,
}

/// Handle `clipcraft simulate`
pub async fn handle_simulate(args: SimulateArgs) -> Result<()> {
    let config = load_config(&Overrides {
        tick_ms: args.tick_ms,
        time_scale: args.time_scale,
        progress_step: args.progress_step,
    })?;

    let registry = StageRegistry::default_pipeline();
    if let Some(stage) = &args.fail_stage
        && registry.get(stage).is_none()
    {
        let known: Vec<&str> = registry.iter().map(|s| s.id.as_str()).collect();
        bail!(
            "Unknown stage '{}' (expected one of: {})",
            stage,
            known.join(", ")
        );
    }

    let worker = build_worker(&args, config.time_scale)?;

    info!(
        "Simulating '{}' (mode: {:?}, tick: {:?}, scale: {})",
        args.video, args.mode, config.tick_interval, config.time_scale
    );

    let publisher = StatusPublisher::new();
    let (_subscription, mut events) = publisher.subscribe_channel();
    let service = Arc::new(RunService::new(config, worker, publisher));

    let run = service
        .start_run(&args.video, registry.into_definitions())
        .await
        .context("Failed to start run")?;

    if let Some(secs) = args.cancel_after {
        let service = Arc::clone(&service);
        let run_id = run.id;
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            if let Err(e) = service.cancel_run(run_id).await {
                warn!("Failed to cancel run {}: {}", run_id, e);
            }
        });
    }

    let mut retried = false;
    let final_run = loop {
        let interrupted = follow_until_terminal(&service, &mut events, &run, args.json).await?;

        let finished = service.wait_for_terminal(run.id).await?;
        let retryable = matches!(finished.status, RunStatus::Failed | RunStatus::Cancelled);
        if args.retry && !retried && !interrupted && retryable {
            retried = true;
            service.retry_run(run.id).await?;
            continue;
        }
        break finished;
    };

    service.shutdown().await;

    if args.json {
        let output = json!({
            "run": final_run,
            "summary": final_run.summary(chrono::Utc::now()),
        });
        println!("{}", serde_json::to_string(&output)?);
    } else {
        println!();
        render::print_run_details(&final_run);
    }

    if let Some(failure) = &final_run.failure {
        bail!(
            "Run failed in stage '{}': {}",
            failure.stage_id,
            failure.reason
        );
    }
    Ok(())
}

/// Worker for the selected mode, with any requested failure injected
fn build_worker(args: &SimulateArgs, time_scale: f64) -> Result<Arc<dyn StageWorker>> {
    match args.mode {
        WorkerMode::Timer => {
            if args.fail_stage.is_some() {
                bail!("--fail-stage needs --mode simulated; timer mode cannot inject failures");
            }
            Ok(Arc::new(TimerStageWorker))
        }
        WorkerMode::Simulated => {
            let mut worker = SimulatedStageWorker::new(time_scale);
            if let Some(stage) = &args.fail_stage {
                worker = worker.with_failure(stage, args.fail_at, &args.fail_reason);
                if args.fail_every_attempt {
                    worker = worker.failing_every_attempt();
                }
            }
            Ok(Arc::new(worker))
        }
    }
}

/// Render events until the current attempt of the run ends
///
/// Ctrl-C requests cancellation instead of killing the process, so the
/// final state is still printed. Returns whether the user interrupted.
async fn follow_until_terminal(
    service: &RunService,
    events: &mut mpsc::UnboundedReceiver<RunEvent>,
    run: &PipelineRun,
    json: bool,
) -> Result<bool> {
    let mut interrupted = false;

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    bail!("Event stream closed before run {} finished", run.id);
                };
                print_event(&event, run, json)?;
                if event.run_id == run.id && event.kind.is_terminal() {
                    return Ok(interrupted);
                }
            }
            result = tokio::signal::ctrl_c(), if !interrupted => {
                result.context("Failed to listen for Ctrl-C")?;
                interrupted = true;
                if !json {
                    println!("{}", "Cancelling...".yellow());
                }
                service
                    .cancel_run(run.id)
                    .await
                    .with_context(|| format!("Failed to cancel run {}", run.id))?;
            }
        }
    }
}

fn print_event(event: &RunEvent, run: &PipelineRun, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(event)?);
    } else {
        render::print_event(event, run);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: SimulateArgs,
    }

    fn parse(argv: &[&str]) -> SimulateArgs {
        let argv = std::iter::once("simulate").chain(argv.iter().copied());
        TestCli::try_parse_from(argv).unwrap().args
    }

    #[test]
    fn test_timer_mode_rejects_failure_injection() {
        let args = parse(&["talk.mp4", "--mode", "timer", "--fail-stage", "speech-to-text"]);

        let err = build_worker(&args, 1.0).err().unwrap();
        assert!(err.to_string().contains("--mode simulated"));
    }

    #[test]
    fn test_build_worker() {
        assert!(build_worker(&parse(&["talk.mp4", "--mode", "timer"]), 1.0).is_ok());
        assert!(
            build_worker(
                &parse(&[
                    "talk.mp4",
                    "--fail-stage",
                    "speech-to-text",
                    "--fail-every-attempt",
                ]),
                1.0
            )
            .is_ok()
        );
    }

    #[test]
    fn test_failure_flags_require_stage() {
        let argv = ["simulate", "talk.mp4", "--fail-every-attempt"];
        assert!(TestCli::try_parse_from(argv).is_err());
    }
}
