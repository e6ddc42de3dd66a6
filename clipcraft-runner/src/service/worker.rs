//! Stage workers
//!
//! A worker performs the actual work of a stage, one timer tick at a time,
//! and reports how far it got. The simulated worker stands in for the
//! speech, vision and clip-cutting backends.

use anyhow::Result;
use async_trait::async_trait;
use clipcraft_core::domain::analysis::{
    AnalysisReport, EmotionalMoment, Keyword, Recommendation, Sentiment, SuggestedTitle, Topic,
    plan_clips,
};
use clipcraft_core::domain::highlight::{Highlight, HighlightKind};
use clipcraft_core::domain::run::PipelineRun;
use clipcraft_core::domain::stage::{Stage, StageOutput};
use clipcraft_core::registry::{
    CLIP_GENERATION, CONTENT_UNDERSTANDING, EXPRESSION_ANALYSIS, SPEECH_TO_TEXT,
};
use std::time::Duration;
use tracing::debug;

/// Result of one tick of stage work
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// Work continues; `percent` is the stage's total progress so far
    Progress {
        percent: u8,
        remaining: Duration,
        task: Option<String>,
    },
    /// Work continues but its progress cannot be measured; the tracker
    /// moves the stage by its configured step
    Unmeasured,
    /// The stage could not complete
    Failed { reason: String },
}

/// Performs the work behind pipeline stages
#[async_trait]
pub trait StageWorker: Send + Sync {
    /// Performs one tick of work on the Running stage
    ///
    /// # Arguments
    /// * `run` - Snapshot of the run being driven
    /// * `stage` - The stage currently Running
    /// * `elapsed` - Real time elapsed since the previous tick
    async fn step(
        &self,
        run: &PipelineRun,
        stage: &Stage,
        elapsed: Duration,
    ) -> Result<StepOutcome>;

    /// Called once a stage completes; returns what the stage produced
    async fn on_stage_completed(&self, _run: &PipelineRun, _stage: &Stage) -> Result<StageOutput> {
        Ok(StageOutput::default())
    }
}

/// Worker that only lets time pass
///
/// Every tick is [`StepOutcome::Unmeasured`], so stages move by the
/// tracker's fixed step regardless of their estimated durations.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimerStageWorker;

#[async_trait]
impl StageWorker for TimerStageWorker {
    async fn step(
        &self,
        _run: &PipelineRun,
        _stage: &Stage,
        _elapsed: Duration,
    ) -> Result<StepOutcome> {
        Ok(StepOutcome::Unmeasured)
    }
}

/// Failure to inject into a simulated run
#[derive(Debug, Clone, PartialEq)]
pub struct InjectedFailure {
    pub stage_id: String,
    /// Progress at which the stage gives up
    pub at_percent: u8,
    pub reason: String,
}

/// Worker that fakes stage progress from estimated durations
///
/// Each tick moves a stage by `elapsed * time_scale / estimated_duration`.
#[derive(Debug, Clone)]
pub struct SimulatedStageWorker {
    time_scale: f64,
    failure: Option<InjectedFailure>,
    /// Only the first attempt fails unless this is set
    fail_every_attempt: bool,
}

impl SimulatedStageWorker {
    /// Creates a worker running `time_scale` times faster than real time
    pub fn new(time_scale: f64) -> Self {
        Self {
            time_scale,
            failure: None,
            fail_every_attempt: false,
        }
    }

    /// Makes `stage_id` fail once it reaches `at_percent`
    pub fn with_failure(
        mut self,
        stage_id: impl Into<String>,
        at_percent: u8,
        reason: impl Into<String>,
    ) -> Self {
        self.failure = Some(InjectedFailure {
            stage_id: stage_id.into(),
            at_percent: at_percent.min(100),
            reason: reason.into(),
        });
        self
    }

    /// Keeps failing on retries too
    pub fn failing_every_attempt(mut self) -> Self {
        self.fail_every_attempt = true;
        self
    }

    /// Progress gained by a stage over `elapsed` real time
    fn increment(&self, stage: &Stage, elapsed: Duration) -> f64 {
        let total = stage.estimated_time_remaining.as_secs_f64()
            / (1.0 - f64::from(stage.progress_percent) / 100.0).max(0.01);
        if total <= 0.0 {
            return 100.0;
        }
        elapsed.as_secs_f64() * self.time_scale / total * 100.0
    }

    fn should_fail(&self, run: &PipelineRun, stage: &Stage, percent: u8) -> Option<String> {
        let failure = self.failure.as_ref()?;
        if failure.stage_id != stage.id {
            return None;
        }
        if run.attempt > 1 && !self.fail_every_attempt {
            return None;
        }
        (percent >= failure.at_percent).then(|| failure.reason.clone())
    }
}

#[async_trait]
impl StageWorker for SimulatedStageWorker {
    async fn step(
        &self,
        run: &PipelineRun,
        stage: &Stage,
        elapsed: Duration,
    ) -> Result<StepOutcome> {
        let current = f64::from(stage.progress_percent);
        let next = (current + self.increment(stage, elapsed)).min(100.0);
        // Always move by at least one point so short ticks still finish
        let percent = (next.floor() as u8)
            .max(stage.progress_percent.saturating_add(1))
            .min(100);

        if let Some(reason) = self.should_fail(run, stage, percent) {
            debug!("Injecting failure into stage '{}' at {}%", stage.id, percent);
            return Ok(StepOutcome::Failed { reason });
        }

        let remaining = stage
            .estimated_time_remaining
            .mul_f64(f64::from(100 - percent) / (100.0 - current).max(1.0));

        Ok(StepOutcome::Progress {
            percent,
            remaining,
            task: Some(task_for(&stage.id, percent).to_string()),
        })
    }

    async fn on_stage_completed(&self, run: &PipelineRun, stage: &Stage) -> Result<StageOutput> {
        let output = match stage.id.as_str() {
            CONTENT_UNDERSTANDING => StageOutput {
                highlights: sample_highlights()?,
                analysis: Some(content_report()),
                ..Default::default()
            },
            EXPRESSION_ANALYSIS => StageOutput {
                analysis: Some(expression_report()),
                ..Default::default()
            },
            CLIP_GENERATION => StageOutput {
                clips: plan_clips(&run.highlights, run.analysis.clip_duration()),
                ..Default::default()
            },
            _ => StageOutput::default(),
        };
        Ok(output)
    }
}

/// Description of what a stage is doing at a given progress
fn task_for(stage_id: &str, percent: u8) -> &'static str {
    match (stage_id, percent) {
        (SPEECH_TO_TEXT, 0..=49) => "Extracting audio track",
        (SPEECH_TO_TEXT, _) => "Transcribing speech",
        (CONTENT_UNDERSTANDING, 0..=49) => "Segmenting transcript",
        (CONTENT_UNDERSTANDING, _) => "Analysing main topics",
        (EXPRESSION_ANALYSIS, 0..=49) => "Detecting faces",
        (EXPRESSION_ANALYSIS, _) => "Scoring expressions and pacing",
        (CLIP_GENERATION, 0..=49) => "Selecting clip boundaries",
        (CLIP_GENERATION, _) => "Rendering clips",
        _ => "Processing",
    }
}

/// The highlights the content understanding stage reports
pub fn sample_highlights() -> clipcraft_core::Result<Vec<Highlight>> {
    let secs = Duration::from_secs;
    Ok(vec![
        Highlight::new(
            1,
            HighlightKind::HighEngagement,
            secs(15),
            secs(75),
            "Strong opening",
            "A hook that grabs the viewer's attention",
        )?,
        Highlight::new(
            2,
            HighlightKind::KeyMoment,
            secs(245),
            secs(320),
            "Core concept explained",
            "The main idea explained in simple terms",
        )?,
        Highlight::new(
            3,
            HighlightKind::EmotionalPeak,
            secs(892),
            secs(967),
            "Inspiring success story",
            "A personal story that lands with the audience",
        )?,
        Highlight::new(
            4,
            HighlightKind::HighEngagement,
            secs(1456),
            secs(1523),
            "Practical tips",
            "Actionable steps for beginners",
        )?,
    ])
}

/// Topics, keywords and title ideas found in the transcript
fn content_report() -> AnalysisReport {
    let topic = |name: &str, weight| Topic {
        name: name.to_string(),
        weight,
    };
    let keyword = |word: &str, frequency| Keyword {
        word: word.to_string(),
        frequency,
    };
    let title = |text: &str, success_rate| SuggestedTitle {
        text: text.to_string(),
        success_rate,
    };

    AnalysisReport {
        engagement_score: Some(87),
        optimal_clip_duration: Some(Duration::from_secs(45)),
        topics: vec![
            topic("artificial intelligence", 0.9),
            topic("programming", 0.7),
            topic("machine learning", 0.6),
            topic("software development", 0.5),
            topic("technology", 0.4),
        ],
        keywords: vec![
            keyword("artificial intelligence", 85),
            keyword("machine learning", 72),
            keyword("data", 68),
            keyword("models", 55),
            keyword("applications", 43),
        ],
        sentiment: Some(Sentiment {
            positive: 78,
            neutral: 18,
            negative: 4,
        }),
        suggested_titles: vec![
            title("The AI secret nobody talks about", 92),
            title("How to start with AI from scratch", 88),
            title("What you need to know about AI", 85),
            title("AI for beginners: a quick guide", 82),
        ],
        ..Default::default()
    }
}

/// Delivery, emotion and production notes from the video track
fn expression_report() -> AnalysisReport {
    let moment = |secs, description: &str| EmotionalMoment {
        offset: Duration::from_secs(secs),
        description: description.to_string(),
    };
    let recommendation = |title: &str, description: &str| Recommendation {
        title: title.to_string(),
        description: description.to_string(),
    };

    AnalysisReport {
        quality_score: Some(94),
        strengths: [
            "High quality educational content",
            "Clear, easy to follow audio",
            "Useful practical examples",
            "Logical flow of information",
            "Good presence on camera",
        ]
        .into_iter()
        .map(String::from)
        .collect(),
        emotional_moments: vec![
            moment(5 * 60 + 23, "Excitement explaining what is possible"),
            moment(12 * 60 + 45, "Pride in technical achievements"),
            moment(18 * 60 + 32, "Encouragement for learners"),
            moment(25 * 60 + 17, "Inspiration for the future"),
        ],
        recommendations: vec![
            recommendation("Add subtitles", "Improves accessibility and watch time"),
            recommendation("Improve lighting", "Better visual quality in short clips"),
            recommendation(
                "Add visual effects",
                "Makes the content more engaging on social platforms",
            ),
        ],
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipcraft_core::registry::StageRegistry;

    fn run_and_stage(stage_idx: usize) -> (PipelineRun, Stage) {
        let registry = StageRegistry::default_pipeline();
        let run = PipelineRun::new("talk.mp4", registry.iter());
        let stage = run.stages[stage_idx].clone();
        (run, stage)
    }

    #[tokio::test]
    async fn test_progress_follows_time_scale() {
        // speech-to-text is estimated at 120s; 6s real at 10x is half of it
        let worker = SimulatedStageWorker::new(10.0);
        let (run, stage) = run_and_stage(0);

        let outcome = worker
            .step(&run, &stage, Duration::from_secs(6))
            .await
            .unwrap();

        match outcome {
            StepOutcome::Progress {
                percent,
                remaining,
                task,
            } => {
                assert_eq!(percent, 50);
                assert_eq!(remaining, Duration::from_secs(60));
                assert_eq!(task.as_deref(), Some("Transcribing speech"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_progress_is_capped_and_always_moves() {
        let worker = SimulatedStageWorker::new(1.0);
        let (run, mut stage) = run_and_stage(0);

        let tiny = worker
            .step(&run, &stage, Duration::from_millis(1))
            .await
            .unwrap();
        assert!(matches!(tiny, StepOutcome::Progress { percent: 1, .. }));

        stage.progress_percent = 99;
        let huge = worker
            .step(&run, &stage, Duration::from_secs(3600))
            .await
            .unwrap();
        assert!(matches!(huge, StepOutcome::Progress { percent: 100, .. }));
    }

    #[tokio::test]
    async fn test_injected_failure_only_on_first_attempt() {
        let worker =
            SimulatedStageWorker::new(1000.0).with_failure(SPEECH_TO_TEXT, 10, "bad audio");
        let (mut run, stage) = run_and_stage(0);

        let outcome = worker
            .step(&run, &stage, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            StepOutcome::Failed {
                reason: "bad audio".to_string()
            }
        );

        run.attempt = 2;
        let outcome = worker
            .step(&run, &stage, Duration::from_secs(1))
            .await
            .unwrap();
        assert!(matches!(outcome, StepOutcome::Progress { .. }));
    }

    #[tokio::test]
    async fn test_failure_ignored_for_other_stages() {
        let worker = SimulatedStageWorker::new(1000.0)
            .with_failure(CLIP_GENERATION, 0, "renderer offline")
            .failing_every_attempt();
        let (run, stage) = run_and_stage(1);

        let outcome = worker
            .step(&run, &stage, Duration::from_secs(1))
            .await
            .unwrap();
        assert!(matches!(outcome, StepOutcome::Progress { .. }));
    }

    #[tokio::test]
    async fn test_highlights_from_content_understanding() {
        let worker = SimulatedStageWorker::new(1.0);

        let (run, stage) = run_and_stage(1);
        let output = worker.on_stage_completed(&run, &stage).await.unwrap();
        assert_eq!(output.highlights.len(), 4);
        assert_eq!(output.highlights[2].kind, HighlightKind::EmotionalPeak);
        let report = output.analysis.unwrap();
        assert_eq!(report.engagement_score, Some(87));
        assert_eq!(report.topics.len(), 5);
        assert!(output.clips.is_empty());

        let (run, stage) = run_and_stage(0);
        assert!(worker.on_stage_completed(&run, &stage).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_expression_analysis_report() {
        let worker = SimulatedStageWorker::new(1.0);
        let (run, stage) = run_and_stage(2);

        let output = worker.on_stage_completed(&run, &stage).await.unwrap();
        let report = output.analysis.unwrap();

        assert_eq!(report.quality_score, Some(94));
        assert_eq!(report.emotional_moments.len(), 4);
        assert_eq!(report.recommendations.len(), 3);
        assert!(output.highlights.is_empty());
    }

    #[tokio::test]
    async fn test_clip_generation_cuts_highlights() {
        let worker = SimulatedStageWorker::new(1.0);
        let (mut run, stage) = run_and_stage(3);
        run.highlights = sample_highlights().unwrap();
        run.analysis = content_report();

        let output = worker.on_stage_completed(&run, &stage).await.unwrap();

        // each sample highlight is longer than 45s and needs two clips
        assert_eq!(output.clips.len(), 8);
        assert_eq!(run.estimated_clips(), 8);
        assert!(
            output
                .clips
                .iter()
                .all(|c| c.duration() <= Duration::from_secs(45))
        );
    }
}
