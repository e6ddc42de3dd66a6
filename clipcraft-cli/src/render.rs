//! Terminal rendering of runs and events

use chrono::Utc;
use clipcraft_core::domain::analysis::{AnalysisReport, GeneratedClip, Sentiment};
use clipcraft_core::domain::event::{RunEvent, RunEventKind};
use clipcraft_core::domain::highlight::{Highlight, HighlightKind, format_offset};
use clipcraft_core::domain::run::{PipelineRun, RunStatus};
use clipcraft_core::domain::stage::StageStatus;
use colored::*;
use std::time::Duration;

const BAR_WIDTH: usize = 20;

/// Print one event as a timeline line
///
/// `run` supplies stage titles; any snapshot of the same run will do.
pub fn print_event(event: &RunEvent, run: &PipelineRun) {
    let time = event.timestamp.format("%H:%M:%S").to_string().dimmed();
    let title = |stage_id: &str| {
        run.stages
            .iter()
            .find(|s| s.id == stage_id)
            .map(|s| s.title.clone())
            .unwrap_or_else(|| stage_id.to_string())
    };

    match &event.kind {
        RunEventKind::Started => {
            println!("{} {} Run {} started", time, "▸".cyan(), run.id);
        }
        RunEventKind::StageStarted { stage_id } => {
            println!(
                "{} {} {}",
                time,
                format!("[{}/{}]", event.stage_index + 1, run.stages.len()).cyan(),
                title(stage_id).bold()
            );
        }
        RunEventKind::Progress { .. } => {
            println!(
                "{}       {} {:>3}%",
                time,
                progress_bar(event.percent, BAR_WIDTH),
                event.percent
            );
        }
        RunEventKind::StageCompleted { stage_id } => {
            println!("{}   {} {} completed", time, "✓".green(), title(stage_id));
        }
        RunEventKind::HighlightsDetected { count } => {
            println!(
                "{}   {} {} highlight(s) detected",
                time,
                "★".yellow(),
                count
            );
        }
        RunEventKind::AnalysisUpdated => {
            println!("{}   {} Analysis updated", time, "◆".blue());
        }
        RunEventKind::ClipsGenerated { count } => {
            println!("{}   {} {} clip(s) generated", time, "✂".green(), count);
        }
        RunEventKind::Completed => {
            println!("{} {}", time, "Run completed".green().bold());
        }
        RunEventKind::Failed { stage_id, reason } => {
            println!(
                "{} {} {}: {}",
                time,
                "✗".red(),
                format!("{} failed", title(stage_id)).red().bold(),
                reason
            );
        }
        RunEventKind::Halted { reason } => {
            println!("{} {} {}", time, "Run halted:".red().bold(), reason);
        }
        RunEventKind::Cancelled => {
            println!("{} {}", time, "Run cancelled".yellow());
        }
        RunEventKind::Reset { attempt } => {
            println!(
                "{} {} Retrying (attempt {})",
                time,
                "↻".cyan(),
                attempt
            );
        }
    }
}

/// Print the summary, stage table and highlights of a run
pub fn print_run_details(run: &PipelineRun) {
    let now = Utc::now();
    let summary = run.summary(now);

    println!("{}", "Run Details:".bold());
    println!("  ID:          {}", run.id.to_string().cyan());
    println!("  Video:       {}", run.video_ref);
    println!("  Status:      {}", colorize_run_status(&run.status));
    println!("  Attempt:     {}", run.attempt);
    println!(
        "  Progress:    {} {}%",
        progress_bar(summary.overall_percent, BAR_WIDTH),
        summary.overall_percent
    );
    println!(
        "  Stages:      {}/{} completed",
        summary.completed_stages, summary.total_stages
    );
    println!("  Elapsed:     {}s", summary.elapsed_secs);
    if let Some(score) = summary.engagement_score {
        println!("  Engagement:  {}/100", score);
    }
    if let Some(score) = summary.quality_score {
        println!("  Quality:     {}/100", score);
    }
    if summary.clip_count > 0 {
        println!("  Clips:       {}", summary.clip_count);
    } else if summary.estimated_clips > 0 {
        println!("  Clips:       ~{} estimated", summary.estimated_clips);
    }

    if let Some(failure) = &run.failure {
        println!(
            "  Failure:     {} ({})",
            failure.reason.red(),
            failure.stage_id.dimmed()
        );
    }

    println!("\n{}", "Stages:".bold());
    for (index, stage) in run.stages.iter().enumerate() {
        let marker = if index == run.current_stage_index && !run.status.is_terminal() {
            "▸".cyan()
        } else {
            " ".normal()
        };
        let elapsed = stage
            .duration(now)
            .map(|d| format!("{}s", d.num_seconds()))
            .unwrap_or_else(|| "-".to_string());

        println!(
            "  {} {:<24} {:<11} {:>3}%  {:>5}",
            marker,
            stage.title,
            colorize_stage_status(&stage.status),
            stage.progress_percent,
            elapsed
        );
        if let Some(task) = &stage.current_task
            && stage.status == StageStatus::Running
        {
            println!("      {}", task.dimmed());
        }
    }

    if !run.highlights.is_empty() {
        println!("\n{}", "Highlights:".bold());
        for highlight in &run.highlights {
            print_highlight(highlight);
        }
    }

    if !run.analysis.is_empty() {
        print_analysis(&run.analysis);
    }

    if !run.clips.is_empty() {
        println!("\n{}", "Clips:".bold());
        for clip in &run.clips {
            print_clip(clip);
        }
    }
}

fn print_analysis(report: &AnalysisReport) {
    println!("\n{}", "Analysis:".bold());
    println!(
        "  Clip length: {}",
        format_duration(report.clip_duration())
    );
    if let Some(sentiment) = report.sentiment {
        println!("  Sentiment:   {}", sentiment_line(sentiment));
    }
    if !report.topics.is_empty() {
        let topics: Vec<String> = report
            .topics
            .iter()
            .map(|t| format!("{} ({:.0}%)", t.name, t.weight * 100.0))
            .collect();
        println!("  Topics:      {}", topics.join(", "));
    }
    if !report.keywords.is_empty() {
        let keywords: Vec<String> = report
            .keywords
            .iter()
            .map(|k| format!("{} x{}", k.word, k.frequency))
            .collect();
        println!("  Keywords:    {}", keywords.join(", "));
    }

    if !report.emotional_moments.is_empty() {
        println!("  Emotional moments:");
        for moment in &report.emotional_moments {
            println!(
                "    {} {}",
                format_offset(moment.offset).cyan(),
                moment.description
            );
        }
    }
    if !report.suggested_titles.is_empty() {
        println!("  Suggested titles:");
        for title in &report.suggested_titles {
            println!(
                "    {} {}",
                format!("{:>3}%", title.success_rate).green(),
                title.text
            );
        }
    }
    if !report.recommendations.is_empty() {
        println!("  Recommendations:");
        for rec in &report.recommendations {
            println!("    {} {}", rec.title.bold(), rec.description.dimmed());
        }
    }
    if !report.strengths.is_empty() {
        println!("  Strengths:");
        for strength in &report.strengths {
            println!("    {} {}", "+".green(), strength);
        }
    }
}

fn print_clip(clip: &GeneratedClip) {
    println!(
        "  #{:<3} {} {} {}",
        clip.id,
        clip.range_label().cyan(),
        clip.title.bold(),
        format!("({})", format_duration(clip.duration())).dimmed()
    );
}

/// Render a sentiment split as `78% positive, 18% neutral, 4% negative`
pub fn sentiment_line(sentiment: Sentiment) -> String {
    format!(
        "{}% positive, {}% neutral, {}% negative",
        sentiment.positive, sentiment.neutral, sentiment.negative
    )
}

fn print_highlight(highlight: &Highlight) {
    println!(
        "  {} {} {}",
        highlight.range_label().cyan(),
        highlight.title.bold(),
        format!("[{}]", colorize_highlight_kind(&highlight.kind)).dimmed()
    );
    println!("      {}", highlight.description);
}

/// Render a percentage as a fixed-width bar
pub fn progress_bar(percent: u8, width: usize) -> String {
    let filled = usize::from(percent.min(100)) * width / 100;
    format!("[{}{}]", "#".repeat(filled), ".".repeat(width - filled))
}

/// Render a duration as `Xm YYs`, or `Ys` under a minute
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else {
        format!("{}m {:02}s", secs / 60, secs % 60)
    }
}

/// Colorize run status for display
pub fn colorize_run_status(status: &RunStatus) -> ColoredString {
    let status_str = status.to_string();
    match status {
        RunStatus::Pending => status_str.yellow(),
        RunStatus::Running => status_str.cyan(),
        RunStatus::Completed => status_str.green(),
        RunStatus::Failed => status_str.red(),
        RunStatus::Cancelled => status_str.dimmed(),
    }
}

/// Colorize stage status for display
pub fn colorize_stage_status(status: &StageStatus) -> ColoredString {
    let status_str = status.to_string();
    match status {
        StageStatus::Pending => status_str.dimmed(),
        StageStatus::Running => status_str.cyan(),
        StageStatus::Completed => status_str.green(),
        StageStatus::Failed => status_str.red(),
    }
}

fn colorize_highlight_kind(kind: &HighlightKind) -> ColoredString {
    let kind_str = kind.to_string();
    match kind {
        HighlightKind::HighEngagement => kind_str.green(),
        HighlightKind::KeyMoment => kind_str.blue(),
        HighlightKind::EmotionalPeak => kind_str.magenta(),
        HighlightKind::Transition => kind_str.normal(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_bar() {
        assert_eq!(progress_bar(0, 10), "[..........]");
        assert_eq!(progress_bar(45, 10), "[####......]");
        assert_eq!(progress_bar(100, 10), "[##########]");
        assert_eq!(progress_bar(250, 4), "[####]");
    }

    #[test]
    fn test_sentiment_line() {
        let sentiment = Sentiment {
            positive: 78,
            neutral: 18,
            negative: 4,
        };
        assert_eq!(
            sentiment_line(sentiment),
            "78% positive, 18% neutral, 4% negative"
        );
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(42)), "42s");
        assert_eq!(format_duration(Duration::from_secs(120)), "2m 00s");
        assert_eq!(format_duration(Duration::from_secs(14 * 60 + 5)), "14m 05s");
    }
}
