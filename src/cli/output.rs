//! CLI output formatting

use crate::{
    core::state::{LaunchPhase, RunStatus},
    execution::ExecutionEvent,
    persistence::RunSummary,
};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");
pub static GLOBE: Emoji<'_, '_> = Emoji("🌐 ", "@ ");

/// Create a progress bar
pub fn create_progress_bar(total: usize) -> ProgressBar {
    let progress = ProgressBar::new(total as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

/// Format a run status for display
pub fn format_status(status: RunStatus) -> String {
    match status {
        RunStatus::Pending => style("PENDING").dim().to_string(),
        RunStatus::Running => style("RUNNING").yellow().to_string(),
        RunStatus::Completed => style("COMPLETED").green().to_string(),
        RunStatus::Failed => style("FAILED").red().to_string(),
        RunStatus::Cancelled => style("CANCELLED").yellow().to_string(),
    }
}

/// Format a recorded step status label for display
pub fn format_step_label(label: &str) -> String {
    match label {
        "running" => style("RUNNING").yellow().to_string(),
        "completed" => style("COMPLETED").green().to_string(),
        "failed" => style("FAILED").red().to_string(),
        "skipped" => style("SKIPPED").dim().to_string(),
        _ => style("PENDING").dim().to_string(),
    }
}

/// Format a launch phase for display
pub fn format_phase(phase: LaunchPhase) -> String {
    match phase {
        LaunchPhase::Starting => style("starting").yellow().to_string(),
        LaunchPhase::Watching => style("watching output").yellow().to_string(),
        LaunchPhase::Ready => style("ready").green().to_string(),
        LaunchPhase::Running => style("running").green().to_string(),
    }
}

/// Format a run summary for display
pub fn format_run_summary(summary: &RunSummary) -> String {
    let status_icon = match summary.status {
        RunStatus::Completed => CHECK,
        RunStatus::Failed => CROSS,
        RunStatus::Running => SPINNER,
        RunStatus::Cancelled => WARN,
        _ => INFO,
    };

    let mut line = format!(
        "{} {} - {} - {} - {} ({}/{})",
        status_icon,
        style(&summary.run_id.to_string()[..8]).dim(),
        style(&summary.recipe).bold(),
        style(summary.kind.label()).cyan(),
        format_status(summary.status),
        summary.completed_steps,
        summary.total_steps
    );

    if let Some(url) = &summary.service_url {
        line.push_str(&format!(" - {}", style(url).green()));
    }

    line
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::PipelineStarted {
            run_id,
            pipeline_name,
            kind,
        } => format!(
            "{} Starting {} {} ({})",
            ROCKET,
            style(pipeline_name).bold(),
            style(kind.label()).cyan(),
            style(&run_id.to_string()[..8]).dim()
        ),
        ExecutionEvent::StepStarted { step_id } => {
            format!("{} {}", SPINNER, style(step_id).cyan())
        }
        ExecutionEvent::StepOutput { step_id, output } => {
            format!(
                "{} Output from {}:\n{}",
                INFO,
                style(step_id).dim(),
                format_output(output, 12)
            )
        }
        ExecutionEvent::StepCompleted { step_id } => {
            format!("{} {}", CHECK, style(step_id).green())
        }
        ExecutionEvent::StepSkipped { step_id, reason } => {
            format!("{} {} ({})", INFO, style(step_id).dim(), style(reason).dim())
        }
        ExecutionEvent::StepFailed { step_id, error } => {
            format!("{} {}: {}", CROSS, style(step_id).red(), style(error).dim())
        }
        ExecutionEvent::ServiceLine { line } => style(line).dim().to_string(),
        ExecutionEvent::PhaseChanged { phase } => {
            format!("{} Service {}", INFO, format_phase(*phase))
        }
        ExecutionEvent::ServiceReady { url } => {
            format!("{} Ready at {}", GLOBE, style(url).green().bold())
        }
        ExecutionEvent::PipelineCompleted { run_id, status } => {
            let status_str = match status {
                RunStatus::Completed => format!("{} completed", style("successfully").green()),
                RunStatus::Failed => style("failed").red().to_string(),
                RunStatus::Running => format!("{}", style("running").green()),
                _ => format!("{:?}", status),
            };
            format!(
                "{} Run ({}) {}",
                INFO,
                style(&run_id.to_string()[..8]).dim(),
                status_str
            )
        }
    }
}

/// Format step output with truncation
pub fn format_output(output: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = output.lines().collect();

    if lines.len() <= max_lines {
        output.to_string()
    } else {
        let truncated = lines[..max_lines].join("\n");
        format!(
            "{}\n{}... ({} more lines)",
            truncated,
            style("[truncated]").dim(),
            lines.len() - max_lines
        )
    }
}
