// src/output.rs

//! Rendering of runner events on stdout.

use crate::engine::RunnerEvent;
use crate::types::{ExecutionResult, RunningTask};

/// How events are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    /// One JSON object per line.
    Json,
}

/// Render one event as a single line (without the trailing newline).
pub fn format_event(event: &RunnerEvent, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => serde_json::to_string(event)
            .unwrap_or_else(|e| format!(r#"{{"event":"unserializable","error":"{e}"}}"#)),
        OutputFormat::Text => format_text(event),
    }
}

fn format_text(event: &RunnerEvent) -> String {
    match event {
        RunnerEvent::Progress(progress) => match progress.percent_completed {
            Some(percent) => format!(
                "[progress] {}/{} ({percent:.1}%)",
                progress.completed, progress.total
            ),
            None => format!("[progress] {}/{}", progress.completed, progress.total),
        },
        RunnerEvent::TaskComplete {
            id,
            task,
            result,
            duration,
            ..
        } => {
            let mut line = format!(
                "[{}] #{id} `{}` {} in {}ms",
                if result.success() { "ok" } else { "failed" },
                task.cmd,
                describe_exit(result),
                duration.as_millis()
            );
            if !result.success() {
                if let Some(first) = result.stderr.as_deref().and_then(|s| s.lines().next()) {
                    line.push_str(": ");
                    line.push_str(first);
                }
            }
            line
        }
        RunnerEvent::Finish => "[finish] all tasks completed".to_string(),
        RunnerEvent::KillingTasks { tasks } => format!("[kill] {}", list(tasks)),
        RunnerEvent::Aborting => "[abort] aborting run".to_string(),
        RunnerEvent::AbortFailed { error } => format!("[abort] failed: {error}"),
        RunnerEvent::Aborted => "[abort] all tasks stopped".to_string(),
    }
}

fn describe_exit(result: &ExecutionResult) -> String {
    match (result.exit_code, result.signal) {
        (Some(code), _) => format!("exit {code}"),
        (None, Some(signal)) => format!("signal {signal}"),
        (None, None) => "no exit status".to_string(),
    }
}

fn list(tasks: &[RunningTask]) -> String {
    tasks
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
