// tests/cli_and_output.rs

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use batchrun::apply_cli_overrides;
use batchrun::cli::{CliArgs, LogLevel};
use batchrun::engine::RunnerEvent;
use batchrun::errors::RunError;
use batchrun::logging::resolve_level;
use batchrun::output::{OutputFormat, format_event};
use batchrun::types::{
    ExecutionResult, ProcessHandle, Progress, RunningTask, StdinSource, Task, duration_millis,
};
use batchrun_test_utils::builders::CommandFileBuilder;

#[test]
fn defaults_point_at_batchrun_toml() {
    let args = CliArgs::try_parse_from(["batchrun"]).unwrap();
    assert_eq!(args.file, PathBuf::from("Batchrun.toml"));
    assert_eq!(args.concurrency, None);
    assert!(!args.json);
    assert!(!args.dry_run);
    assert_eq!(args.log_level, None);
}

#[test]
fn flags_are_parsed() {
    let args = CliArgs::try_parse_from([
        "batchrun",
        "-f",
        "jobs.txt",
        "-j",
        "8",
        "--max-task-seconds",
        "30",
        "--timeout",
        "600",
        "--json",
        "--log-level",
        "debug",
        "--dry-run",
    ])
    .unwrap();

    assert_eq!(args.file, PathBuf::from("jobs.txt"));
    assert_eq!(args.concurrency, Some(8));
    assert_eq!(args.max_task_seconds, Some(30));
    assert_eq!(args.timeout, Some(600));
    assert!(args.json);
    assert!(args.dry_run);
    assert_eq!(args.log_level, Some(LogLevel::Debug));
}

#[test]
fn zero_concurrency_is_rejected_by_the_parser() {
    assert!(CliArgs::try_parse_from(["batchrun", "-j", "0"]).is_err());
    assert!(CliArgs::try_parse_from(["batchrun", "--timeout", "0"]).is_err());
}

#[test]
fn cli_overrides_win_over_the_file() {
    let mut file = CommandFileBuilder::new()
        .with_task(Task::new("echo"))
        .max_concurrent(2)
        .timeout_seconds(100)
        .build();
    let args =
        CliArgs::try_parse_from(["batchrun", "-j", "5", "--max-task-seconds", "7"]).unwrap();

    apply_cli_overrides(&mut file, &args);

    assert_eq!(file.runner.max_concurrent, 5);
    assert_eq!(file.runner.max_task_execution_seconds, Some(7));
    assert_eq!(file.timeout(), Some(Duration::from_secs(100)));
}

#[test]
fn log_level_prefers_flag_then_env_then_info() {
    assert_eq!(
        resolve_level(Some(LogLevel::Warn), Some("trace")),
        tracing::Level::WARN
    );
    assert_eq!(resolve_level(None, Some(" DEBUG ")), tracing::Level::DEBUG);
    assert_eq!(resolve_level(None, Some("nonsense")), tracing::Level::INFO);
    assert_eq!(resolve_level(None, None), tracing::Level::INFO);
}

#[test]
fn stdin_text_form_round_trips_through_serde() {
    let task: Task = serde_json::from_str(r#"{"cmd":"cat","stdin":"@in.txt"}"#).unwrap();
    assert_eq!(task.stdin, Some(StdinSource::File("in.txt".into())));
    assert_eq!(serde_json::to_value(&task).unwrap()["stdin"], "@in.txt");

    // Empty literal means no input at all.
    let task = Task::new("cat").with_stdin("");
    assert!(task.input().is_none());
}

#[test]
fn events_render_as_text() {
    let progress = RunnerEvent::Progress(Progress::new(3, 1));
    assert_eq!(
        format_event(&progress, OutputFormat::Text),
        "[progress] 1/3 (33.3%)"
    );

    let mut result = ExecutionResult::exited(2);
    result.stderr = Some("boom\nmore".to_string());
    let complete = RunnerEvent::TaskComplete {
        id: 4,
        task: Task::new("make"),
        handle: ProcessHandle(9),
        result,
        duration: Duration::from_millis(42),
    };
    assert_eq!(
        format_event(&complete, OutputFormat::Text),
        "[failed] #4 `make` exit 2 in 42ms: boom"
    );

    let killing = RunnerEvent::KillingTasks {
        tasks: vec![RunningTask {
            id: 1,
            handle: ProcessHandle(2),
        }],
    };
    assert_eq!(
        format_event(&killing, OutputFormat::Text),
        "[kill] #1 (handle 2)"
    );
}

#[test]
fn events_render_as_json_lines() {
    let complete = RunnerEvent::TaskComplete {
        id: 0,
        task: Task::new("echo hi").with_tag("name", "greet"),
        handle: ProcessHandle(1),
        result: ExecutionResult::exited(0),
        duration: Duration::from_millis(1500),
    };
    let line = format_event(&complete, OutputFormat::Json);
    assert!(!line.contains('\n'));

    let value: serde_json::Value = serde_json::from_str(&line).unwrap();
    assert_eq!(value["event"], "task-complete");
    assert_eq!(value["duration_ms"], 1500);
    assert_eq!(value["task"]["tags"]["name"], "greet");
    assert_eq!(value["result"]["exit_code"], 0);

    let failed = RunnerEvent::AbortFailed {
        error: RunError::AbortFailed {
            attempts: 3,
            still_running: vec![],
        },
    };
    let value: serde_json::Value =
        serde_json::from_str(&format_event(&failed, OutputFormat::Json)).unwrap();
    assert_eq!(value["event"], "abort-failed");
    assert_eq!(value["error"]["kind"], "abort-failed");
    assert_eq!(value["error"]["attempts"], 3);

    let finish: serde_json::Value =
        serde_json::from_str(&format_event(&RunnerEvent::Finish, OutputFormat::Json)).unwrap();
    assert_eq!(finish["event"], "finish");
}

#[test]
fn huge_durations_saturate_instead_of_wrapping() {
    assert_eq!(duration_millis(Duration::from_millis(1500)), 1500);
    assert_eq!(duration_millis(Duration::MAX), u64::MAX);

    let complete = RunnerEvent::TaskComplete {
        id: 0,
        task: Task::new("sleep forever"),
        handle: ProcessHandle(1),
        result: ExecutionResult::killed(Some(9)),
        duration: Duration::MAX,
    };
    let value: serde_json::Value =
        serde_json::from_str(&format_event(&complete, OutputFormat::Json)).unwrap();
    assert_eq!(value["duration_ms"], u64::MAX);
}
