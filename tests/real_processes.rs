// tests/real_processes.rs

#![cfg(unix)]

use std::error::Error;
use std::io::Write;
use std::time::{Duration, Instant};

use tempfile::NamedTempFile;

use batchrun::engine::RunnerEvent;
use batchrun::errors::{AbortCause, RunError};
use batchrun::runner::{self, TasksRunner};
use batchrun::exec::task_runner::MAX_CAPTURE_BYTES;
use batchrun::types::{CapturedStream, ExecutionResult, Task};
use batchrun_test_utils::{drain_events, init_tracing, with_timeout_secs};

type TestResult = Result<(), Box<dyn Error>>;

const SIGKILL: i32 = 9;

/// Run one task on a real runner and return its result.
async fn run_one(task: Task) -> Result<ExecutionResult, Box<dyn Error>> {
    let runner = runner::get(1, None)?;
    let mut events = runner.subscribe();
    with_timeout_secs(20, runner.run(vec![task], None)).await?;
    Ok(results(&mut events).into_iter().next().expect("one result"))
}

fn results(
    events: &mut tokio::sync::mpsc::UnboundedReceiver<RunnerEvent>,
) -> Vec<ExecutionResult> {
    drain_events(events)
        .into_iter()
        .filter_map(|e| match e {
            RunnerEvent::TaskComplete { result, .. } => Some(result),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn captures_stdout_and_exit_code() -> TestResult {
    init_tracing();
    let result = run_one(Task::new("echo hello")).await?;
    assert_eq!(result.exit_code, Some(0));
    assert_eq!(result.stdout.as_deref(), Some("hello\n"));
    assert_eq!(result.stderr, None);
    assert!(result.success());
    Ok(())
}

#[tokio::test]
async fn captures_stderr_and_failure_code() -> TestResult {
    let result = run_one(Task::new("echo oops 1>&2; exit 3")).await?;
    assert_eq!(result.exit_code, Some(3));
    assert_eq!(result.stdout, None);
    assert_eq!(result.stderr.as_deref(), Some("oops\n"));
    assert!(!result.success());
    Ok(())
}

#[tokio::test]
async fn env_overrides_are_applied() -> TestResult {
    let result = run_one(Task::new("printf %s \"$GREETING\"").with_env("GREETING", "hi there")).await?;
    assert_eq!(result.stdout.as_deref(), Some("hi there"));
    Ok(())
}

#[tokio::test]
async fn literal_stdin_is_fed_to_the_process() -> TestResult {
    let result = run_one(Task::new("cat").with_stdin("from literal")).await?;
    assert_eq!(result.stdout.as_deref(), Some("from literal"));
    Ok(())
}

#[tokio::test]
async fn file_stdin_is_streamed() -> TestResult {
    let mut file = NamedTempFile::new()?;
    let payload = "x".repeat(200 * 1024);
    file.write_all(payload.as_bytes())?;
    file.flush()?;

    let stdin = format!("@{}", file.path().display());
    let result = run_one(Task::new("wc -c").with_stdin(stdin.as_str())).await?;
    assert_eq!(result.exit_code, Some(0));
    assert_eq!(
        result.stdout.as_deref().map(str::trim),
        Some(payload.len().to_string().as_str())
    );
    assert!(result.input_error.is_none());
    Ok(())
}

#[tokio::test]
async fn process_ignoring_its_input_is_not_an_error() -> TestResult {
    let mut file = NamedTempFile::new()?;
    file.write_all(&vec![b'y'; 512 * 1024])?;
    file.flush()?;

    let stdin = format!("@{}", file.path().display());
    let result = run_one(Task::new("true").with_stdin(stdin.as_str())).await?;
    assert_eq!(result.exit_code, Some(0));
    assert!(result.input_error.is_none());
    Ok(())
}

#[tokio::test]
async fn missing_stdin_file_fails_the_task_not_the_run() -> TestResult {
    let result = run_one(Task::new("cat").with_stdin("@/definitely/not/here.txt")).await?;

    let error = result.input_error.clone().expect("input error");
    assert_eq!(error.operation, "open");
    assert_eq!(error.input, "/definitely/not/here.txt");
    assert!(!result.success());

    let stderr = result.stderr.expect("stderr falls back to the input error");
    assert!(stderr.starts_with("error open /definitely/not/here.txt"));
    Ok(())
}

#[tokio::test]
async fn unreadable_stdin_fails_the_task_not_the_run() -> TestResult {
    let runner = runner::get(1, None)?;
    let mut events = runner.subscribe();

    // Opening a directory works; reading it does not.
    with_timeout_secs(
        20,
        runner.run(
            vec![Task::new("cat").with_stdin("@/tmp"), Task::new("echo after")],
            None,
        ),
    )
    .await?;

    let results = results(&mut events);
    assert_eq!(results.len(), 2);

    let error = results[0].input_error.clone().expect("input error");
    assert_eq!(error.operation, "read");
    assert_eq!(error.input, "/tmp");
    assert!(!results[0].success());

    assert!(results[1].success());
    assert_eq!(results[1].stdout.as_deref(), Some("after\n"));
    Ok(())
}

#[tokio::test]
async fn runaway_output_is_capped_and_the_task_killed() -> TestResult {
    init_tracing();
    let runner = runner::get(1, None)?;
    let mut events = runner.subscribe();

    with_timeout_secs(20, runner.run(vec![Task::new("yes"), Task::new("echo after")], None))
        .await?;

    let results = results(&mut events);
    assert_eq!(results.len(), 2);

    let capped = &results[0];
    assert_eq!(capped.output_overflow, Some(CapturedStream::Stdout));
    assert_eq!(capped.stdout.as_ref().map(String::len), Some(MAX_CAPTURE_BYTES));
    assert_eq!(capped.exit_code, None);
    assert!(!capped.success());
    assert!(
        capped
            .stderr
            .as_deref()
            .is_some_and(|s| s.starts_with("stdout exceeded the capture limit"))
    );

    assert!(results[1].success());
    Ok(())
}

#[tokio::test]
async fn output_under_the_cap_is_kept_whole() -> TestResult {
    let result = run_one(Task::new("head -c 1000000 /dev/zero | tr '\\0' a")).await?;
    assert_eq!(result.exit_code, Some(0));
    assert_eq!(result.output_overflow, None);
    assert_eq!(result.stdout.as_ref().map(String::len), Some(1_000_000));
    Ok(())
}

#[tokio::test]
async fn health_check_kills_a_real_process() -> TestResult {
    init_tracing();
    let runner = runner::get(1, Some(Duration::from_secs(1)))?;
    let mut events = runner.subscribe();

    let started = Instant::now();
    with_timeout_secs(20, runner.run(vec![Task::new("sleep 30")], None)).await?;
    assert!(started.elapsed() < Duration::from_secs(15));

    let events = drain_events(&mut events);
    assert!(matches!(events[0], RunnerEvent::KillingTasks { .. }));

    let result = events
        .into_iter()
        .find_map(|e| match e {
            RunnerEvent::TaskComplete { result, .. } => Some(result),
            _ => None,
        })
        .expect("task-complete");
    assert_eq!(result.exit_code, None);
    assert_eq!(result.signal, Some(SIGKILL));
    Ok(())
}

#[tokio::test]
async fn timeout_kills_whole_process_trees() -> TestResult {
    init_tracing();
    let runner = TasksRunner::new(batchrun::engine::RunnerOptions::new(2, None)?);

    let started = Instant::now();
    // Background children keep stdout open; only a group kill ends them.
    let outcome = with_timeout_secs(
        20,
        runner.run(
            vec![
                Task::new("sleep 30 & sleep 30 & wait"),
                Task::new("sleep 30 & wait"),
                Task::new("sleep 30"),
            ],
            Some(Duration::from_secs(1)),
        ),
    )
    .await;

    assert_eq!(
        outcome,
        Err(RunError::Aborted {
            cause: AbortCause::Timeout
        })
    );
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(runner.tasks_completed(), 2);
    assert!(!runner.running());
    Ok(())
}

#[tokio::test]
async fn runs_many_tasks_with_bounded_concurrency() -> TestResult {
    let runner = runner::get(3, None)?;
    let mut events = runner.subscribe();
    let batch: Vec<Task> = (0..8).map(|i| Task::new(format!("echo {i}"))).collect();

    with_timeout_secs(20, runner.run(batch, None)).await?;

    let mut outputs: Vec<String> = results(&mut events)
        .into_iter()
        .filter_map(|r| r.stdout)
        .map(|s| s.trim().to_string())
        .collect();
    outputs.sort();
    assert_eq!(outputs, (0..8).map(|i| i.to_string()).collect::<Vec<_>>());
    assert_eq!(runner.tasks_completed(), 8);
    Ok(())
}
