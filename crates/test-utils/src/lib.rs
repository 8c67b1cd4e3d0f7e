pub mod builders;
pub mod fake_backend;

use std::sync::Once;

use tokio::sync::mpsc;
use tracing_subscriber::{EnvFilter, fmt};

use batchrun::engine::RunnerEvent;

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout.
///
/// Under paused time this is 5 s of *virtual* time.
#[allow(dead_code)]
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    with_timeout_secs(5, f).await
}

/// Run a future with a timeout of `secs` seconds.
pub async fn with_timeout_secs<F, T>(secs: u64, f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(secs), f)
        .await
        .unwrap_or_else(|_| panic!("Test timed out after {secs} seconds"))
}

/// Take every event already delivered to `rx`.
pub fn drain_events(rx: &mut mpsc::UnboundedReceiver<RunnerEvent>) -> Vec<RunnerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Short name of an event, handy for asserting on sequences.
pub fn event_name(event: &RunnerEvent) -> &'static str {
    match event {
        RunnerEvent::Progress(_) => "progress",
        RunnerEvent::TaskComplete { .. } => "task-complete",
        RunnerEvent::Finish => "finish",
        RunnerEvent::KillingTasks { .. } => "killing-tasks",
        RunnerEvent::Aborting => "aborting",
        RunnerEvent::AbortFailed { .. } => "abort-failed",
        RunnerEvent::Aborted => "aborted",
    }
}
