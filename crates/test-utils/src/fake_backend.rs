use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use batchrun::engine::{RunnerOptions, RuntimeEvent};
use batchrun::exec::ProcessBackend;
use batchrun::runner::TasksRunner;
use batchrun::types::{ExecutionResult, ProcessHandle, Task};

/// Signal number reported for processes killed through the fake backend.
pub const FAKE_KILL_SIGNAL: i32 = 9;

/// What a fake process does, decided from its command string:
///
/// - `sleep <ms>`: exits 0 after `ms` milliseconds, unless killed first
/// - `fail <code>`: exits with `code` straight away
/// - `hang`: runs until killed
/// - `stubborn`: never exits and ignores kills
/// - anything else: exits 0 straight away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeBehaviour {
    Exit(i32),
    Sleep(Duration),
    Hang,
    Stubborn,
}

impl FakeBehaviour {
    pub fn from_cmd(cmd: &str) -> Self {
        let mut parts = cmd.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some("sleep"), Some(ms)) => ms
                .parse()
                .map(|ms| FakeBehaviour::Sleep(Duration::from_millis(ms)))
                .unwrap_or(FakeBehaviour::Exit(0)),
            (Some("fail"), Some(code)) => FakeBehaviour::Exit(code.parse().unwrap_or(1)),
            (Some("hang"), _) => FakeBehaviour::Hang,
            (Some("stubborn"), _) => FakeBehaviour::Stubborn,
            _ => FakeBehaviour::Exit(0),
        }
    }
}

/// One launch seen by the fake backend.
#[derive(Debug, Clone)]
pub struct FakeLaunch {
    pub handle: ProcessHandle,
    pub cmd: String,
    /// Tokio clock at launch.
    pub at: Instant,
}

/// Everything the fake backend observed.
#[derive(Debug, Default)]
pub struct FakeLog {
    /// Launches in launch order.
    pub launched: Vec<FakeLaunch>,
    /// Handles passed to `kill_tree`, in call order.
    pub kill_requests: Vec<ProcessHandle>,
    /// Fake processes that have not reported an exit yet.
    pub in_flight: usize,
    /// High-water mark of `in_flight`.
    pub max_in_flight: usize,
}

impl FakeLog {
    pub fn launched_cmds(&self) -> Vec<String> {
        self.launched.iter().map(|launch| launch.cmd.clone()).collect()
    }
}

pub type SharedLog = Arc<Mutex<FakeLog>>;

/// A fake backend that:
/// - records which tasks were launched and which handles were killed
/// - simulates each process according to its [`FakeBehaviour`], on the Tokio
///   clock, so tests can run with paused time.
pub struct FakeBackend {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    log: SharedLog,
    next_handle: u64,
    kill_switches: HashMap<ProcessHandle, oneshot::Sender<()>>,
}

impl FakeBackend {
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>, log: SharedLog) -> Self {
        Self {
            runtime_tx,
            log,
            next_handle: 1,
            kill_switches: HashMap::new(),
        }
    }
}

impl ProcessBackend for FakeBackend {
    fn launch(&mut self, task: &Task) -> ProcessHandle {
        let handle = ProcessHandle(self.next_handle);
        self.next_handle += 1;

        {
            let mut log = self.log.lock().unwrap();
            log.launched.push(FakeLaunch {
                handle,
                cmd: task.cmd.clone(),
                at: Instant::now(),
            });
            log.in_flight += 1;
            log.max_in_flight = log.max_in_flight.max(log.in_flight);
        }

        let behaviour = FakeBehaviour::from_cmd(&task.cmd);
        let (kill_tx, mut kill_rx) = oneshot::channel::<()>();
        if behaviour != FakeBehaviour::Stubborn {
            self.kill_switches.insert(handle, kill_tx);
        }

        let tx = self.runtime_tx.clone();
        let log = Arc::clone(&self.log);

        tokio::spawn(async move {
            let result = match behaviour {
                FakeBehaviour::Exit(code) => {
                    tokio::task::yield_now().await;
                    exit_result(code)
                }
                FakeBehaviour::Sleep(delay) => {
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => exit_result(0),
                        Ok(()) = &mut kill_rx => ExecutionResult::killed(Some(FAKE_KILL_SIGNAL)),
                    }
                }
                FakeBehaviour::Hang => match kill_rx.await {
                    Ok(()) => ExecutionResult::killed(Some(FAKE_KILL_SIGNAL)),
                    // Backend dropped.
                    Err(_) => return,
                },
                FakeBehaviour::Stubborn => {
                    std::future::pending::<()>().await;
                    return;
                }
            };

            log.lock().unwrap().in_flight -= 1;
            let _ = tx.send(RuntimeEvent::ProcessExited { handle, result }).await;
        });

        handle
    }

    fn kill_tree(&mut self, handle: ProcessHandle) {
        self.log.lock().unwrap().kill_requests.push(handle);
        if let Some(kill) = self.kill_switches.remove(&handle) {
            let _ = kill.send(());
        }
    }
}

fn exit_result(code: i32) -> ExecutionResult {
    let mut result = ExecutionResult::exited(code);
    if code != 0 {
        result.stderr = Some(format!("exited with {code}"));
    }
    result
}

/// Spawn a runner around a [`FakeBackend`] and return it with the backend's
/// log.
pub fn fake_runner(max_concurrent: usize, max_task_execution: Option<Duration>) -> (TasksRunner, SharedLog) {
    let options = RunnerOptions::new(max_concurrent, max_task_execution)
        .expect("valid runner options");
    let log: SharedLog = Arc::default();
    let backend_log = Arc::clone(&log);
    let runner = TasksRunner::with_backend(options, move |tx| FakeBackend::new(tx, backend_log));
    (runner, log)
}
