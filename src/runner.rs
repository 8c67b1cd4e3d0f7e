// src/runner.rs

//! Public handle to a running engine.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};

use crate::engine::runtime::RunOutcome;
use crate::engine::{
    CoreRuntime, RunnerCommand, RunnerEvent, RunnerOptions, RunnerSnapshot, RunnerStatus, Runtime,
    RuntimeEvent,
};
use crate::errors::{Result, RunError};
use crate::exec::{ProcessBackend, RealProcessBackend};
use crate::types::Task;

/// Capacity of the channel carrying process exits and timer ticks.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Cloneable handle to a bounded-concurrency task executor.
///
/// The engine runs as a Tokio task owning all state; handles talk to it
/// through channels. It stops (killing whatever still runs) once every handle
/// has been dropped.
///
/// ```no_run
/// # async fn demo() -> batchrun::errors::Result<()> {
/// use std::time::Duration;
/// use batchrun::{runner, types::Task};
///
/// let runner = runner::get(4, Some(Duration::from_secs(30)))?;
/// let mut events = runner.subscribe();
/// runner
///     .run(vec![Task::new("echo one"), Task::new("echo two")], None)
///     .await?;
/// while let Ok(event) = events.try_recv() {
///     println!("{event:?}");
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct TasksRunner {
    command_tx: mpsc::UnboundedSender<RunnerCommand>,
    status_rx: watch::Receiver<RunnerStatus>,
}

/// Build a runner backed by real OS processes.
///
/// Must be called from within a Tokio runtime.
pub fn get(max_concurrent: usize, max_task_execution: Option<Duration>) -> Result<TasksRunner> {
    let options = RunnerOptions::new(max_concurrent, max_task_execution)?;
    Ok(TasksRunner::new(options))
}

impl TasksRunner {
    /// Spawn an engine that runs tasks as OS processes.
    pub fn new(options: RunnerOptions) -> Self {
        Self::with_backend(options, RealProcessBackend::new)
    }

    /// Spawn an engine around a custom backend.
    ///
    /// `make_backend` receives the sender on which the backend must report
    /// process exits.
    pub fn with_backend<B, F>(options: RunnerOptions, make_backend: F) -> Self
    where
        B: ProcessBackend + 'static,
        F: FnOnce(mpsc::Sender<RuntimeEvent>) -> B,
    {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (status_tx, status_rx) = watch::channel(RunnerStatus::default());

        let backend = make_backend(event_tx.clone());
        let runtime = Runtime::new(
            CoreRuntime::new(options),
            command_rx,
            event_tx,
            event_rx,
            backend,
            status_tx,
        );
        tokio::spawn(runtime.run());

        Self {
            command_tx,
            status_rx,
        }
    }

    /// Run a batch to completion.
    ///
    /// Fails straight away with a usage error if a run is already active or
    /// `tasks` is empty. Otherwise resolves once every task has completed, or
    /// with the abort outcome if the run was aborted (by [`abort`] or because
    /// `timeout` elapsed). Individual task failures do not fail the run; they
    /// are reported through [`RunnerEvent::TaskComplete`].
    ///
    /// [`abort`]: TasksRunner::abort
    pub async fn run(&self, tasks: Vec<Task>, timeout: Option<Duration>) -> RunOutcome {
        let (reply, rx) = oneshot::channel();
        self.send(RunnerCommand::Run {
            tasks,
            timeout,
            reply,
        })?;
        rx.await.map_err(|_| RunError::Shutdown)?
    }

    /// Abort the active run.
    ///
    /// Resolves once every process is gone, or with
    /// [`RunError::AbortFailed`] if some survived every kill attempt.
    pub async fn abort(&self) -> RunOutcome {
        let (reply, rx) = oneshot::channel();
        self.send(RunnerCommand::Abort { reply })?;
        rx.await.map_err(|_| RunError::Shutdown)?
    }

    /// Export the current engine state.
    pub async fn snapshot(&self) -> std::result::Result<RunnerSnapshot, RunError> {
        let (reply, rx) = oneshot::channel();
        self.send(RunnerCommand::Snapshot { reply })?;
        rx.await.map_err(|_| RunError::Shutdown)
    }

    /// Receive every event published from now on.
    ///
    /// The channel is unbounded so the engine never waits on a slow
    /// subscriber; drop the receiver to unsubscribe.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<RunnerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = self.command_tx.send(RunnerCommand::Subscribe(tx));
        rx
    }

    pub fn status(&self) -> RunnerStatus {
        *self.status_rx.borrow()
    }

    pub fn total_tasks(&self) -> usize {
        self.status().total_tasks
    }

    pub fn tasks_completed(&self) -> usize {
        self.status().tasks_completed
    }

    /// Whether a run is active, from acceptance until it resolves.
    pub fn running(&self) -> bool {
        self.status().running
    }

    fn send(&self, command: RunnerCommand) -> std::result::Result<(), RunError> {
        self.command_tx.send(command).map_err(|_| RunError::Shutdown)
    }
}
