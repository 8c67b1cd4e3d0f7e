// src/engine/tracker.rs

//! In-flight process bookkeeping.

use std::collections::BTreeMap;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tracing::debug;

use crate::types::{ExecutionResult, ProcessHandle, RunningTask, Task, TaskId, duration_millis};

/// One live process as seen by the engine.
#[derive(Debug, Clone, Serialize)]
pub struct TrackedProcess {
    pub id: TaskId,
    /// Wall-clock start, in milliseconds since the Unix epoch.
    pub started_at_ms: u64,
    pub task: Task,
    #[serde(skip)]
    pub started: Instant,
}

/// Payload of a removal: everything the engine reports for a finished task.
#[derive(Debug, Clone)]
pub struct RemovedProcess {
    pub id: TaskId,
    pub handle: ProcessHandle,
    pub task: Task,
    pub result: ExecutionResult,
    pub duration: Duration,
}

/// Map of process handle to in-flight entry; the engine's single source of
/// truth for "what is currently running".
///
/// Time is passed in explicitly so that callers (and tests) control the
/// clock. Entries are keyed by handle, and since backends hand out handles in
/// launch order, iteration order is launch order.
#[derive(Debug, Default)]
pub struct ProcessTracker {
    entries: BTreeMap<ProcessHandle, TrackedProcess>,
}

impl ProcessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    /// Start tracking `handle`. Returns `false` (and changes nothing) if the
    /// handle is already tracked.
    pub fn add(&mut self, handle: ProcessHandle, id: TaskId, task: Task, now: Instant) -> bool {
        if self.entries.contains_key(&handle) {
            return false;
        }

        self.entries.insert(
            handle,
            TrackedProcess {
                id,
                started_at_ms: unix_millis(),
                task,
                started: now,
            },
        );
        debug!(id, %handle, running = self.entries.len(), "process added");
        true
    }

    /// Stop tracking `handle` and compute how long it ran.
    ///
    /// Returns `None` for unknown handles, which happens benignly when a
    /// process exits after the tracker was force-cleared.
    pub fn remove(
        &mut self,
        handle: ProcessHandle,
        result: ExecutionResult,
        now: Instant,
    ) -> Option<RemovedProcess> {
        let entry = self.entries.remove(&handle)?;
        let duration = now.saturating_duration_since(entry.started);

        debug!(
            id = entry.id,
            %handle,
            duration_ms = duration_millis(duration),
            running = self.entries.len(),
            "process removed"
        );

        Some(RemovedProcess {
            id: entry.id,
            handle,
            task: entry.task,
            result,
            duration,
        })
    }

    /// (id, handle) of every tracked process, or `None` when nothing runs.
    pub fn running_snapshot(&self) -> Option<Vec<RunningTask>> {
        non_empty(
            self.entries
                .iter()
                .map(|(handle, entry)| RunningTask {
                    id: entry.id,
                    handle: *handle,
                })
                .collect(),
        )
    }

    /// Entries that have been running for longer than `threshold`, or `None`
    /// if there are none.
    pub fn tasks_exceeding(&self, threshold: Duration, now: Instant) -> Option<Vec<RunningTask>> {
        non_empty(
            self.entries
                .iter()
                .filter(|(_, entry)| now.saturating_duration_since(entry.started) > threshold)
                .map(|(handle, entry)| RunningTask {
                    id: entry.id,
                    handle: *handle,
                })
                .collect(),
        )
    }

    /// Forget every entry without reporting any removal. Returns how many
    /// entries were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.entries.len();
        self.entries.clear();
        dropped
    }

    /// Copy of the live map for export.
    pub fn snapshot(&self) -> BTreeMap<ProcessHandle, TrackedProcess> {
        self.entries.clone()
    }
}

fn non_empty(tasks: Vec<RunningTask>) -> Option<Vec<RunningTask>> {
    if tasks.is_empty() { None } else { Some(tasks) }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(duration_millis)
        .unwrap_or(0)
}
