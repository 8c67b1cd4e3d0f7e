// src/engine/queue.rs

use std::collections::VecDeque;

use tracing::debug;

use crate::types::{QueuedItem, Task, TaskId};

/// FIFO holding area for tasks that have not been launched yet.
///
/// Semantics:
/// - Every enqueued task gets the next sequence id. Ids start at 0 for each
///   run (see [`TaskQueue::restart`]) and are never reused within a run.
/// - Items leave the queue strictly in submission order; nothing is ever
///   reordered or prioritised.
/// - Clearing drops pending items without reporting them anywhere. The engine
///   only does that while aborting, when those tasks are no longer part of
///   the run's accounting.
#[derive(Debug, Default)]
pub struct TaskQueue {
    items: VecDeque<QueuedItem>,
    next_id: TaskId,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Drop anything pending and number the next batch from 0 again.
    pub fn restart(&mut self) {
        self.items.clear();
        self.next_id = 0;
    }

    /// Append `tasks` in submission order, assigning fresh sequence ids.
    ///
    /// Returns `true` when work arrived, which is the engine's cue to
    /// re-run its scheduler.
    pub fn enqueue<I>(&mut self, tasks: I) -> bool
    where
        I: IntoIterator<Item = Task>,
    {
        let before = self.items.len();

        for task in tasks {
            let id = self.next_id;
            self.next_id += 1;
            self.items.push_back(QueuedItem { id, task });
        }

        let added = self.items.len() - before;
        debug!(added, pending = self.items.len(), "enqueued tasks");
        added > 0
    }

    /// Remove up to `max` items from the front, preserving their order.
    ///
    /// Returns `None` when the queue is empty. A non-empty queue asked for
    /// zero items yields `Some` of an empty batch.
    pub fn dequeue(&mut self, max: usize) -> Option<Vec<QueuedItem>> {
        if self.items.is_empty() {
            return None;
        }

        let n = max.min(self.items.len());
        Some(self.items.drain(..n).collect())
    }

    /// Discard every pending item. Returns how many were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.items.len();
        self.items.clear();
        if dropped > 0 {
            debug!(dropped, "discarded pending tasks");
        }
        dropped
    }

    /// Copy of the pending items, front first.
    pub fn snapshot(&self) -> Vec<QueuedItem> {
        self.items.iter().cloned().collect()
    }
}
