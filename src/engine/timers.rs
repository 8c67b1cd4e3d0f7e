// src/engine/timers.rs

//! Cancelable timers owned by the runtime.
//!
//! Each armed timer is a Tokio task that sleeps and then sends
//! [`RuntimeEvent::TimerFired`] into the runtime's event channel. Cancelling
//! aborts the task, but a tick may already be sitting in the channel, so
//! every arming gets a fresh generation number and the runtime drops ticks
//! whose generation is no longer current (see [`Timers::accept`]).

use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::debug;

use crate::engine::event_handlers::TimerSchedule;
use crate::engine::{RuntimeEvent, TimerKind};

struct ArmedTimer {
    generation: u64,
    schedule: TimerSchedule,
    task: JoinHandle<()>,
}

pub struct Timers {
    event_tx: mpsc::Sender<RuntimeEvent>,
    armed: HashMap<TimerKind, ArmedTimer>,
    next_generation: u64,
}

impl Timers {
    pub fn new(event_tx: mpsc::Sender<RuntimeEvent>) -> Self {
        Self {
            event_tx,
            armed: HashMap::new(),
            next_generation: 0,
        }
    }

    /// Arm `timer`, replacing any previous arming of the same kind.
    pub fn arm(&mut self, timer: TimerKind, schedule: TimerSchedule) {
        self.cancel(timer);

        let generation = self.next_generation;
        self.next_generation += 1;

        let tx = self.event_tx.clone();
        let task = match schedule {
            TimerSchedule::Once(delay) => tokio::spawn(async move {
                time::sleep(delay).await;
                let _ = tx.send(RuntimeEvent::TimerFired { timer, generation }).await;
            }),
            TimerSchedule::Every(period) => tokio::spawn(async move {
                let mut ticker = time::interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    if tx
                        .send(RuntimeEvent::TimerFired { timer, generation })
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
            }),
        };

        debug!(?timer, ?schedule, generation, "timer armed");
        self.armed.insert(
            timer,
            ArmedTimer {
                generation,
                schedule,
                task,
            },
        );
    }

    /// Cancel `timer` if it is armed.
    pub fn cancel(&mut self, timer: TimerKind) {
        if let Some(armed) = self.armed.remove(&timer) {
            armed.task.abort();
            debug!(?timer, generation = armed.generation, "timer cancelled");
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, armed) in self.armed.drain() {
            armed.task.abort();
        }
    }

    pub fn is_armed(&self, timer: TimerKind) -> bool {
        self.armed.contains_key(&timer)
    }

    /// Whether a tick from `generation` of `timer` is current and should be
    /// handed to the core. A one-shot timer is disarmed by its tick.
    pub fn accept(&mut self, timer: TimerKind, generation: u64) -> bool {
        let schedule = match self.armed.get(&timer) {
            Some(armed) if armed.generation == generation => armed.schedule,
            _ => {
                debug!(?timer, generation, "dropping stale timer tick");
                return false;
            }
        };

        if let TimerSchedule::Once(_) = schedule {
            self.armed.remove(&timer);
        }

        true
    }
}

impl Drop for Timers {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
