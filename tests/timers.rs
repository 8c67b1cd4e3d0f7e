// tests/timers.rs

use std::time::Duration;

use tokio::sync::mpsc;

use batchrun::engine::event_handlers::TimerSchedule;
use batchrun::engine::timers::Timers;
use batchrun::engine::{RuntimeEvent, TimerKind};

#[tokio::test(start_paused = true)]
async fn rearming_makes_earlier_ticks_stale() {
    let (tx, mut rx) = mpsc::channel(8);
    let mut timers = Timers::new(tx);

    timers.arm(TimerKind::RunTimeout, TimerSchedule::Once(Duration::from_secs(1)));
    let first = match rx.recv().await {
        Some(RuntimeEvent::TimerFired { generation, .. }) => generation,
        other => panic!("expected a tick, got {other:?}"),
    };

    timers.arm(TimerKind::RunTimeout, TimerSchedule::Once(Duration::from_secs(1)));
    assert!(!timers.accept(TimerKind::RunTimeout, first));
    assert!(timers.is_armed(TimerKind::RunTimeout));

    let second = match rx.recv().await {
        Some(RuntimeEvent::TimerFired { generation, .. }) => generation,
        other => panic!("expected a tick, got {other:?}"),
    };
    assert!(timers.accept(TimerKind::RunTimeout, second));
    assert!(!timers.is_armed(TimerKind::RunTimeout));
}

#[tokio::test(start_paused = true)]
async fn periodic_timer_stays_armed_until_cancelled() {
    let (tx, mut rx) = mpsc::channel(8);
    let mut timers = Timers::new(tx);

    timers.arm(TimerKind::HealthCheck, TimerSchedule::Every(Duration::from_secs(5)));
    for _ in 0..2 {
        match rx.recv().await {
            Some(RuntimeEvent::TimerFired { timer, generation }) => {
                assert!(timers.accept(timer, generation));
            }
            other => panic!("expected a tick, got {other:?}"),
        }
    }
    assert!(timers.is_armed(TimerKind::HealthCheck));

    timers.cancel(TimerKind::HealthCheck);
    assert!(!timers.is_armed(TimerKind::HealthCheck));
}
