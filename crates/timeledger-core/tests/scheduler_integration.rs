//! Integration tests for the tick scheduler: catch-up after a restart and
//! single-writer ticking across processes sharing one database file.

use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;
use timeledger_core::storage::{SessionStore, TaskStore, TickStateStore};
use timeledger_core::{
    Database, ManualClock, Scheduler, SchedulerSettings, StartRequest, Task, TimerEngine,
    TimerSettings,
};

const T0: u64 = 1_800_000_000_000;

fn scheduler_at(path: &Path, clock: Arc<ManualClock>) -> Scheduler<Database> {
    let db = Database::open_at(path).unwrap();
    let settings = TimerSettings {
        default_hourly_rate_cents: 3600,
        daily_budget_seconds: 28_800,
    };
    Scheduler::new(
        TimerEngine::new(db, clock, settings),
        SchedulerSettings::default(),
    )
}

fn seeded(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("timeledger.db");
    let db = Database::open_at(&path).unwrap();
    db.save_task(&Task::new("t1", "p", "Design review")).unwrap();
    path
}

#[test]
fn test_restart_catches_up_elapsed_seconds() {
    let dir = TempDir::new().unwrap();
    let path = seeded(&dir);
    let clock = Arc::new(ManualClock::new(T0));

    {
        let mut first = scheduler_at(&path, clock.clone());
        first.engine().start(&StartRequest::countup("t1", "me")).unwrap();
        first.start().unwrap();
        first.fire();
        clock.advance_secs(5);
        assert_eq!(first.fire().unwrap().steps, 5);
        first.stop();
    }

    // Process was down for 20 seconds.
    clock.advance_secs(20);
    let mut second = scheduler_at(&path, clock.clone());
    second.start().unwrap();
    let outcome = second.fire().unwrap();

    assert!(outcome.leader);
    assert_eq!(outcome.steps, 20);
    let day = second.engine().ensure_working_day().unwrap();
    assert_eq!(day.remaining_seconds, 28_800 - 25);
    let task = second.engine().store().get_task("t1").unwrap().unwrap();
    assert_eq!(task.current_time_seconds, 25);
    assert_eq!(task.current_cents, 25);
}

#[test]
fn test_only_lease_holder_advances() {
    let dir = TempDir::new().unwrap();
    let path = seeded(&dir);
    let clock = Arc::new(ManualClock::new(T0));

    let mut a = scheduler_at(&path, clock.clone());
    let mut b = scheduler_at(&path, clock.clone());
    a.engine().start(&StartRequest::countup("t1", "me")).unwrap();
    a.start().unwrap();
    b.start().unwrap();

    assert!(a.fire().unwrap().leader);
    assert!(!b.fire().unwrap().leader);

    for _ in 0..10 {
        clock.advance_secs(1);
        let oa = a.fire().unwrap();
        let ob = b.fire().unwrap();
        assert!(oa.leader);
        assert!(!ob.leader);
        assert_eq!(ob.steps, 0);
    }

    // Both counters move; only one budget decrement per second.
    assert_eq!(a.tick_count(), 11);
    assert_eq!(b.tick_count(), 11);
    let day = a.engine().ensure_working_day().unwrap();
    assert_eq!(day.remaining_seconds, 28_800 - 10);
}

#[test]
fn test_lease_passes_on_when_holder_stops() {
    let dir = TempDir::new().unwrap();
    let path = seeded(&dir);
    let clock = Arc::new(ManualClock::new(T0));

    let mut a = scheduler_at(&path, clock.clone());
    let mut b = scheduler_at(&path, clock.clone());
    a.engine().start(&StartRequest::countup("t1", "me")).unwrap();
    a.start().unwrap();
    b.start().unwrap();
    a.fire();
    b.fire();

    clock.advance_secs(3);
    a.fire();
    a.stop();

    clock.advance_secs(2);
    let outcome = b.fire().unwrap();
    assert!(outcome.leader);
    // Continues from the anchor a persisted, not from b's own start.
    assert_eq!(outcome.steps, 2);
    assert_eq!(b.engine().store().last_tick_at().unwrap(), Some(T0 + 5_000));
}

#[test]
fn test_crashed_holder_lease_expires() {
    let dir = TempDir::new().unwrap();
    let path = seeded(&dir);
    let clock = Arc::new(ManualClock::new(T0));

    let mut a = scheduler_at(&path, clock.clone());
    let mut b = scheduler_at(&path, clock.clone());
    a.start().unwrap();
    b.start().unwrap();
    assert!(a.fire().unwrap().leader);
    drop(a);

    clock.advance_secs(4);
    assert!(!b.fire().unwrap().leader);
    clock.advance_secs(1);
    assert!(b.fire().unwrap().leader);
}

#[test]
fn test_budget_exhaustion_during_catch_up_stops_session() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("timeledger.db");
    let db = Database::open_at(&path).unwrap();
    db.save_task(&Task::new("t1", "p", "x")).unwrap();
    let clock = Arc::new(ManualClock::new(T0));
    let settings = TimerSettings {
        default_hourly_rate_cents: 0,
        daily_budget_seconds: 10,
    };
    let mut scheduler = Scheduler::new(
        TimerEngine::new(db, clock.clone(), settings),
        SchedulerSettings::default(),
    );
    scheduler.engine().start(&StartRequest::countup("t1", "me")).unwrap();
    scheduler.start().unwrap();
    scheduler.fire();

    clock.advance_secs(60);
    let outcome = scheduler.fire().unwrap();

    // Ten steps drain the budget and stop the session; the rest are idle.
    assert_eq!(outcome.reports.len(), 11);
    assert!(scheduler.engine().store().active_sessions().unwrap().is_empty());
    let task = scheduler.engine().store().get_task("t1").unwrap().unwrap();
    assert_eq!(task.total_time_seconds, 60);
}
