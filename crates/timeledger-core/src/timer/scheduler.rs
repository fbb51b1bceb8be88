//! Global tick scheduler.
//!
//! Drives [`TimerEngine::advance`] once per elapsed wall-clock second. The
//! first `start` wins and later calls are no-ops. Across processes sharing one
//! database only the holder of the tick lease advances; the others keep
//! counting ticks for their displays.
//!
//! Catch-up: when more than one second passed since the last processed tick
//! (missed timer wakeups, a restart), one advance runs per whole elapsed
//! second, up to `max_catch_up_steps`. Seconds beyond the cap are charged to
//! the budget in one block and the anchor moves to now. The sub-second
//! remainder is carried to the next tick.

use std::future::Future;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::{self, Duration, MissedTickBehavior};

use super::engine::{AdvanceReport, TimerEngine};
use crate::error::Result;
use crate::storage::TimerStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerSettings {
    pub tick_interval_ms: u64,
    pub max_catch_up_steps: u64,
    pub lease_ttl_ms: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            max_catch_up_steps: 300,
            lease_ttl_ms: 5000,
        }
    }
}

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TickOutcome {
    /// Monotonic tick counter after this tick.
    pub tick: u64,
    /// Whether this process held the lease and ran business logic.
    pub leader: bool,
    /// Advance steps executed.
    pub steps: u64,
    pub reports: Vec<AdvanceReport>,
}

pub struct Scheduler<S> {
    engine: TimerEngine<S>,
    settings: SchedulerSettings,
    owner_id: String,
    counter: watch::Sender<u64>,
    running: bool,
    last_business_ms: Option<u64>,
}

impl<S: TimerStore> Scheduler<S> {
    pub fn new(engine: TimerEngine<S>, settings: SchedulerSettings) -> Self {
        let (counter, _) = watch::channel(0);
        Self {
            engine,
            settings,
            owner_id: uuid::Uuid::new_v4().to_string(),
            counter,
            running: false,
            last_business_ms: None,
        }
    }

    pub fn engine(&self) -> &TimerEngine<S> {
        &self.engine
    }

    pub fn settings(&self) -> SchedulerSettings {
        self.settings
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    /// Receiver of the tick counter; fires after every tick.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.counter.subscribe()
    }

    pub fn tick_count(&self) -> u64 {
        *self.counter.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Start ticking. Returns `false` if already started.
    ///
    /// Recovers persisted countdown state before the first tick.
    pub fn start(&mut self) -> Result<bool> {
        if self.running {
            return Ok(false);
        }
        self.engine.recover_countdowns()?;
        self.running = true;
        self.last_business_ms = None;
        tracing::info!(owner = %self.owner_id, interval_ms = self.settings.tick_interval_ms, "scheduler started");
        Ok(true)
    }

    /// Stop ticking and hand the lease back.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;
        self.last_business_ms = None;
        if let Err(e) = self.engine.store().release_lease(&self.owner_id) {
            tracing::warn!(error = %e, "could not release tick lease");
        }
        tracing::info!(owner = %self.owner_id, "scheduler stopped");
    }

    /// Process one timer wakeup.
    ///
    /// `None` when the scheduler is not running.
    pub fn fire(&mut self) -> Option<TickOutcome> {
        if !self.running {
            return None;
        }
        self.counter.send_modify(|n| *n += 1);
        let mut outcome = TickOutcome {
            tick: self.tick_count(),
            ..TickOutcome::default()
        };

        let store = self.engine.store();
        let now = self.engine.clock().now_ms();
        match store.try_acquire_lease(&self.owner_id, now, self.settings.lease_ttl_ms) {
            Ok(true) => {}
            Ok(false) => {
                // Another process ticks; re-read its anchor once we take over.
                self.last_business_ms = None;
                return Some(outcome);
            }
            Err(e) => {
                tracing::warn!(error = %e, "tick lease check failed");
                return Some(outcome);
            }
        }
        outcome.leader = true;

        let last = match self.last_business_ms {
            Some(last) => Some(last),
            None => match store.last_tick_at() {
                Ok(last) => last,
                Err(e) => {
                    tracing::warn!(error = %e, "could not read last tick");
                    None
                }
            },
        };
        let Some(last) = last.filter(|&last| last <= now) else {
            // First tick ever, or the clock went backwards: anchor only.
            self.anchor(now);
            return Some(outcome);
        };

        let due = (now - last) / 1000;
        if due == 0 {
            self.last_business_ms = Some(last);
            return Some(outcome);
        }
        let cap = self.settings.max_catch_up_steps.max(1);
        let steps = due.min(cap);
        if steps < due {
            tracing::warn!(due, steps, "tick gap exceeds catch-up limit, charging the rest in one block");
        }

        let mut executed = 0;
        let mut went_idle = false;
        for _ in 0..steps {
            executed += 1;
            match self.engine.advance() {
                Ok(report) => {
                    went_idle = report.is_idle();
                    outcome.reports.push(report);
                    if went_idle {
                        // Nothing running: the remaining steps would be no-ops.
                        break;
                    }
                }
                Err(e) => tracing::warn!(error = %e, "advance failed"),
            }
        }
        outcome.steps = executed;

        if steps < due && !went_idle {
            match self.engine.charge_missed_seconds(due - steps) {
                Ok(report) => outcome.reports.push(report),
                Err(e) => tracing::warn!(error = %e, "could not charge missed seconds"),
            }
        }

        let next = if steps < due { now } else { last + steps * 1000 };
        self.anchor(next);
        Some(outcome)
    }

    fn anchor(&mut self, epoch_ms: u64) {
        self.last_business_ms = Some(epoch_ms);
        if let Err(e) = self.engine.store().set_last_tick_at(epoch_ms) {
            tracing::warn!(error = %e, "could not persist last tick");
        }
    }

    /// Tick on a tokio interval until `shutdown` resolves.
    ///
    /// `on_tick` sees every outcome. The scheduler is started if it was not
    /// already, and stopped on return.
    pub async fn run<F, T>(&mut self, shutdown: F, mut on_tick: T) -> Result<()>
    where
        F: Future<Output = ()>,
        T: FnMut(&TickOutcome),
    {
        self.start()?;
        let mut interval = time::interval(Duration::from_millis(self.settings.tick_interval_ms.max(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = interval.tick() => {
                    if let Some(outcome) = self.fire() {
                        on_tick(&outcome);
                    }
                }
            }
        }

        self.stop();
        Ok(())
    }
}
