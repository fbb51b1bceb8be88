//! Working-day budget.
//!
//! One record per calendar day holding how many seconds of tracked work are
//! still allowed today. Rollover is lazy: the record is reset the first time
//! it is accessed on a new day.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Default budget: eight hours.
pub const DEFAULT_DAILY_BUDGET_SECONDS: u64 = 8 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingDay {
    pub day: NaiveDate,
    pub daily_budget_seconds: u64,
    pub remaining_seconds: u64,
    /// Epoch ms of the first decrement of the day.
    #[serde(default)]
    pub started_at: Option<u64>,
}

impl WorkingDay {
    pub fn fresh(day: NaiveDate, daily_budget_seconds: u64) -> Self {
        Self {
            day,
            daily_budget_seconds,
            remaining_seconds: daily_budget_seconds,
            started_at: None,
        }
    }

    pub fn is_for(&self, day: NaiveDate) -> bool {
        self.day == day
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining_seconds == 0
    }

    pub fn used_seconds(&self) -> u64 {
        self.daily_budget_seconds.saturating_sub(self.remaining_seconds)
    }

    /// Decrement, floored at zero.
    pub fn decrement(&mut self, seconds: u64, now_ms: u64) {
        self.remaining_seconds = self.remaining_seconds.saturating_sub(seconds);
        self.started_at.get_or_insert(now_ms);
    }
}
