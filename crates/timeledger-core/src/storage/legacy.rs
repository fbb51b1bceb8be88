//! One-way import of task records exported by older builds.
//!
//! Old exports used camelCase and a handful of different field names
//! (`timeSpent`, `earnings`, `hourlyRate`, `assignedTo`, ...). They are mapped
//! onto [`Task`] here and nowhere else; the timer core only sees the unified
//! shape. A task that was running in the old export is imported stopped:
//! its live figures are dropped and its totals kept.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::task::{Task, TaskStatus};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyTask {
    pub id: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(alias = "name")]
    pub title: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, alias = "timeSpent")]
    pub total_time_seconds: u64,
    #[serde(default, alias = "earnings")]
    pub earnings_cents: u64,
    #[serde(default, alias = "hourlyRate")]
    pub hourly_rate_cents: Option<u64>,
    #[serde(default)]
    pub estimated_minutes: Option<u32>,
    #[serde(default)]
    pub is_running: bool,
    #[serde(default, alias = "startTime")]
    pub current_start_at: Option<u64>,
    #[serde(default, alias = "assignedTo")]
    pub assigned_member_ids: Vec<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl LegacyTask {
    /// Whether the export claimed the task was being timed.
    pub fn was_running(&self) -> bool {
        self.is_running || self.current_start_at.is_some()
    }
}

impl From<LegacyTask> for Task {
    fn from(legacy: LegacyTask) -> Self {
        let status = legacy
            .status
            .as_deref()
            .and_then(|s| TaskStatus::parse(&s.to_ascii_lowercase()))
            .unwrap_or(if legacy.total_time_seconds > 0 || legacy.was_running() {
                TaskStatus::Active
            } else {
                TaskStatus::Pending
            });
        let created_at = legacy.created_at.unwrap_or_else(Utc::now);

        Task {
            id: legacy.id,
            project_id: legacy.project_id,
            title: legacy.title,
            status,
            total_time_seconds: legacy.total_time_seconds,
            earnings_cents: legacy.earnings_cents,
            current_time_seconds: 0,
            current_cents: 0,
            current_start_at: None,
            hourly_rate_cents: legacy.hourly_rate_cents,
            estimated_minutes: legacy.estimated_minutes,
            countdown: None,
            assigned_member_ids: legacy
                .assigned_member_ids
                .into_iter()
                .filter(|m| !m.is_empty())
                .collect::<BTreeSet<_>>(),
            created_at,
            updated_at: Utc::now(),
        }
    }
}

/// Parse a JSON array of legacy tasks.
pub fn import_tasks(json: &str) -> Result<Vec<Task>, serde_json::Error> {
    let legacy: Vec<LegacyTask> = serde_json::from_str(json)?;
    Ok(legacy.into_iter().map(Task::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_field_names_are_normalized() {
        let json = r#"[{
            "id": "t-1",
            "projectId": "p-1",
            "name": "Old task",
            "timeSpent": 90,
            "earnings": 150,
            "hourlyRate": 6000,
            "assignedTo": ["b", "a", "b", ""]
        }]"#;
        let tasks = import_tasks(json).unwrap();
        let task = &tasks[0];
        assert_eq!(task.title, "Old task");
        assert_eq!(task.project_id, "p-1");
        assert_eq!(task.total_time_seconds, 90);
        assert_eq!(task.earnings_cents, 150);
        assert_eq!(task.hourly_rate_cents, Some(6000));
        assert_eq!(task.status, TaskStatus::Active);
        assert_eq!(task.assigned_member_ids.len(), 2);
    }

    #[test]
    fn unified_field_names_are_accepted() {
        let json = r#"[{
            "id": "t-2",
            "title": "New shape",
            "status": "COMPLETED",
            "totalTimeSeconds": 5,
            "earningsCents": 1,
            "estimatedMinutes": 30
        }]"#;
        let task = import_tasks(json).unwrap().remove(0);
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.total_time_seconds, 5);
        assert_eq!(task.estimated_minutes, Some(30));
    }

    #[test]
    fn running_legacy_task_is_imported_stopped() {
        let json = r#"[{"id": "t-3", "title": "x", "isRunning": true, "startTime": 1700000000000}]"#;
        let task = import_tasks(json).unwrap().remove(0);
        assert!(!task.is_running());
        assert_eq!(task.current_time_seconds, 0);
        assert!(task.countdown.is_none());
        assert_eq!(task.status, TaskStatus::Active);
    }

    #[test]
    fn malformed_export_is_an_error() {
        assert!(import_tasks(r#"{"id": "not-an-array"}"#).is_err());
    }
}
