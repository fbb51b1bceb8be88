use clap::Subcommand;
use timeledger_core::storage::legacy::import_tasks;
use timeledger_core::storage::TaskStore;
use timeledger_core::{Config, Task, TimerError};

use super::{open_engine, print_json, CmdResult};

#[derive(Subcommand)]
pub enum TaskAction {
    /// Create a task
    Add {
        /// Task title
        title: String,
        /// Project the task belongs to
        #[arg(long, default_value = "default")]
        project: String,
        /// Hourly rate in cents, overriding the configured default
        #[arg(long)]
        rate: Option<u64>,
        /// Estimated duration in minutes; enables the countdown
        #[arg(long)]
        estimate: Option<u32>,
    },
    /// List tasks with live figures
    List,
    /// Show one task
    Show {
        /// Task ID
        id: String,
    },
    /// Assign a member to a task
    Assign {
        /// Task ID
        id: String,
        /// Member ID
        member: String,
        /// Remove the member instead
        #[arg(long)]
        remove: bool,
    },
    /// Stop the timer if running and mark the task completed
    Complete {
        /// Task ID
        id: String,
    },
    /// Zero accumulated time and earnings
    Reset {
        /// Task ID
        id: String,
    },
    /// Delete a task and its sessions
    Delete {
        /// Task ID
        id: String,
    },
    /// Import tasks from a legacy JSON export
    Import {
        /// Path to the JSON file
        file: std::path::PathBuf,
    },
}

pub fn run(action: TaskAction) -> CmdResult {
    let config = Config::load_or_default();
    let engine = open_engine(&config)?;
    let store = engine.store();

    match action {
        TaskAction::Add {
            title,
            project,
            rate,
            estimate,
        } => {
            let mut task = Task::new(uuid::Uuid::new_v4().to_string(), project, title);
            task.hourly_rate_cents = rate;
            task.estimated_minutes = estimate;
            store.save_task(&task)?;
            print_json(&task)?;
        }
        TaskAction::List => {
            print_json(&engine.snapshot_all()?)?;
        }
        TaskAction::Show { id } => {
            let task = store
                .get_task(&id)?
                .ok_or_else(|| TimerError::TaskNotFound(id.clone()))?;
            let live = engine.live(&id)?;
            print_json(&serde_json::json!({ "task": task, "live": live }))?;
        }
        TaskAction::Assign { id, member, remove } => {
            let mut task = store
                .get_task(&id)?
                .ok_or_else(|| TimerError::TaskNotFound(id.clone()))?;
            let changed = if remove {
                task.unassign(&member)
            } else {
                task.assign(member)
            };
            if changed {
                task.updated_at = chrono::Utc::now();
                store.save_task(&task)?;
            }
            print_json(&task)?;
        }
        TaskAction::Complete { id } => {
            print_json(&engine.complete(&id)?)?;
        }
        TaskAction::Reset { id } => {
            print_json(&engine.reset_totals(&id)?)?;
        }
        TaskAction::Delete { id } => {
            engine.stop(&timeledger_core::StopRequest::task(id.clone()))?;
            if !store.delete_task(&id)? {
                return Err(TimerError::TaskNotFound(id).into());
            }
            print_json(&serde_json::json!({ "deleted": id }))?;
        }
        TaskAction::Import { file } => {
            let json = std::fs::read_to_string(&file)?;
            let tasks = engine.import_tasks(import_tasks(&json)?)?;
            tracing::info!(count = tasks.len(), file = %file.display(), "tasks imported");
            print_json(&tasks)?;
        }
    }
    Ok(())
}
