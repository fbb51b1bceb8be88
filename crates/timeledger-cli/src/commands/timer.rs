use clap::Subcommand;
use timeledger_core::timer::TimerMode;
use timeledger_core::{Config, StartRequest, StopRequest};

use super::{open_engine, print_json, CmdResult};

#[derive(Subcommand)]
pub enum TimerAction {
    /// Start timing a task; returns the running session if one exists
    Start {
        /// Task ID
        task_id: String,
        /// Member doing the work
        #[arg(long, default_value = "me")]
        member: String,
        /// Count down from this many seconds and stop at zero
        #[arg(long)]
        target: Option<u64>,
    },
    /// Stop the timer of a task
    Stop {
        /// Task ID
        task_id: String,
        /// Stop this specific session
        #[arg(long)]
        session: Option<String>,
    },
    /// Print live figures of one task, or of every task plus today's budget
    Status {
        /// Task ID
        task_id: Option<String>,
    },
}

pub fn run(action: TimerAction) -> CmdResult {
    let config = Config::load_or_default();
    let engine = open_engine(&config)?;

    match action {
        TimerAction::Start {
            task_id,
            member,
            target,
        } => {
            let mode = match target {
                Some(seconds) => TimerMode::countdown(seconds),
                None => TimerMode::Countup,
            };
            let session = engine.start(&StartRequest {
                task_id,
                member_id: member,
                mode,
            })?;
            print_json(&session)?;
        }
        TimerAction::Stop { task_id, session } => {
            let request = match session {
                Some(session_id) => StopRequest::session(session_id, task_id),
                None => StopRequest::task(task_id),
            };
            print_json(&engine.stop(&request)?)?;
        }
        TimerAction::Status { task_id: Some(id) } => match engine.live(&id)? {
            Some(snapshot) => print_json(&snapshot)?,
            None => print_json(&serde_json::json!({ "task_id": id, "running": false }))?,
        },
        TimerAction::Status { task_id: None } => {
            let working_day = engine.ensure_working_day()?;
            let tasks: Vec<_> = engine
                .snapshot_all()?
                .into_iter()
                .filter(|s| s.running)
                .collect();
            print_json(&serde_json::json!({
                "working_day": working_day,
                "running": tasks,
            }))?;
        }
    }
    Ok(())
}
