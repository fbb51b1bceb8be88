use clap::Subcommand;
use timeledger_core::Config;

use super::{open_engine, print_json, CmdResult};

#[derive(Subcommand)]
pub enum WorkdayAction {
    /// Print today's budget, starting a new day if needed
    Show,
    /// Restore today's full budget
    Reset,
}

pub fn run(action: WorkdayAction) -> CmdResult {
    let config = Config::load_or_default();
    let engine = open_engine(&config)?;

    let working_day = match action {
        WorkdayAction::Show => engine.ensure_working_day()?,
        WorkdayAction::Reset => engine.reset_working_day()?,
    };
    print_json(&serde_json::json!({
        "day": working_day.day,
        "daily_budget_seconds": working_day.daily_budget_seconds,
        "remaining_seconds": working_day.remaining_seconds,
        "used_seconds": working_day.used_seconds(),
        "started_at": working_day.started_at,
    }))
}
