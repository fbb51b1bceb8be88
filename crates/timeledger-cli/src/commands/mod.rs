pub mod config;
pub mod run;
pub mod task;
pub mod timer;
pub mod workday;

use std::sync::Arc;

use serde::Serialize;
use timeledger_core::notify::notifier_for;
use timeledger_core::{Config, Database, SystemClock, TimerEngine};

pub type CmdResult = Result<(), Box<dyn std::error::Error>>;

/// Engine over the on-disk database, configured from `config.toml`.
pub fn open_engine(config: &Config) -> Result<TimerEngine<Database>, Box<dyn std::error::Error>> {
    let db = Database::open()?;
    Ok(
        TimerEngine::new(db, Arc::new(SystemClock), config.timer_settings())
            .with_notifier(notifier_for(config.notifications.enabled)),
    )
}

pub fn print_json<T: Serialize>(value: &T) -> CmdResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
