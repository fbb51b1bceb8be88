mod config;
pub mod database;
pub mod legacy;
pub mod migrations;
pub mod repository;

pub use config::{
    Config, NotificationsConfig, RatesConfig, SchedulerConfig, WorkdayConfig,
};
pub use database::Database;
pub use repository::{
    SessionStore, StopCommit, StoreResult, TaskStore, TickLease, TickStateStore, TimerStore,
    WorkingDayStore,
};

use std::path::PathBuf;

/// Returns `~/.config/timeledger[-dev]/` based on TIMELEDGER_ENV.
///
/// Set TIMELEDGER_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if creating the config directory fails.
pub fn data_dir() -> std::io::Result<PathBuf> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("TIMELEDGER_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("timeledger-dev")
    } else {
        base_dir.join("timeledger")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
