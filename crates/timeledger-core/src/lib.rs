//! # Timeledger Core Library
//!
//! Timer and workday-budget accounting for a task time tracker. Every
//! operation is available through the standalone `timeledger` CLI, which is a
//! thin layer over this crate.
//!
//! ## Architecture
//!
//! - **Timer Engine**: start / stop / advance use-cases over a wall clock.
//!   The caller (normally the [`Scheduler`]) invokes `advance()` once per
//!   elapsed second.
//! - **Working day**: a daily budget of trackable seconds, decremented while
//!   anything runs and reset lazily on the first access of a new day.
//! - **Storage**: SQLite persistence behind repository traits, TOML
//!   configuration, and an importer for legacy JSON exports.
//! - **Events**: every state change is published on a [`ChangeBus`].
//!
//! ## Key Components
//!
//! - [`TimerEngine`]: timer use-cases
//! - [`Scheduler`]: single global tick with catch-up and a cross-process lease
//! - [`Database`]: SQLite implementation of [`TimerStore`]
//! - [`Config`]: application configuration management

pub mod error;
pub mod events;
pub mod notify;
pub mod storage;
pub mod task;
pub mod timer;
pub mod workday;

pub use error::{ConfigError, CoreError, DatabaseError, TimerError, ValidationError};
pub use events::{ChangeBus, Event, Resource};
pub use notify::{LogNotifier, NoopNotifier, NotificationOptions, Notifier};
pub use storage::{Config, Database, TimerStore};
pub use task::{Task, TaskStatus};
pub use timer::{
    Clock, LiveSnapshot, ManualClock, Scheduler, SchedulerSettings, StartRequest, StopReason,
    StopRequest, SystemClock, TimerEngine, TimerMode, TimerSession, TimerSettings,
};
pub use workday::WorkingDay;
