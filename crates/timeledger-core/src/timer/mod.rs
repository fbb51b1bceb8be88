mod clock;
pub mod countdown;
mod engine;
mod live;
mod scheduler;
mod session;

pub use clock::{Clock, ManualClock, SystemClock};
pub use countdown::CountdownProgress;
pub use engine::{
    AdvanceReport, LiveUpdate, StartRequest, StopOutcome, StopReason, StopRequest, StoppedSession,
    TimerEngine, TimerSettings,
};
pub use live::LiveSnapshot;
pub use scheduler::{Scheduler, SchedulerSettings, TickOutcome};
pub use session::{SessionState, TimerMode, TimerSession};
