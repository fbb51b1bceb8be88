use timeledger_core::{Config, Scheduler};

use super::{open_engine, CmdResult};

/// Tick until Ctrl-C, printing every event as one JSON line.
pub fn run() -> CmdResult {
    let config = Config::load()?;
    let engine = open_engine(&config)?;
    let mut events = engine.changes().subscribe_events();
    let mut scheduler = Scheduler::new(engine, config.scheduler_settings());

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "could not listen for Ctrl-C");
        }
    };

    runtime.block_on(scheduler.run(shutdown, |outcome| {
        tracing::debug!(tick = outcome.tick, leader = outcome.leader, steps = outcome.steps, "tick");
        while let Ok(event) = events.try_recv() {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!(error = %e, "could not serialize event"),
            }
        }
    }))?;
    Ok(())
}
