use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use storywatch_core::MissedTick;
use storywatch_notify::ErrorEscalator;

use crate::cycle::{CycleReport, IngestionCycle};

/// Runs one source's cycles: immediately, then every `interval`.
///
/// A cycle is awaited before the next tick is taken, so cycles of one source
/// never overlap. `missed_tick` decides what happens to ticks that fell due
/// while a long cycle was running.
pub struct Scheduler {
    cycle: IngestionCycle,
    escalator: Arc<ErrorEscalator>,
    interval: Duration,
    missed_tick: MissedTick,
}

impl Scheduler {
    pub fn new(cycle: IngestionCycle, interval: Duration) -> Self {
        let escalator = cycle.processor().escalator().clone();
        Self {
            cycle,
            escalator,
            interval,
            missed_tick: MissedTick::default(),
        }
    }

    pub fn with_missed_tick(mut self, missed_tick: MissedTick) -> Self {
        self.missed_tick = missed_tick;
        self
    }

    pub fn cycle(&self) -> &IngestionCycle {
        &self.cycle
    }

    /// Run a single cycle. A cycle-level failure is escalated and yields
    /// `None`.
    pub async fn run_once(&mut self) -> Option<CycleReport> {
        match self.cycle.run().await {
            Ok(report) => Some(report),
            Err(e) => {
                self.escalator.report(self.cycle.source_name(), &e).await;
                None
            }
        }
    }

    /// Tick until `shutdown` turns `true` (or its sender is dropped).
    ///
    /// An in-flight cycle always completes before this returns. Returns the
    /// number of cycles run.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> u64 {
        let source = self.cycle.source_name().to_string();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tick_behavior(self.missed_tick));

        info!(
            source = %source,
            interval_secs = self.interval.as_secs(),
            missed_tick = ?self.missed_tick,
            "scheduler started"
        );

        let mut cycles = 0u64;
        while !*shutdown.borrow() {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        warn!(source = %source, "shutdown sender dropped");
                        break;
                    }
                }
                _ = ticker.tick() => {
                    self.run_once().await;
                    cycles += 1;
                }
            }
        }

        info!(source = %source, cycles, "scheduler stopped");
        cycles
    }
}

fn tick_behavior(policy: MissedTick) -> MissedTickBehavior {
    match policy {
        MissedTick::Skip => MissedTickBehavior::Skip,
        MissedTick::Delay => MissedTickBehavior::Delay,
        MissedTick::Burst => MissedTickBehavior::Burst,
    }
}
