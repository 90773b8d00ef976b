//! One poll of one source.
//!
//! The first successful listing since process start is the bootstrap: only
//! the newest story is announced and the backlog is marked as seen, so a
//! fresh deployment does not flood the channel. An empty first listing still
//! ends the bootstrap. Every later listing dispatches all candidates.

use std::time::Instant;

use tokio::task::JoinSet;
use tracing::{debug, error, info};

use storywatch_core::PipelineError;

use crate::processor::{ItemOutcome, ItemProcessor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Bootstrap,
    SteadyState,
}

/// Counters for one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub candidates: usize,
    /// Items spawned as delivery tasks.
    pub dispatched: usize,
    /// Backlog items marked during bootstrap without delivery.
    pub absorbed: usize,
    pub delivered: usize,
    /// Items found already present in the dedup store.
    pub skipped: usize,
    pub failed: usize,
}

pub struct IngestionCycle {
    processor: ItemProcessor,
    state: RunState,
}

impl IngestionCycle {
    pub fn new(processor: ItemProcessor) -> Self {
        Self {
            processor,
            state: RunState::Bootstrap,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn source_name(&self) -> &str {
        self.processor.source().name()
    }

    pub fn processor(&self) -> &ItemProcessor {
        &self.processor
    }

    /// List, dispatch, and wait for every dispatched task.
    ///
    /// A listing failure aborts the cycle and leaves the run state unchanged.
    pub async fn run(&mut self) -> Result<CycleReport, PipelineError> {
        let started = Instant::now();
        let source = self.processor.source().name().to_string();

        let candidates = self.processor.source().list_candidates().await?;
        let mut report = CycleReport {
            candidates: candidates.len(),
            ..CycleReport::default()
        };
        if candidates.is_empty() {
            self.state = RunState::SteadyState;
            debug!(source = %source, "no candidates");
            return Ok(report);
        }

        let mut tasks = JoinSet::new();
        match self.state {
            RunState::Bootstrap => {
                let mut candidates = candidates.into_iter();
                if let Some(newest) = candidates.next() {
                    let processor = self.processor.clone();
                    tasks.spawn(async move { processor.process(newest).await });
                }
                for candidate in candidates {
                    match self.processor.absorb(&candidate).await {
                        Ok(true) => report.absorbed += 1,
                        Ok(false) => report.skipped += 1,
                        Err(e) => {
                            self.processor.escalator().report(&source, &e).await;
                            report.failed += 1;
                        }
                    }
                }
                self.state = RunState::SteadyState;
                info!(source = %source, absorbed = report.absorbed, "bootstrap complete");
            }
            RunState::SteadyState => {
                for candidate in candidates {
                    let processor = self.processor.clone();
                    tasks.spawn(async move { processor.process(candidate).await });
                }
            }
        }
        report.dispatched = tasks.len();

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(ItemOutcome::Delivered) => report.delivered += 1,
                Ok(ItemOutcome::AlreadySeen) => report.skipped += 1,
                Ok(ItemOutcome::Failed) => report.failed += 1,
                Err(e) => {
                    error!(source = %source, error = %e, "story task panicked");
                    report.failed += 1;
                }
            }
        }

        info!(
            source = %source,
            candidates = report.candidates,
            dispatched = report.dispatched,
            absorbed = report.absorbed,
            delivered = report.delivered,
            skipped = report.skipped,
            failed = report.failed,
            duration_ms = started.elapsed().as_millis() as u64,
            "cycle complete"
        );
        Ok(report)
    }
}
