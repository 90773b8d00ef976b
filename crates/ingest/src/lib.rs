//! Polling pipeline: list candidates, skip what was already delivered,
//! announce the rest.
//!
//! - `SourceAdapter` trait implemented by each story source
//! - `ItemProcessor` runs the per-story has → parse → deliver → mark sequence
//! - `IngestionCycle` applies the bootstrap / steady-state dispatch policy
//! - `Scheduler` drives cycles on a fixed interval until shutdown

pub mod cycle;
pub mod processor;
pub mod scheduler;
pub mod source;

pub use cycle::{CycleReport, IngestionCycle, RunState};
pub use processor::{ItemOutcome, ItemProcessor};
pub use scheduler::Scheduler;
pub use source::{story_header, SourceAdapter};
