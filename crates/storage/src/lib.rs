//! Durable dedup state for the story pipeline.
//!
//! [`DedupStore`] is the only persistent state the poller keeps: one JSON
//! snapshot per source recording every story identifier already announced.

pub mod dedup;
pub mod error;

pub use dedup::DedupStore;
pub use error::StorageError;
