//! Story sources.
//!
//! - `http`: shared fetcher with browser-like headers and content decoding
//! - `mula`: HTML listing + story page scraper
//! - `oak`: JSON API source with API key discovery
//! - `text`: HTML block flattening shared by both sources

pub mod http;
pub mod mula;
pub mod oak;
pub mod text;

pub use http::{FetchError, HttpFetcher};
pub use mula::MulaSource;
pub use oak::OakSource;
