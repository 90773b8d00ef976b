pub mod config;
pub mod error;
pub mod item;

pub use config::{Config, Mode, MissedTick, SourceConfig, SourceKind, WebhookCredentials};
pub use error::*;
pub use item::*;
