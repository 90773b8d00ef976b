//! Outbound messaging for storywatch.
//!
//! This crate provides:
//! - `MessageChannel` trait for pluggable chat sinks
//! - Discord webhook channel implementation
//! - Title/field truncation and body chunking against sink limits
//! - `NotificationSink` which serializes header + chunk sequences per sink
//! - `ErrorEscalator` which forwards failures to an alert channel with a cooldown
//! - Minijinja rendering for alert messages

pub mod chunking;
pub mod discord;
pub mod escalation;
pub mod sink;
pub mod templating;
pub mod traits;

pub use discord::DiscordWebhook;
pub use escalation::{ErrorEscalator, Escalation};
pub use sink::{DeliveryError, DeliveryPermit, Header, NotificationSink, SinkLimits};
pub use templating::TemplateRenderer;
pub use traits::{Message, MessageChannel, NotifyError};
