//! Message channel trait definition and shared error types.

/// Errors that can occur while handing a message to a channel.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("channel rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: f64 },

    #[error("Template rendering failed: {0}")]
    Template(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// A single message ready for delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Rich message with a title and an accent colour.
    Embed {
        title: String,
        description: String,
        color: u32,
    },
    /// Plain text message.
    Text(String),
}

impl Message {
    pub fn embed(title: impl Into<String>, description: impl Into<String>, color: u32) -> Self {
        Self::Embed {
            title: title.into(),
            description: description.into(),
            color,
        }
    }
}

/// Trait for chat sink implementations.
///
/// A channel delivers exactly one message per call and does not retry.
#[async_trait::async_trait]
pub trait MessageChannel: Send + Sync {
    /// Deliver one message through this channel.
    async fn send(&self, message: &Message) -> Result<(), NotifyError>;

    /// Human-readable name for this channel (e.g., "mula", "alerts").
    fn channel_name(&self) -> &str;
}
