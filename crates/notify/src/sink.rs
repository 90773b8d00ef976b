//! Per-sink delivery of one story: a header message followed by the body
//! split into chunks.

use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};

use crate::chunking::{self, MAX_CHUNK_CHARS, MAX_FIELD_CHARS, MAX_TITLE_CHARS};
use crate::traits::{Message, MessageChannel, NotifyError};

/// Header of a delivery: title plus labelled metadata lines.
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    pub title: String,
    pub fields: Vec<(String, String)>,
}

impl Header {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, label: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((label.into(), value.into()));
        self
    }
}

/// Size limits enforced before anything reaches the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkLimits {
    pub title_chars: usize,
    pub field_chars: usize,
    pub chunk_chars: usize,
}

impl Default for SinkLimits {
    fn default() -> Self {
        Self {
            title_chars: MAX_TITLE_CHARS,
            field_chars: MAX_FIELD_CHARS,
            chunk_chars: MAX_CHUNK_CHARS,
        }
    }
}

/// Why a delivery stopped.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("failed to send header")]
    Header(#[source] NotifyError),

    #[error("failed to send chunk {part} of {total}")]
    Chunk {
        part: usize,
        total: usize,
        #[source]
        source: NotifyError,
    },
}

/// A chat sink for one source.
///
/// Deliveries are serialized: only the holder of a [`DeliveryPermit`] may
/// send, so the messages of two stories never interleave in the channel.
pub struct NotificationSink {
    channel: Arc<dyn MessageChannel>,
    delivery_lock: Mutex<()>,
    limits: SinkLimits,
    color: u32,
    body_label: String,
}

impl NotificationSink {
    pub fn new(channel: Arc<dyn MessageChannel>, color: u32) -> Self {
        Self {
            channel,
            delivery_lock: Mutex::new(()),
            limits: SinkLimits::default(),
            color,
            body_label: "Review/Description".to_string(),
        }
    }

    pub fn with_limits(mut self, limits: SinkLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Label used for body chunk titles.
    pub fn with_body_label(mut self, label: impl Into<String>) -> Self {
        self.body_label = label.into();
        self
    }

    pub fn channel_name(&self) -> &str {
        self.channel.channel_name()
    }

    /// Wait for exclusive use of the sink.
    pub async fn acquire(&self) -> DeliveryPermit<'_> {
        DeliveryPermit {
            _guard: self.delivery_lock.lock().await,
            sink: self,
        }
    }

    /// Deliver `header` and then `body` as one uninterrupted sequence.
    ///
    /// Returns the number of body chunks sent.
    pub async fn deliver(&self, header: &Header, body: &str) -> Result<usize, DeliveryError> {
        let permit = self.acquire().await;
        permit.send_header(header).await?;
        permit.send_body(body).await
    }

    fn header_message(&self, header: &Header) -> Message {
        let description = header
            .fields
            .iter()
            .map(|(label, value)| {
                format!(
                    "**{label}:** {}",
                    chunking::truncate(value, self.limits.field_chars)
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        Message::embed(
            chunking::truncate(&header.title, self.limits.title_chars),
            description,
            self.color,
        )
    }
}

/// Exclusive right to send on a [`NotificationSink`]; released on drop.
pub struct DeliveryPermit<'a> {
    _guard: MutexGuard<'a, ()>,
    sink: &'a NotificationSink,
}

impl DeliveryPermit<'_> {
    pub async fn send_header(&self, header: &Header) -> Result<(), DeliveryError> {
        self.sink
            .channel
            .send(&self.sink.header_message(header))
            .await
            .map_err(DeliveryError::Header)
    }

    /// Send `body` chunk by chunk, stopping at the first failure.
    pub async fn send_body(&self, body: &str) -> Result<usize, DeliveryError> {
        let chunks = chunking::split_body(body, self.sink.limits.chunk_chars);
        let total = chunks.len();

        for (i, chunk) in chunks.into_iter().enumerate() {
            let part = i + 1;
            let title = chunking::chunk_title(&self.sink.body_label, part, total);
            self.sink
                .channel
                .send(&Message::embed(title, chunk, self.sink.color))
                .await
                .map_err(|source| DeliveryError::Chunk {
                    part,
                    total,
                    source,
                })?;
        }

        tracing::debug!(
            channel = %self.sink.channel_name(),
            chunks = total,
            "body delivered"
        );
        Ok(total)
    }
}
