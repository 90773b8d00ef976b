use std::fmt;

use thiserror::Error;

/// Boxed underlying cause carried by [`PipelineError`] variants.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Coarse classification of a [`PipelineError`], used for alert rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Config,
    Network,
    Scraping,
    Delivery,
    Storage,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Config => "ConfigError",
            ErrorKind::Network => "NetworkError",
            ErrorKind::Scraping => "ScrapingError",
            ErrorKind::Delivery => "DeliveryError",
            ErrorKind::Storage => "StorageError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every failure the pipeline can observe.
///
/// The rendered message (`Display`) doubles as the escalation signature, so
/// it must be stable for repeated occurrences of the same failure: it never
/// includes timestamps or attempt counters.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Fatal at startup. Never escalated.
    #[error("{message}")]
    Config { message: String },

    /// Candidate listing could not be fetched; aborts one cycle.
    #[error("{}", render(.message, .source))]
    Network {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// A listing or story could not be parsed; aborts one item.
    #[error("{}", render(.message, .source))]
    Scraping {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// The sink rejected a header or chunk; the item stays unmarked.
    #[error("{}", render(.message, .source))]
    Delivery {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// The dedup snapshot could not be written.
    #[error("{}", render(.message, .source))]
    Storage {
        message: String,
        #[source]
        source: Option<BoxError>,
    },
}

fn render(message: &str, source: &Option<BoxError>) -> String {
    match source {
        Some(e) => format!("{message}: {e}"),
        None => message.to_string(),
    }
}

impl PipelineError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Network {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn scraping(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Scraping {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Scraping failure with no underlying error (e.g. a required field was empty).
    pub fn scraping_msg(message: impl Into<String>) -> Self {
        Self::Scraping {
            message: message.into(),
            source: None,
        }
    }

    pub fn delivery(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Delivery {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn storage(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Storage {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config { .. } => ErrorKind::Config,
            Self::Network { .. } => ErrorKind::Network,
            Self::Scraping { .. } => ErrorKind::Scraping,
            Self::Delivery { .. } => ErrorKind::Delivery,
            Self::Storage { .. } => ErrorKind::Storage,
        }
    }

    /// Context message without the underlying cause.
    pub fn message(&self) -> &str {
        match self {
            Self::Config { message }
            | Self::Network { message, .. }
            | Self::Scraping { message, .. }
            | Self::Delivery { message, .. }
            | Self::Storage { message, .. } => message,
        }
    }

    /// Rendered chain of underlying causes, outermost first.
    pub fn causes(&self) -> Vec<String> {
        let mut out = Vec::new();
        let mut next = std::error::Error::source(self);
        while let Some(e) = next {
            out.push(e.to_string());
            next = e.source();
        }
        out
    }
}
