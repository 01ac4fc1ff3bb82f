//! Feed error types.

use thiserror::Error;

/// Errors raised while obtaining or parsing the listing feed.
///
/// Both `Fetch` and `Format` are fatal to a reconciliation run: no plan is
/// computed and nothing is mutated.
#[derive(Debug, Error)]
pub enum FeedError {
    /// Transport failure while retrieving the feed.
    #[error("feed fetch failed: {message}")]
    Fetch {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The payload is not a structurally valid listing document.
    #[error("feed format error: {message}")]
    Format { message: String },

    /// The video catalog could not be loaded.
    #[error("video catalog error: {message}")]
    Catalog { message: String },
}

impl FeedError {
    /// Create a fetch error.
    pub fn fetch(message: impl Into<String>) -> Self {
        FeedError::Fetch {
            message: message.into(),
            source: None,
        }
    }

    /// Create a fetch error with source.
    pub fn fetch_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        FeedError::Fetch {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a format error.
    pub fn format(message: impl Into<String>) -> Self {
        FeedError::Format {
            message: message.into(),
        }
    }

    /// Create a catalog error.
    pub fn catalog(message: impl Into<String>) -> Self {
        FeedError::Catalog {
            message: message.into(),
        }
    }

    /// Get an error code for classification.
    pub fn error_code(&self) -> &'static str {
        match self {
            FeedError::Fetch { .. } => "FEED_FETCH",
            FeedError::Format { .. } => "FEED_FORMAT",
            FeedError::Catalog { .. } => "FEED_CATALOG",
        }
    }
}

/// Result type for feed operations.
pub type FeedResult<T> = Result<T, FeedError>;
