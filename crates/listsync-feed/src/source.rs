//! Feed transport.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, instrument};

use crate::error::{FeedError, FeedResult};

/// Default request timeout for feed downloads.
pub const DEFAULT_FEED_TIMEOUT: Duration = Duration::from_secs(30);

/// Supplies the raw feed payload for a run.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Fetch the complete feed document.
    async fn fetch(&self) -> FeedResult<String>;
}

/// Downloads the feed over HTTP GET.
#[derive(Debug, Clone)]
pub struct HttpFeedSource {
    client: Client,
    endpoint: String,
}

impl HttpFeedSource {
    /// Create a source for `endpoint` with the given request timeout.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> FeedResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FeedError::fetch_with_source("failed to build HTTP client", e))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    async fn fetch(&self) -> FeedResult<String> {
        let response = self
            .client
            .get(&self.endpoint)
            .send()
            .await
            .map_err(|e| {
                let message = if e.is_timeout() {
                    "request timed out"
                } else {
                    "request failed"
                };
                FeedError::fetch_with_source(message, e)
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::fetch(format!(
                "endpoint returned status {}",
                status.as_u16()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| FeedError::fetch_with_source("failed to read response body", e))?;

        debug!(bytes = body.len(), "Fetched feed");
        Ok(body)
    }
}

/// Serves a fixed payload. Used for dry runs and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticFeedSource {
    payload: String,
}

impl StaticFeedSource {
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
        }
    }
}

#[async_trait]
impl FeedSource for StaticFeedSource {
    async fn fetch(&self) -> FeedResult<String> {
        Ok(self.payload.clone())
    }
}
