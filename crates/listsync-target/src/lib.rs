//! Target collection clients.
//!
//! [`TargetClient`] is the seam the reconciliation engine mutates through.
//! [`WebflowClient`] implements it against the Webflow Data API v2 with a
//! token-bucket rate limiter and retry with exponential backoff.

pub mod client;
pub mod config;
pub mod error;
pub mod rate_limit;
pub mod webflow;

pub use client::{slugify, TargetClient, TargetItem, TargetItemId};
pub use config::{FieldMapping, WebflowConfig, DEFAULT_API_BASE};
pub use error::{TargetError, TargetResult};
pub use rate_limit::{parse_retry_after, RateLimitConfig, RateLimiter, RetryConfig};
pub use webflow::WebflowClient;
