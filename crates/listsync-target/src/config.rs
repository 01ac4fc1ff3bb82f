//! Webflow client configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::error::{TargetError, TargetResult};
use crate::rate_limit::{RateLimitConfig, RetryConfig};

/// Default Webflow Data API base URL.
pub const DEFAULT_API_BASE: &str = "https://api.webflow.com/v2";

/// Maps listing attribute keys to collection field slugs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldMapping(BTreeMap<String, String>);

impl Default for FieldMapping {
    /// Field slugs of the production property collection.
    fn default() -> Self {
        let pairs = [
            ("title", "name"),
            ("short_description", "property-description"),
            ("size", "property-sqaure-fit"),
            ("bedrooms", "property-bedroom"),
            ("bathrooms", "property-bathroom"),
            ("long_description", "property-overview"),
            ("price", "property-price"),
            ("property_type", "property-type"),
            ("address", "property-address"),
            ("image_1", "property-image"),
            ("image_2", "property-smal-image-1"),
            ("image_3", "property-smal-image-2"),
            ("image_4", "property-smal-image-3"),
            ("image_5", "property-smal-image-4"),
            ("agent_name", "agentname"),
            ("agent_email", "agentemail"),
            ("agent_phone", "agenttel"),
            ("agent_avatar", "agentavatar"),
            ("video_id", "video-one"),
            ("has_video", "video-2"),
        ];
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

impl FieldMapping {
    /// An empty mapping; attributes without an entry are not sent.
    #[must_use]
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    /// Map an attribute to a collection field, replacing any previous entry.
    #[must_use]
    pub fn with_field(mut self, attribute: impl Into<String>, field: impl Into<String>) -> Self {
        self.0.insert(attribute.into(), field.into());
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Configuration for [`crate::WebflowClient`].
#[derive(Clone, Serialize, Deserialize)]
pub struct WebflowConfig {
    /// API base URL, without trailing slash.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Site API token.
    #[serde(skip_serializing)]
    pub token: String,

    /// Collection the listings live in.
    pub collection_id: String,

    #[serde(default)]
    pub field_mapping: FieldMapping,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    /// Per-request timeout in seconds (default: 30).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Page size for collection listing (default: 100, the API maximum).
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_page_size() -> u32 {
    100
}

impl fmt::Debug for WebflowConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebflowConfig")
            .field("api_base", &self.api_base)
            .field("token", &"[REDACTED]")
            .field("collection_id", &self.collection_id)
            .field("field_mapping", &self.field_mapping)
            .field("rate_limit", &self.rate_limit)
            .field("retry", &self.retry)
            .field("timeout_secs", &self.timeout_secs)
            .field("page_size", &self.page_size)
            .finish()
    }
}

impl WebflowConfig {
    /// Create a config with default limits for the given collection.
    pub fn new(token: impl Into<String>, collection_id: impl Into<String>) -> Self {
        Self {
            api_base: default_api_base(),
            token: token.into(),
            collection_id: collection_id.into(),
            field_mapping: FieldMapping::default(),
            rate_limit: RateLimitConfig::default(),
            retry: RetryConfig::default(),
            timeout_secs: default_timeout_secs(),
            page_size: default_page_size(),
        }
    }

    /// Point the client at a different API host.
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    #[must_use]
    pub fn with_field_mapping(mut self, mapping: FieldMapping) -> Self {
        self.field_mapping = mapping;
        self
    }

    #[must_use]
    pub fn with_rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.rate_limit = config;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, config: RetryConfig) -> Self {
        self.retry = config;
        self
    }

    #[must_use]
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Upper bound on one client call, covering every attempt, the pause
    /// before each resend and the wait for a pacing token.
    #[must_use]
    pub fn call_budget(&self) -> Duration {
        let pacing = if self.rate_limit.enabled {
            Duration::from_secs_f64(
                f64::from(self.rate_limit.max_in_flight.max(1))
                    / f64::from(self.rate_limit.requests_per_second.max(1)),
            )
        } else {
            Duration::ZERO
        };
        (self.timeout() + pacing) * (self.retry.max_retries + 1) + self.retry.max_total_delay()
    }

    /// Check the configuration before building a client.
    pub fn validate(&self) -> TargetResult<()> {
        if self.token.trim().is_empty() {
            return Err(TargetError::configuration("API token is empty"));
        }
        if self.collection_id.trim().is_empty() {
            return Err(TargetError::configuration("collection id is empty"));
        }
        url::Url::parse(&self.api_base)
            .map_err(|e| TargetError::configuration(format!("invalid API base URL: {e}")))?;
        if self.page_size == 0 || self.page_size > 100 {
            return Err(TargetError::configuration(format!(
                "page size must be between 1 and 100, got {}",
                self.page_size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_for<'a>(mapping: &'a FieldMapping, attribute: &str) -> Option<&'a str> {
        mapping
            .iter()
            .find(|(key, _)| *key == attribute)
            .map(|(_, field)| field)
    }

    #[test]
    fn test_default_field_mapping() {
        let mapping = FieldMapping::default();
        assert_eq!(field_for(&mapping, "title"), Some("name"));
        assert_eq!(field_for(&mapping, "size"), Some("property-sqaure-fit"));
        assert_eq!(field_for(&mapping, "image_5"), Some("property-smal-image-4"));
        assert_eq!(field_for(&mapping, "has_video"), Some("video-2"));
        assert_eq!(field_for(&mapping, "unknown"), None);
        assert_eq!(mapping.iter().count(), 20);
    }

    #[test]
    fn test_field_mapping_override() {
        let mapping = FieldMapping::default().with_field("size", "property-square-feet");
        assert_eq!(field_for(&mapping, "size"), Some("property-square-feet"));
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = WebflowConfig::new("super-secret", "col-1");
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_serialization_skips_token() {
        let config = WebflowConfig::new("super-secret", "col-1");
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("super-secret"));
    }

    #[test]
    fn test_deserialize_defaults() {
        let config: WebflowConfig =
            serde_json::from_str(r#"{"token": "t", "collection_id": "c"}"#).unwrap();
        assert_eq!(config.api_base, DEFAULT_API_BASE);
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.page_size, 100);
        assert_eq!(config.field_mapping, FieldMapping::default());
    }

    #[test]
    fn test_validate() {
        assert!(WebflowConfig::new("t", "c").validate().is_ok());
        assert!(WebflowConfig::new("", "c").validate().is_err());
        assert!(WebflowConfig::new("t", " ").validate().is_err());
        assert!(WebflowConfig::new("t", "c")
            .with_api_base("not a url")
            .validate()
            .is_err());
        assert!(WebflowConfig::new("t", "c")
            .with_page_size(500)
            .validate()
            .is_err());
    }

    #[test]
    fn test_call_budget_outlasts_retries() {
        let config = WebflowConfig::new("t", "c");
        // 6 attempts of 30s request + 4s pacing, 5 pauses of up to 37.5s.
        assert_eq!(config.call_budget(), Duration::from_millis(391_500));

        let config = WebflowConfig::new("t", "c")
            .with_rate_limit(RateLimitConfig::disabled())
            .with_retry(RetryConfig::new(2).with_max_delay(Duration::from_secs(60)))
            .with_timeout_secs(1);
        assert_eq!(config.call_budget(), Duration::from_secs(3 + 150));
        assert!(config.call_budget() > config.retry.wait_for(1, Some(Duration::from_secs(60))));
    }

    #[test]
    fn test_with_api_base_trims_slash() {
        let config = WebflowConfig::new("t", "c").with_api_base("http://localhost:8080/");
        assert_eq!(config.api_base, "http://localhost:8080");
    }
}
