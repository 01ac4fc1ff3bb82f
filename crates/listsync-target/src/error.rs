//! Target client error types
//!
//! Error definitions with transient/permanent classification for retry logic.

use thiserror::Error;

/// Error returned by a collection client operation.
#[derive(Debug, Error)]
pub enum TargetError {
    /// The API answered with a non-success status.
    #[error("target API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// The referenced item does not exist in the collection.
    #[error("item not found: {item_id}")]
    NotFound { item_id: String },

    /// Throttling persisted after all retries were spent.
    #[error("rate limited by target API")]
    RateLimited { retry_after_secs: Option<u64> },

    /// Transport failure before a response was received.
    #[error("connection failed: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The request did not complete in time.
    #[error("request timed out: {message}")]
    Timeout { message: String },

    /// The API answered with a body we could not interpret.
    #[error("invalid response: {message}")]
    InvalidResponse { message: String },

    /// Client configuration is invalid.
    #[error("invalid configuration: {message}")]
    Configuration { message: String },
}

impl TargetError {
    /// Create an API error.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        TargetError::Api {
            status,
            message: message.into(),
        }
    }

    /// Create a not-found error.
    pub fn not_found(item_id: impl Into<String>) -> Self {
        TargetError::NotFound {
            item_id: item_id.into(),
        }
    }

    /// Create a connection error with source.
    pub fn connection_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        TargetError::Connection {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a timeout error.
    pub fn timeout(message: impl Into<String>) -> Self {
        TargetError::Timeout {
            message: message.into(),
        }
    }

    /// Create an invalid-response error.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        TargetError::InvalidResponse {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        TargetError::Configuration {
            message: message.into(),
        }
    }

    /// Check if this error is transient and might succeed on retry.
    pub fn is_transient(&self) -> bool {
        match self {
            TargetError::Connection { .. }
            | TargetError::Timeout { .. }
            | TargetError::RateLimited { .. } => true,
            TargetError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Check if the item is gone from the collection.
    pub fn is_not_found(&self) -> bool {
        matches!(self, TargetError::NotFound { .. })
    }

    /// Get an error code for classification.
    pub fn error_code(&self) -> &'static str {
        match self {
            TargetError::Api { .. } => "TARGET_API",
            TargetError::NotFound { .. } => "TARGET_NOT_FOUND",
            TargetError::RateLimited { .. } => "TARGET_RATE_LIMITED",
            TargetError::Connection { .. } => "TARGET_CONNECTION",
            TargetError::Timeout { .. } => "TARGET_TIMEOUT",
            TargetError::InvalidResponse { .. } => "TARGET_INVALID_RESPONSE",
            TargetError::Configuration { .. } => "TARGET_CONFIG",
        }
    }
}

/// Result type for target operations.
pub type TargetResult<T> = Result<T, TargetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(TargetError::timeout("30s").is_transient());
        assert!(TargetError::RateLimited {
            retry_after_secs: Some(2)
        }
        .is_transient());
        assert!(TargetError::api(503, "unavailable").is_transient());

        assert!(!TargetError::api(400, "bad field").is_transient());
        assert!(!TargetError::not_found("abc").is_transient());
        assert!(!TargetError::configuration("no token").is_transient());
    }

    #[test]
    fn test_error_display() {
        let err = TargetError::api(422, "slug already exists");
        assert_eq!(
            err.to_string(),
            "target API error (status 422): slug already exists"
        );
        assert_eq!(TargetError::not_found("x1").to_string(), "item not found: x1");
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(TargetError::not_found("x").error_code(), "TARGET_NOT_FOUND");
        assert!(TargetError::not_found("x").is_not_found());
        assert_eq!(
            TargetError::invalid_response("x").error_code(),
            "TARGET_INVALID_RESPONSE"
        );
    }
}
