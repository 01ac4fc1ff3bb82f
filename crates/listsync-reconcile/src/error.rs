//! Reconciliation error types.

use thiserror::Error;

use listsync_feed::FeedError;
use listsync_target::TargetError;

/// Mapping store failure.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration failed.
    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// The operation did not complete in time.
    #[error("mapping store {operation} timed out after {timeout_ms}ms")]
    Timeout {
        operation: &'static str,
        timeout_ms: u128,
    },

    /// The store could not be reached.
    #[error("mapping store unavailable: {message}")]
    Unavailable { message: String },
}

impl PersistenceError {
    /// Create an unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        PersistenceError::Unavailable {
            message: message.into(),
        }
    }

    /// Get an error code for classification.
    pub fn error_code(&self) -> &'static str {
        match self {
            PersistenceError::Database(_) => "PERSISTENCE_DATABASE",
            PersistenceError::Migration(_) => "PERSISTENCE_MIGRATION",
            PersistenceError::Timeout { .. } => "PERSISTENCE_TIMEOUT",
            PersistenceError::Unavailable { .. } => "PERSISTENCE_UNAVAILABLE",
        }
    }
}

/// Result type for mapping store operations.
pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Run-level failure. Any of these ends a run as `Failed` before the
/// collection is mutated.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The feed could not be retrieved.
    #[error("feed fetch failed: {0}")]
    FeedFetch(#[source] FeedError),

    /// The feed payload is not a valid listing document.
    #[error("feed format invalid: {0}")]
    FeedFormat(#[source] FeedError),

    /// The mapping could not be loaded.
    #[error("mapping store error: {0}")]
    Persistence(#[from] PersistenceError),

    /// The plan would delete too large a share of the mapped listings.
    #[error(
        "deletion guard tripped: plan deletes {to_delete} of {mapped} mapped listings \
         (limit {max_fraction})"
    )]
    DeletionGuard {
        to_delete: usize,
        mapped: usize,
        max_fraction: f64,
    },

    /// Collection read failed during an audit.
    #[error("target error: {0}")]
    Target(#[from] TargetError),

    /// The run was cancelled before any mutation.
    #[error("run cancelled before applying changes")]
    Cancelled,
}

impl From<FeedError> for ReconcileError {
    fn from(err: FeedError) -> Self {
        match err {
            FeedError::Fetch { .. } => ReconcileError::FeedFetch(err),
            FeedError::Format { .. } | FeedError::Catalog { .. } => ReconcileError::FeedFormat(err),
        }
    }
}

impl ReconcileError {
    /// Get an error code for classification.
    pub fn error_code(&self) -> &'static str {
        match self {
            ReconcileError::FeedFetch(_) => "FEED_FETCH",
            ReconcileError::FeedFormat(_) => "FEED_FORMAT",
            ReconcileError::Persistence(_) => "PERSISTENCE",
            ReconcileError::DeletionGuard { .. } => "DELETION_GUARD",
            ReconcileError::Target(_) => "TARGET",
            ReconcileError::Cancelled => "CANCELLED",
        }
    }
}

/// Result type for run-level operations.
pub type ReconcileResult<T> = Result<T, ReconcileError>;
