//! Per-item outcomes and the counts they fold into.

use serde::{Deserialize, Serialize};

use crate::report::{FailureKind, ItemAction};

/// How a single planned item ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeResult {
    Created,
    /// An existing collection item with the listing's slug was taken over.
    Adopted,
    /// The mapped item was gone, so a new one was created.
    Recreated,
    Updated,
    Deleted,
    Failed { kind: FailureKind, message: String },
    /// Not attempted because the run was stopped.
    Skipped,
}

/// Outcome of one plan item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemOutcome {
    pub source_id: String,
    pub action: ItemAction,
    pub result: OutcomeResult,
}

impl ItemOutcome {
    pub fn new(source_id: impl Into<String>, action: ItemAction, result: OutcomeResult) -> Self {
        Self {
            source_id: source_id.into(),
            action,
            result,
        }
    }

    pub fn failed(
        source_id: impl Into<String>,
        action: ItemAction,
        kind: FailureKind,
        message: impl Into<String>,
    ) -> Self {
        Self::new(
            source_id,
            action,
            OutcomeResult::Failed {
                kind,
                message: message.into(),
            },
        )
    }

    pub fn skipped(source_id: impl Into<String>, action: ItemAction) -> Self {
        Self::new(source_id, action, OutcomeResult::Skipped)
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        !matches!(
            self.result,
            OutcomeResult::Failed { .. } | OutcomeResult::Skipped
        )
    }
}

/// Item counts for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounts {
    #[serde(default)]
    pub created: usize,
    #[serde(default)]
    pub updated: usize,
    #[serde(default)]
    pub deleted: usize,
    #[serde(default)]
    pub unchanged: usize,
    #[serde(default)]
    pub failed: usize,
    #[serde(default)]
    pub skipped: usize,
    #[serde(default)]
    pub adopted: usize,
}

impl RunCounts {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one outcome. Re-created items count as created.
    pub fn record(&mut self, outcome: &ItemOutcome) {
        match outcome.result {
            OutcomeResult::Created | OutcomeResult::Recreated => self.created += 1,
            OutcomeResult::Adopted => self.adopted += 1,
            OutcomeResult::Updated => self.updated += 1,
            OutcomeResult::Deleted => self.deleted += 1,
            OutcomeResult::Failed { .. } => self.failed += 1,
            OutcomeResult::Skipped => self.skipped += 1,
        }
    }

    /// Items that changed the collection.
    #[must_use]
    pub fn applied(&self) -> usize {
        self.created + self.updated + self.deleted + self.adopted
    }
}
