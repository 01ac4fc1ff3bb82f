//! Run reports and drift reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use listsync_feed::SkippedEntry;
use listsync_target::TargetItem;

use crate::diff::PlanCounts;
use crate::error::ReconcileError;
use crate::mapping::MappingRecord;
use crate::statistics::{ItemOutcome, OutcomeResult, RunCounts};

/// Run state. `Fetching`, `Diffing` and `Applying` are transient; the others
/// are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Fetching,
    Diffing,
    Applying,
    /// Every planned item succeeded.
    Done,
    /// The plan was applied but some items failed or were skipped.
    PartialFailure,
    /// The run stopped before applying anything.
    Failed,
}

impl RunStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Fetching => "fetching",
            RunStatus::Diffing => "diffing",
            RunStatus::Applying => "applying",
            RunStatus::Done => "done",
            RunStatus::PartialFailure => "partial_failure",
            RunStatus::Failed => "failed",
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Done | RunStatus::PartialFailure | RunStatus::Failed
        )
    }

    /// Process exit code for a terminal status.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            RunStatus::Done => 0,
            RunStatus::PartialFailure => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of collection mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemAction {
    Create,
    Update,
    Delete,
}

impl fmt::Display for ItemAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ItemAction::Create => "create",
            ItemAction::Update => "update",
            ItemAction::Delete => "delete",
        })
    }
}

/// Why an item did not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The collection API rejected or failed the call.
    Target,
    /// The collection call exceeded its timeout.
    Timeout,
    /// The mapping write failed after retries.
    Persistence,
    /// The run was cancelled before the item started.
    Cancelled,
}

/// A failed or skipped item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFailure {
    pub source_id: String,
    pub action: ItemAction,
    pub kind: FailureKind,
    pub message: String,
}

/// What the parser left out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseSummary {
    pub listings: usize,
    pub skipped_entries: Vec<SkippedEntry>,
    pub duplicate_ids: Vec<String>,
}

/// Result of one reconciliation run, printed as JSON by the binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<PlanCounts>,
    pub counts: RunCounts,
    pub failures: Vec<ItemFailure>,
    pub parse: ParseSummary,
    /// Run-level error for `Failed` runs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl RunReport {
    #[must_use]
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            status: RunStatus::Fetching,
            started_at: Utc::now(),
            finished_at: None,
            plan: None,
            counts: RunCounts::default(),
            failures: Vec::new(),
            parse: ParseSummary::default(),
            error: None,
            error_code: None,
        }
    }

    /// Fold per-item outcomes into counts and failures.
    pub fn record_outcomes(&mut self, outcomes: impl IntoIterator<Item = ItemOutcome>) {
        for outcome in outcomes {
            self.counts.record(&outcome);
            match outcome.result {
                OutcomeResult::Failed { kind, message } => self.failures.push(ItemFailure {
                    source_id: outcome.source_id,
                    action: outcome.action,
                    kind,
                    message,
                }),
                OutcomeResult::Skipped => self.failures.push(ItemFailure {
                    source_id: outcome.source_id,
                    action: outcome.action,
                    kind: FailureKind::Cancelled,
                    message: "run stopped before the item started".to_string(),
                }),
                _ => {}
            }
        }
    }

    /// Mark the run as failed with a run-level error.
    pub fn fail(&mut self, error: &ReconcileError) {
        self.status = RunStatus::Failed;
        self.error = Some(error.to_string());
        self.error_code = Some(error.error_code().to_string());
    }

    /// Settle the terminal status and stamp the finish time.
    pub fn finish(&mut self) {
        if self.status != RunStatus::Failed {
            self.status = if self.counts.failed == 0 && self.counts.skipped == 0 {
                RunStatus::Done
            } else {
                RunStatus::PartialFailure
            };
        }
        self.failures.sort_by(|a, b| {
            a.source_id
                .cmp(&b.source_id)
                .then((a.action as u8).cmp(&(b.action as u8)))
        });
        self.finished_at = Some(Utc::now());
    }

    /// Duration in milliseconds, once finished.
    #[must_use]
    pub fn duration_ms(&self) -> Option<i64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }
}

/// Differences between the collection and the mapping store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriftReport {
    pub target_items: usize,
    pub mapped: usize,
    /// Collection items with no mapping record.
    pub orphaned_items: Vec<TargetItem>,
    /// Mapping records whose item is gone from the collection.
    pub dangling_records: Vec<MappingRecord>,
    /// Dangling records removed by a repair pass.
    pub repaired: usize,
}

impl DriftReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.orphaned_items.is_empty() && self.dangling_records.is_empty()
    }
}

/// Plan summary returned by a dry run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanPreview {
    pub counts: PlanCounts,
    pub to_create: Vec<String>,
    pub to_update: Vec<String>,
    pub to_delete: Vec<String>,
    pub parse: ParseSummary,
    /// Set when applying this plan would trip the deletion guard.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_by: Option<String>,
}
