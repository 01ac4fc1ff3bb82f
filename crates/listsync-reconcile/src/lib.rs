//! Listing reconciliation.
//!
//! Compares a feed [`Snapshot`](listsync_feed::Snapshot) with the persisted
//! [`Mapping`] and applies the resulting [`ReconciliationPlan`] to a target
//! collection through [`ReconciliationEngine`].
//!
//! Each run is independent: there is no in-memory state between runs, the
//! mapping store is the only source of truth for what was written before.

pub mod diff;
pub mod engine;
pub mod error;
pub mod mapping;
pub mod report;
pub mod statistics;

pub use diff::{diff, diff_with, DiffOptions, PlanCounts, ReconciliationPlan};
pub use engine::{EngineConfig, ReconciliationEngine};
pub use error::{PersistenceError, PersistenceResult, ReconcileError, ReconcileResult};
pub use mapping::{Mapping, MappingRecord, MappingStore, MemoryMappingStore, PgMappingStore};
pub use report::{
    DriftReport, FailureKind, ItemAction, ItemFailure, ParseSummary, PlanPreview, RunReport,
    RunStatus,
};
pub use statistics::{ItemOutcome, OutcomeResult, RunCounts};
