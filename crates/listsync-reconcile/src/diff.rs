//! Diff engine: compares a snapshot with the persisted mapping.

use serde::{Deserialize, Serialize};

use listsync_feed::{Listing, Snapshot};

use crate::mapping::{Mapping, MappingRecord};

/// Options controlling plan computation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffOptions {
    /// Treat every mapped listing as changed, ignoring digests.
    #[serde(default)]
    pub force_full_resync: bool,
}

impl DiffOptions {
    #[must_use]
    pub fn full_resync() -> Self {
        Self {
            force_full_resync: true,
        }
    }
}

/// The work needed to bring the collection in line with the snapshot.
///
/// The four sets partition the union of snapshot and mapping ids, and each
/// is sorted by source id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationPlan {
    pub to_create: Vec<Listing>,
    pub to_update: Vec<(Listing, MappingRecord)>,
    pub to_delete: Vec<MappingRecord>,
    pub unchanged: Vec<(Listing, MappingRecord)>,
}

/// Sizes of each plan set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanCounts {
    pub create: usize,
    pub update: usize,
    pub delete: usize,
    pub unchanged: usize,
}

impl ReconciliationPlan {
    /// Number of collection mutations the plan calls for.
    #[must_use]
    pub fn mutation_count(&self) -> usize {
        self.to_create.len() + self.to_update.len() + self.to_delete.len()
    }

    /// True when nothing needs to change.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mutation_count() == 0
    }

    #[must_use]
    pub fn counts(&self) -> PlanCounts {
        PlanCounts {
            create: self.to_create.len(),
            update: self.to_update.len(),
            delete: self.to_delete.len(),
            unchanged: self.unchanged.len(),
        }
    }
}

/// Compute the plan with default options.
#[must_use]
pub fn diff(snapshot: &Snapshot, mapping: &Mapping) -> ReconciliationPlan {
    diff_with(snapshot, mapping, DiffOptions::default())
}

/// Compute the plan.
///
/// - in snapshot only: create
/// - in mapping only: delete
/// - in both: update when the digest differs (or a full resync is forced),
///   otherwise unchanged
#[must_use]
pub fn diff_with(snapshot: &Snapshot, mapping: &Mapping, options: DiffOptions) -> ReconciliationPlan {
    let mut plan = ReconciliationPlan::default();

    for listing in snapshot.iter() {
        match mapping.get(listing.source_id()) {
            None => plan.to_create.push(listing.clone()),
            Some(record)
                if options.force_full_resync || record.last_digest != listing.content_digest() =>
            {
                plan.to_update.push((listing.clone(), record.clone()));
            }
            Some(record) => plan.unchanged.push((listing.clone(), record.clone())),
        }
    }

    plan.to_delete = mapping
        .values()
        .filter(|record| !snapshot.contains(&record.source_id))
        .cloned()
        .collect();

    plan.to_create
        .sort_by(|a, b| a.source_id().cmp(b.source_id()));
    plan.to_update
        .sort_by(|a, b| a.0.source_id().cmp(b.0.source_id()));
    plan.unchanged
        .sort_by(|a, b| a.0.source_id().cmp(b.0.source_id()));
    plan.to_delete.sort_by(|a, b| a.source_id.cmp(&b.source_id));

    plan
}
