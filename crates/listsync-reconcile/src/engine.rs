//! Reconciliation engine orchestrator.
//!
//! One run moves through `Fetching → Diffing → Applying` and ends `Done`,
//! `PartialFailure` or `Failed`. Deletes run first, then creates, then
//! updates; items inside a phase run with bounded concurrency and each item
//! is one unit of collection call plus mapping write.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use listsync_feed::{FeedParser, FeedSource, Listing};
use listsync_target::{TargetClient, TargetError, TargetItem, TargetItemId, TargetResult};

use crate::diff::{diff_with, DiffOptions, ReconciliationPlan};
use crate::error::{PersistenceError, PersistenceResult, ReconcileError, ReconcileResult};
use crate::mapping::{Mapping, MappingRecord, MappingStore};
use crate::report::{
    DriftReport, FailureKind, ItemAction, ParseSummary, PlanPreview, RunReport, RunStatus,
};
use crate::statistics::{ItemOutcome, OutcomeResult};

/// Pause between mapping write attempts, multiplied by the attempt number.
const PERSIST_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Configuration for the reconciliation engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Largest share of mapped listings one run may delete (default: 0.5).
    #[serde(default = "default_max_delete_fraction")]
    pub max_delete_fraction: f64,

    /// Deletions always allowed while the feed still has listings,
    /// whatever their share (default: 1).
    #[serde(default = "default_min_deletes_allowed")]
    pub min_deletes_allowed: usize,

    /// Items applied concurrently within a phase (default: 4).
    #[serde(default = "default_apply_concurrency")]
    pub apply_concurrency: usize,

    /// Extra attempts for a failed mapping write (default: 2).
    #[serde(default = "default_persist_retries")]
    pub persist_retries: u32,

    /// Timeout for one collection call in milliseconds, client retries
    /// included (default: 600000). Should cover
    /// [`listsync_target::WebflowConfig::call_budget`].
    #[serde(default = "default_target_timeout_ms")]
    pub target_timeout_ms: u64,

    /// Timeout for reading the whole collection in milliseconds
    /// (default: 1800000).
    #[serde(default = "default_list_timeout_ms")]
    pub list_timeout_ms: u64,

    /// Timeout for one mapping store call in milliseconds (default: 10000).
    #[serde(default = "default_persistence_timeout_ms")]
    pub persistence_timeout_ms: u64,

    /// Wall-clock budget for a run; items not started in time are skipped.
    #[serde(default)]
    pub time_budget_ms: Option<u64>,

    /// Take over collection items whose slug matches a listing to create.
    #[serde(default = "default_adopt_existing")]
    pub adopt_existing: bool,
}

fn default_max_delete_fraction() -> f64 {
    0.5
}

fn default_min_deletes_allowed() -> usize {
    1
}

fn default_apply_concurrency() -> usize {
    4
}

fn default_persist_retries() -> u32 {
    2
}

fn default_target_timeout_ms() -> u64 {
    600_000
}

fn default_list_timeout_ms() -> u64 {
    1_800_000
}

fn default_persistence_timeout_ms() -> u64 {
    10_000
}

fn default_adopt_existing() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_delete_fraction: default_max_delete_fraction(),
            min_deletes_allowed: default_min_deletes_allowed(),
            apply_concurrency: default_apply_concurrency(),
            persist_retries: default_persist_retries(),
            target_timeout_ms: default_target_timeout_ms(),
            list_timeout_ms: default_list_timeout_ms(),
            persistence_timeout_ms: default_persistence_timeout_ms(),
            time_budget_ms: None,
            adopt_existing: default_adopt_existing(),
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn with_max_delete_fraction(mut self, fraction: f64) -> Self {
        self.max_delete_fraction = fraction;
        self
    }

    #[must_use]
    pub fn with_min_deletes_allowed(mut self, deletes: usize) -> Self {
        self.min_deletes_allowed = deletes;
        self
    }

    #[must_use]
    pub fn with_apply_concurrency(mut self, concurrency: usize) -> Self {
        self.apply_concurrency = concurrency;
        self
    }

    #[must_use]
    pub fn with_persist_retries(mut self, retries: u32) -> Self {
        self.persist_retries = retries;
        self
    }

    #[must_use]
    pub fn with_target_timeout(mut self, limit: Duration) -> Self {
        self.target_timeout_ms = limit.as_millis() as u64;
        self
    }

    #[must_use]
    pub fn with_list_timeout(mut self, limit: Duration) -> Self {
        self.list_timeout_ms = limit.as_millis() as u64;
        self
    }

    #[must_use]
    pub fn with_persistence_timeout(mut self, limit: Duration) -> Self {
        self.persistence_timeout_ms = limit.as_millis() as u64;
        self
    }

    #[must_use]
    pub fn with_time_budget(mut self, budget: Duration) -> Self {
        self.time_budget_ms = Some(budget.as_millis() as u64);
        self
    }

    #[must_use]
    pub fn with_adopt_existing(mut self, adopt: bool) -> Self {
        self.adopt_existing = adopt;
        self
    }

    #[must_use]
    pub fn target_timeout(&self) -> Duration {
        Duration::from_millis(self.target_timeout_ms)
    }

    #[must_use]
    pub fn list_timeout(&self) -> Duration {
        Duration::from_millis(self.list_timeout_ms)
    }

    #[must_use]
    pub fn persistence_timeout(&self) -> Duration {
        Duration::from_millis(self.persistence_timeout_ms)
    }

    #[must_use]
    pub fn time_budget(&self) -> Option<Duration> {
        self.time_budget_ms.map(Duration::from_millis)
    }
}

/// Anything in a plan set that belongs to one source id.
trait PlanEntry {
    fn source_id(&self) -> &str;
}

impl PlanEntry for Listing {
    fn source_id(&self) -> &str {
        Listing::source_id(self)
    }
}

impl PlanEntry for MappingRecord {
    fn source_id(&self) -> &str {
        &self.source_id
    }
}

impl PlanEntry for (Listing, MappingRecord) {
    fn source_id(&self) -> &str {
        self.0.source_id()
    }
}

/// Output of the fetch and diff stages.
struct Prepared {
    plan: ReconciliationPlan,
    listings: usize,
    mapped: usize,
    /// Collection items already linked to a source id.
    claimed: HashSet<TargetItemId>,
}

/// Unclaimed collection items by slug, taken at most once each.
type AdoptionIndex = Mutex<HashMap<String, TargetItemId>>;

/// Reconciliation engine for orchestrating reconciliation runs.
pub struct ReconciliationEngine {
    feed: Arc<dyn FeedSource>,
    parser: FeedParser,
    store: Arc<dyn MappingStore>,
    target: Arc<dyn TargetClient>,
    config: EngineConfig,
    cancel: CancellationToken,
}

impl ReconciliationEngine {
    /// Create a new reconciliation engine.
    pub fn new(
        feed: Arc<dyn FeedSource>,
        parser: FeedParser,
        store: Arc<dyn MappingStore>,
        target: Arc<dyn TargetClient>,
    ) -> Self {
        Self {
            feed,
            parser,
            store,
            target,
            config: EngineConfig::default(),
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Use an externally owned cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Token that stops the current run from starting new items.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run one reconciliation pass with default options.
    pub async fn run(&self) -> RunReport {
        self.run_with(DiffOptions::default()).await
    }

    /// Run one reconciliation pass.
    ///
    /// Never returns an error: run-level failures are recorded on the report
    /// with status `Failed`.
    pub async fn run_with(&self, options: DiffOptions) -> RunReport {
        let mut report = RunReport::new(Uuid::new_v4());
        let deadline = self.config.time_budget().map(|budget| Instant::now() + budget);

        info!(
            run_id = %report.run_id,
            force_full_resync = options.force_full_resync,
            "Starting reconciliation run"
        );

        let prepared = match self.prepare(&mut report, options).await {
            Ok(prepared) => self.check_deletion_guard(&prepared).map(|()| prepared),
            Err(err) => Err(err),
        };

        match prepared {
            Ok(prepared) => self.apply(&mut report, prepared, deadline).await,
            Err(err) => {
                error!(
                    run_id = %report.run_id,
                    from = %report.status,
                    error = %err,
                    code = err.error_code(),
                    "Reconciliation run failed"
                );
                report.fail(&err);
            }
        }

        report.finish();
        info!(
            run_id = %report.run_id,
            status = %report.status,
            created = report.counts.created,
            updated = report.counts.updated,
            deleted = report.counts.deleted,
            adopted = report.counts.adopted,
            unchanged = report.counts.unchanged,
            failed = report.counts.failed,
            skipped = report.counts.skipped,
            duration_ms = report.duration_ms(),
            "Reconciliation run finished"
        );
        report
    }

    /// Fetch, parse and diff without touching the collection.
    pub async fn preview(&self, options: DiffOptions) -> ReconcileResult<PlanPreview> {
        let mut scratch = RunReport::new(Uuid::new_v4());
        let prepared = self.prepare(&mut scratch, options).await?;
        let blocked_by = self
            .check_deletion_guard(&prepared)
            .err()
            .map(|err| err.to_string());
        let plan = prepared.plan;

        Ok(PlanPreview {
            counts: plan.counts(),
            to_create: plan
                .to_create
                .iter()
                .map(|l| l.source_id().to_string())
                .collect(),
            to_update: plan
                .to_update
                .iter()
                .map(|(l, _)| l.source_id().to_string())
                .collect(),
            to_delete: plan.to_delete.iter().map(|r| r.source_id.clone()).collect(),
            parse: scratch.parse,
            blocked_by,
        })
    }

    /// Compare the collection with the mapping store.
    ///
    /// With `repair`, dangling records are removed from the store. Orphaned
    /// collection items are only reported.
    pub async fn audit(&self, repair: bool) -> ReconcileResult<DriftReport> {
        let items = self.list_items().await?;
        let mapping = self.load_mapping().await?;

        let live: HashSet<&TargetItemId> = items.iter().map(|item| &item.id).collect();
        let mapped: HashSet<&TargetItemId> =
            mapping.values().map(|record| &record.target_item_id).collect();

        let mut orphaned_items: Vec<TargetItem> = items
            .iter()
            .filter(|item| !mapped.contains(&item.id))
            .cloned()
            .collect();
        orphaned_items.sort_by(|a, b| a.slug.cmp(&b.slug).then_with(|| a.id.cmp(&b.id)));

        let mut dangling_records: Vec<MappingRecord> = mapping
            .values()
            .filter(|record| !live.contains(&record.target_item_id))
            .cloned()
            .collect();
        dangling_records.sort_by(|a, b| a.source_id.cmp(&b.source_id));

        let mut repaired = 0;
        if repair {
            for record in &dangling_records {
                let source_id = record.source_id.as_str();
                match self
                    .persist("delete", source_id, || self.store.delete(source_id))
                    .await
                {
                    Ok(()) => {
                        info!(source_id, item_id = %record.target_item_id, "Removed dangling mapping");
                        repaired += 1;
                    }
                    Err(err) => {
                        warn!(source_id, error = %err, "Could not remove dangling mapping");
                    }
                }
            }
        }

        let report = DriftReport {
            target_items: items.len(),
            mapped: mapping.len(),
            orphaned_items,
            dangling_records,
            repaired,
        };
        info!(
            target_items = report.target_items,
            mapped = report.mapped,
            orphaned = report.orphaned_items.len(),
            dangling = report.dangling_records.len(),
            repaired,
            "Drift audit complete"
        );
        Ok(report)
    }

    // =========================================================================
    // Stages
    // =========================================================================

    async fn prepare(
        &self,
        report: &mut RunReport,
        options: DiffOptions,
    ) -> ReconcileResult<Prepared> {
        if self.cancel.is_cancelled() {
            return Err(ReconcileError::Cancelled);
        }

        let raw = tokio::select! {
            fetched = self.feed.fetch() => fetched.map_err(ReconcileError::FeedFetch)?,
            () = self.cancel.cancelled() => return Err(ReconcileError::Cancelled),
        };

        Self::transition(report, RunStatus::Diffing);

        let outcome = self.parser.parse(&raw).map_err(ReconcileError::from)?;
        report.parse = ParseSummary {
            listings: outcome.snapshot.len(),
            skipped_entries: outcome.skipped,
            duplicate_ids: outcome.duplicates,
        };
        if !report.parse.skipped_entries.is_empty() {
            warn!(
                run_id = %report.run_id,
                skipped = report.parse.skipped_entries.len(),
                "Feed entries skipped during parsing"
            );
        }

        let mapping = self.load_mapping().await?;
        let plan = diff_with(&outcome.snapshot, &mapping, options);
        report.plan = Some(plan.counts());

        info!(
            run_id = %report.run_id,
            listings = outcome.snapshot.len(),
            mapped = mapping.len(),
            create = plan.to_create.len(),
            update = plan.to_update.len(),
            delete = plan.to_delete.len(),
            unchanged = plan.unchanged.len(),
            "Computed reconciliation plan"
        );

        Ok(Prepared {
            plan,
            listings: outcome.snapshot.len(),
            mapped: mapping.len(),
            claimed: mapping
                .into_values()
                .map(|record| record.target_item_id)
                .collect(),
        })
    }

    /// Refuse plans that delete too large a share of the mapping. A few
    /// deletions pass regardless while the feed is not empty.
    fn check_deletion_guard(&self, prepared: &Prepared) -> ReconcileResult<()> {
        let plan = &prepared.plan;
        let mapped = prepared.mapped;
        if mapped == 0 || plan.to_delete.is_empty() {
            return Ok(());
        }
        if prepared.listings > 0 && plan.to_delete.len() <= self.config.min_deletes_allowed {
            return Ok(());
        }

        let fraction = plan.to_delete.len() as f64 / mapped as f64;
        if fraction > self.config.max_delete_fraction {
            warn!(
                to_delete = plan.to_delete.len(),
                mapped,
                fraction,
                max_fraction = self.config.max_delete_fraction,
                "Refusing to apply plan, deletion share over limit"
            );
            return Err(ReconcileError::DeletionGuard {
                to_delete: plan.to_delete.len(),
                mapped,
                max_fraction: self.config.max_delete_fraction,
            });
        }
        Ok(())
    }

    async fn apply(&self, report: &mut RunReport, prepared: Prepared, deadline: Option<Instant>) {
        Self::transition(report, RunStatus::Applying);

        let Prepared { plan, claimed, .. } = prepared;
        let ReconciliationPlan {
            to_create,
            to_update,
            to_delete,
            unchanged,
        } = plan;
        report.counts.unchanged = unchanged.len();

        let outcomes = self
            .run_phase(ItemAction::Delete, to_delete, deadline, |record| {
                self.apply_delete(record)
            })
            .await;
        report.record_outcomes(outcomes);

        let (to_create, collisions) = self.split_slug_collisions(to_create);
        report.record_outcomes(collisions);

        let existing = if self.config.adopt_existing
            && !to_create.is_empty()
            && !self.is_stopped(deadline)
        {
            self.existing_items_by_slug(&claimed).await
        } else {
            HashMap::new()
        };
        let existing = &Mutex::new(existing);
        let outcomes = self
            .run_phase(ItemAction::Create, to_create, deadline, |listing| {
                self.apply_create(listing, existing)
            })
            .await;
        report.record_outcomes(outcomes);

        let outcomes = self
            .run_phase(ItemAction::Update, to_update, deadline, |(listing, record)| {
                self.apply_update(listing, record)
            })
            .await;
        report.record_outcomes(outcomes);
    }

    /// Apply one phase. Items start in plan order, at most
    /// `apply_concurrency` at a time; once the run is stopped the remaining
    /// items are reported as skipped.
    async fn run_phase<T, F, Fut>(
        &self,
        action: ItemAction,
        items: Vec<T>,
        deadline: Option<Instant>,
        op: F,
    ) -> Vec<ItemOutcome>
    where
        T: PlanEntry,
        F: Fn(T) -> Fut,
        Fut: Future<Output = ItemOutcome>,
    {
        if items.is_empty() {
            return Vec::new();
        }
        info!(action = %action, items = items.len(), "Applying phase");

        let op = &op;
        let outcomes: Vec<ItemOutcome> = stream::iter(items)
            .map(|item| async move {
                if self.is_stopped(deadline) {
                    debug!(source_id = item.source_id(), action = %action, "Run stopped, skipping item");
                    return ItemOutcome::skipped(item.source_id(), action);
                }
                op(item).await
            })
            .buffer_unordered(self.config.apply_concurrency.max(1))
            .collect()
            .await;

        let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
        info!(
            action = %action,
            succeeded,
            unsuccessful = outcomes.len() - succeeded,
            "Phase finished"
        );
        outcomes
    }

    /// Keep the first listing (in plan order) for each slug. Later listings
    /// sharing that slug cannot get an item of their own and fail.
    fn split_slug_collisions(&self, to_create: Vec<Listing>) -> (Vec<Listing>, Vec<ItemOutcome>) {
        let mut owners: HashMap<String, String> = HashMap::new();
        let mut kept = Vec::with_capacity(to_create.len());
        let mut collisions = Vec::new();

        for listing in to_create {
            let slug = self.target.slug_for(listing.source_id());
            if let Some(owner) = owners.get(&slug) {
                warn!(
                    source_id = listing.source_id(),
                    slug = %slug,
                    owner = %owner,
                    "Slug already taken in this run"
                );
                collisions.push(ItemOutcome::failed(
                    listing.source_id(),
                    ItemAction::Create,
                    FailureKind::Target,
                    format!("slug {slug} is already used by listing {owner}"),
                ));
                continue;
            }
            owners.insert(slug, listing.source_id().to_string());
            kept.push(listing);
        }

        (kept, collisions)
    }

    // =========================================================================
    // Item units
    // =========================================================================

    async fn apply_delete(&self, record: MappingRecord) -> ItemOutcome {
        let source_id = record.source_id.as_str();

        match self.target_call(self.target.delete(&record.target_item_id)).await {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {
                debug!(source_id, item_id = %record.target_item_id, "Item already gone, clearing mapping");
            }
            Err(err) => return Self::target_failure(source_id, ItemAction::Delete, &err),
        }

        match self
            .persist("delete", source_id, || self.store.delete(source_id))
            .await
        {
            Ok(()) => ItemOutcome::new(source_id, ItemAction::Delete, OutcomeResult::Deleted),
            Err(err) => Self::persistence_failure(source_id, ItemAction::Delete, &err),
        }
    }

    async fn apply_create(&self, listing: Listing, existing: &AdoptionIndex) -> ItemOutcome {
        let source_id = listing.source_id();

        let candidate = existing.lock().await.remove(&self.target.slug_for(source_id));
        if let Some(item_id) = candidate {
            match self.target_call(self.target.update(&item_id, &listing)).await {
                Ok(()) => {
                    info!(source_id, item_id = %item_id, "Adopted existing collection item");
                    return self
                        .record_write(&listing, item_id, ItemAction::Create, OutcomeResult::Adopted)
                        .await;
                }
                Err(err) if err.is_not_found() => {
                    debug!(source_id, item_id = %item_id, "Adoption candidate vanished, creating");
                }
                Err(err) => return Self::target_failure(source_id, ItemAction::Create, &err),
            }
        }

        match self.target_call(self.target.create(&listing)).await {
            Ok(item_id) => {
                self.record_write(&listing, item_id, ItemAction::Create, OutcomeResult::Created)
                    .await
            }
            Err(err) => Self::target_failure(source_id, ItemAction::Create, &err),
        }
    }

    async fn apply_update(&self, listing: Listing, record: MappingRecord) -> ItemOutcome {
        let source_id = listing.source_id();

        match self
            .target_call(self.target.update(&record.target_item_id, &listing))
            .await
        {
            Ok(()) => {
                self.record_write(&listing, record.target_item_id, ItemAction::Update, OutcomeResult::Updated)
                    .await
            }
            Err(err) if err.is_not_found() => {
                warn!(source_id, item_id = %record.target_item_id, "Mapped item is gone, re-creating");
                if let Err(err) = self
                    .persist("delete", source_id, || self.store.delete(source_id))
                    .await
                {
                    return Self::persistence_failure(source_id, ItemAction::Update, &err);
                }
                match self.target_call(self.target.create(&listing)).await {
                    Ok(item_id) => {
                        self.record_write(&listing, item_id, ItemAction::Update, OutcomeResult::Recreated)
                            .await
                    }
                    Err(err) => Self::target_failure(source_id, ItemAction::Update, &err),
                }
            }
            Err(err) => Self::target_failure(source_id, ItemAction::Update, &err),
        }
    }

    /// Persist the mapping after a successful collection write.
    async fn record_write(
        &self,
        listing: &Listing,
        item_id: TargetItemId,
        action: ItemAction,
        success: OutcomeResult,
    ) -> ItemOutcome {
        let source_id = listing.source_id();
        let record = MappingRecord::new(source_id, item_id, listing.content_digest());

        match self
            .persist("upsert", source_id, || self.store.upsert(&record))
            .await
        {
            Ok(()) => ItemOutcome::new(source_id, action, success),
            Err(err) => Self::persistence_failure(source_id, action, &err),
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn transition(report: &mut RunReport, next: RunStatus) {
        info!(run_id = %report.run_id, from = %report.status, to = %next, "Run state transition");
        report.status = next;
    }

    fn is_stopped(&self, deadline: Option<Instant>) -> bool {
        self.cancel.is_cancelled() || deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    async fn load_mapping(&self) -> ReconcileResult<Mapping> {
        let limit = self.config.persistence_timeout();
        let mapping = timeout(limit, self.store.load_all())
            .await
            .unwrap_or_else(|_| {
                Err(PersistenceError::Timeout {
                    operation: "load_all",
                    timeout_ms: limit.as_millis(),
                })
            })?;
        Ok(mapping)
    }

    /// Collection items open for adoption: those with a slug that no
    /// mapping record points at.
    async fn existing_items_by_slug(
        &self,
        claimed: &HashSet<TargetItemId>,
    ) -> HashMap<String, TargetItemId> {
        match self.list_items().await {
            Ok(items) => {
                let index: HashMap<String, TargetItemId> = items
                    .into_iter()
                    .filter(|item| !item.slug.is_empty() && !claimed.contains(&item.id))
                    .map(|item| (item.slug, item.id))
                    .collect();
                debug!(unclaimed = index.len(), "Indexed existing collection items");
                index
            }
            Err(err) => {
                warn!(error = %err, "Could not list collection items, creating without adoption");
                HashMap::new()
            }
        }
    }

    async fn list_items(&self) -> TargetResult<Vec<TargetItem>> {
        let limit = self.config.list_timeout();
        timeout(limit, self.target.list_existing())
            .await
            .unwrap_or_else(|_| {
                Err(TargetError::timeout(format!(
                    "collection not read within {}ms",
                    limit.as_millis()
                )))
            })
    }

    async fn target_call<T>(&self, call: impl Future<Output = TargetResult<T>>) -> TargetResult<T> {
        let limit = self.config.target_timeout();
        timeout(limit, call).await.unwrap_or_else(|_| {
            Err(TargetError::timeout(format!(
                "no response within {}ms",
                limit.as_millis()
            )))
        })
    }

    /// Run a mapping write, retrying up to `persist_retries` extra times.
    async fn persist<F, Fut>(
        &self,
        operation: &'static str,
        source_id: &str,
        op: F,
    ) -> PersistenceResult<()>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = PersistenceResult<()>>,
    {
        let limit = self.config.persistence_timeout();
        let mut attempt = 0;

        loop {
            let result = timeout(limit, op()).await.unwrap_or_else(|_| {
                Err(PersistenceError::Timeout {
                    operation,
                    timeout_ms: limit.as_millis(),
                })
            });

            match result {
                Ok(()) => return Ok(()),
                Err(err) if attempt < self.config.persist_retries => {
                    attempt += 1;
                    warn!(source_id, operation, attempt, error = %err, "Mapping write failed, retrying");
                    tokio::time::sleep(PERSIST_RETRY_DELAY * attempt).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn target_failure(source_id: &str, action: ItemAction, err: &TargetError) -> ItemOutcome {
        let kind = if matches!(err, TargetError::Timeout { .. }) {
            FailureKind::Timeout
        } else {
            FailureKind::Target
        };
        warn!(source_id, action = %action, code = err.error_code(), error = %err, "Collection call failed");
        ItemOutcome::failed(source_id, action, kind, err.to_string())
    }

    fn persistence_failure(source_id: &str, action: ItemAction, err: &PersistenceError) -> ItemOutcome {
        error!(
            source_id,
            action = %action,
            code = err.error_code(),
            error = %err,
            "Mapping write failed after retries"
        );
        ItemOutcome::failed(source_id, action, FailureKind::Persistence, err.to_string())
    }
}
