//! Mapping store: the persisted bridge between source ids and collection
//! item ids.
//!
//! Records are created after a successful create, refreshed after a
//! successful update and removed only after a successful delete.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use listsync_target::TargetItemId;

use crate::error::{PersistenceError, PersistenceResult};

/// One persisted source → target link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingRecord {
    pub source_id: String,
    pub target_item_id: TargetItemId,
    /// Content digest of the listing last written to the collection.
    pub last_digest: String,
    pub last_synced_at: DateTime<Utc>,
}

impl MappingRecord {
    pub fn new(
        source_id: impl Into<String>,
        target_item_id: TargetItemId,
        last_digest: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            target_item_id,
            last_digest: last_digest.into(),
            last_synced_at: Utc::now(),
        }
    }
}

/// Row shape of `listing_mappings`.
#[derive(Debug, FromRow)]
struct MappingRow {
    source_id: String,
    target_item_id: String,
    last_digest: String,
    last_synced_at: DateTime<Utc>,
}

impl From<MappingRow> for MappingRecord {
    fn from(row: MappingRow) -> Self {
        Self {
            source_id: row.source_id,
            target_item_id: TargetItemId::new(row.target_item_id),
            last_digest: row.last_digest,
            last_synced_at: row.last_synced_at,
        }
    }
}

/// Complete mapping keyed by source id.
pub type Mapping = HashMap<String, MappingRecord>;

/// Persistence for mapping records.
#[async_trait]
pub trait MappingStore: Send + Sync {
    /// Load every record. Paginated backends drain all pages first.
    async fn load_all(&self) -> PersistenceResult<Mapping>;

    /// Insert or replace the record for its source id.
    async fn upsert(&self, record: &MappingRecord) -> PersistenceResult<()>;

    /// Remove the record for a source id. Removing a missing key succeeds.
    async fn delete(&self, source_id: &str) -> PersistenceResult<()>;
}

// =============================================================================
// Postgres
// =============================================================================

/// Postgres-backed mapping store.
#[derive(Debug, Clone)]
pub struct PgMappingStore {
    pool: PgPool,
    page_size: i64,
}

impl PgMappingStore {
    /// Default keyset page size for `load_all`.
    pub const DEFAULT_PAGE_SIZE: i64 = 500;

    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            page_size: Self::DEFAULT_PAGE_SIZE,
        }
    }

    /// Connect a small pool to `database_url`.
    pub async fn connect(database_url: &str) -> PersistenceResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: i64) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply pending schema migrations.
    pub async fn ensure_schema(&self) -> PersistenceResult<()> {
        info!("Running mapping store migrations");
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl MappingStore for PgMappingStore {
    #[instrument(skip(self))]
    async fn load_all(&self) -> PersistenceResult<Mapping> {
        // One repeatable-read transaction so every page sees the same state.
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;

        let mut mapping = Mapping::new();
        let mut after = String::new();

        loop {
            let rows: Vec<MappingRow> = sqlx::query_as(
                r"
                SELECT source_id, target_item_id, last_digest, last_synced_at
                FROM listing_mappings
                WHERE source_id > $1
                ORDER BY source_id
                LIMIT $2
                ",
            )
            .bind(&after)
            .bind(self.page_size)
            .fetch_all(&mut *tx)
            .await?;

            let fetched = rows.len();
            for row in rows {
                let record = MappingRecord::from(row);
                after.clone_from(&record.source_id);
                mapping.insert(record.source_id.clone(), record);
            }

            if (fetched as i64) < self.page_size {
                break;
            }
        }

        tx.commit().await?;
        debug!(records = mapping.len(), "Loaded mapping");
        Ok(mapping)
    }

    #[instrument(skip(self, record), fields(source_id = %record.source_id))]
    async fn upsert(&self, record: &MappingRecord) -> PersistenceResult<()> {
        sqlx::query(
            r"
            INSERT INTO listing_mappings (source_id, target_item_id, last_digest, last_synced_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (source_id) DO UPDATE SET
                target_item_id = EXCLUDED.target_item_id,
                last_digest = EXCLUDED.last_digest,
                last_synced_at = EXCLUDED.last_synced_at
            ",
        )
        .bind(&record.source_id)
        .bind(record.target_item_id.as_str())
        .bind(&record.last_digest)
        .bind(record.last_synced_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, source_id: &str) -> PersistenceResult<()> {
        sqlx::query("DELETE FROM listing_mappings WHERE source_id = $1")
            .bind(source_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

// =============================================================================
// In-memory
// =============================================================================

/// In-memory mapping store for dry runs and tests.
///
/// Failures can be injected per operation to exercise error paths.
#[derive(Debug, Default)]
pub struct MemoryMappingStore {
    records: RwLock<Mapping>,
    faults: Mutex<Faults>,
}

#[derive(Debug, Default)]
struct Faults {
    fail_loads: bool,
    /// Remaining failures per source id for upsert/delete.
    write_failures: HashMap<String, u32>,
    /// Remaining failures for any write.
    any_write_failures: u32,
}

impl MemoryMappingStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with records.
    #[must_use]
    pub fn with_records(records: impl IntoIterator<Item = MappingRecord>) -> Self {
        let records = records
            .into_iter()
            .map(|r| (r.source_id.clone(), r))
            .collect();
        Self {
            records: RwLock::new(records),
            faults: Mutex::default(),
        }
    }

    /// Make every `load_all` fail until reset.
    pub fn set_fail_loads(&self, fail: bool) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.fail_loads = fail;
        }
    }

    /// Fail the next `times` writes touching `source_id`.
    pub fn fail_writes_for(&self, source_id: impl Into<String>, times: u32) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.write_failures.insert(source_id.into(), times);
        }
    }

    /// Fail the next `times` writes regardless of key.
    pub fn fail_next_writes(&self, times: u32) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.any_write_failures = times;
        }
    }

    /// Copy of the current contents.
    pub async fn snapshot(&self) -> Mapping {
        self.records.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    fn check_write(&self, source_id: &str) -> PersistenceResult<()> {
        let Ok(mut faults) = self.faults.lock() else {
            return Ok(());
        };
        if faults.any_write_failures > 0 {
            faults.any_write_failures -= 1;
            return Err(PersistenceError::unavailable("injected write failure"));
        }
        if let Some(remaining) = faults.write_failures.get_mut(source_id) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(PersistenceError::unavailable(format!(
                    "injected write failure for {source_id}"
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl MappingStore for MemoryMappingStore {
    async fn load_all(&self) -> PersistenceResult<Mapping> {
        let fail = self.faults.lock().map(|f| f.fail_loads).unwrap_or(false);
        if fail {
            return Err(PersistenceError::unavailable("injected load failure"));
        }
        Ok(self.records.read().await.clone())
    }

    async fn upsert(&self, record: &MappingRecord) -> PersistenceResult<()> {
        self.check_write(&record.source_id)?;
        self.records
            .write()
            .await
            .insert(record.source_id.clone(), record.clone());
        Ok(())
    }

    async fn delete(&self, source_id: &str) -> PersistenceResult<()> {
        self.check_write(source_id)?;
        self.records.write().await.remove(source_id);
        Ok(())
    }
}
