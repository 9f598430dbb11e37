use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Bool};
use diesel::upsert::excluded;
use diesel_async::pooled_connection::deadpool::Object;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use tokio::sync::Mutex;

use core_smap::store::{ChunkStore, RunLock, RunStateStore, SettingsStore, TaskQueue, VariantStore};
use core_smap::{NewTask, RunState, Settings, SitemapChunk, Task, TaskId, Variant, VariantName};

use crate::db::{DbPool, PoolError};
use crate::models::{ChunkRow, ChunkStatus, NewTaskRow, RunStateRow, SettingsRow, TaskRow, VariantRow};
use crate::schema::{sitemap_chunk, sitemap_queue, sitemap_run_state, sitemap_settings, sitemap_variant};

/// Rows per INSERT statement, well below the Postgres bind parameter limit.
const INSERT_BATCH: usize = 1000;

/// Key of the session-level advisory lock serializing generation passes.
const RUN_LOCK_KEY: i64 = 0x736d_6170;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Db(#[from] diesel::result::Error),
    #[error("Database pool error: {0:?}")]
    Pool(#[from] PoolError),
    #[error(transparent)]
    Core(#[from] core_smap::Error),
}

impl From<StoreError> for core_smap::Error {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Core(e) => e,
            other => core_smap::Error::Storage(other.to_string()),
        }
    }
}

#[derive(QueryableByName)]
struct AdvisoryLock {
    #[diesel(sql_type = Bool)]
    locked: bool,
}

/// Every store of the pipeline on one Postgres database.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
    /// The connection holding the advisory lock, while this process holds it.
    lock_conn: Arc<Mutex<Option<Object<AsyncPgConnection>>>>,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        PgStore {
            pool,
            lock_conn: Arc::new(Mutex::new(None)),
        }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    async fn insert_tasks(&self, tasks: Vec<NewTask>) -> Result<(), StoreError> {
        let rows = tasks
            .into_iter()
            .map(NewTaskRow::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        let mut conn = self.pool.get().await?;

        conn.transaction::<_, StoreError, _>(|conn| {
            Box::pin(async move {
                for batch in rows.chunks(INSERT_BATCH) {
                    diesel::insert_into(sitemap_queue::table)
                        .values(batch)
                        .execute(conn)
                        .await?;
                }
                Ok(())
            })
        })
        .await
    }

    /// Claims the oldest task that is unclaimed or whose claim expired.
    /// Rows that no longer decode into a task are deleted on the way.
    async fn claim_task(&self, lease: Duration) -> Result<Option<Task>, StoreError> {
        let lease = TimeDelta::seconds(lease.as_secs() as i64);
        loop {
            let mut conn = self.pool.get().await?;
            let row = conn
                .transaction::<_, StoreError, _>(|conn| {
                    Box::pin(async move {
                        let now = Utc::now();
                        // FOR UPDATE SKIP LOCKED: concurrent claimers never receive the same row
                        let row: Option<TaskRow> = sitemap_queue::table
                            .filter(
                                sitemap_queue::claimed_until
                                    .is_null()
                                    .or(sitemap_queue::claimed_until.lt(now)),
                            )
                            .order(sitemap_queue::id.asc())
                            .select(TaskRow::as_select())
                            .for_update()
                            .skip_locked()
                            .first(conn)
                            .await
                            .optional()?;

                        if let Some(row) = &row {
                            diesel::update(sitemap_queue::table.find(row.id))
                                .set(sitemap_queue::claimed_until.eq(now + lease))
                                .execute(conn)
                                .await?;
                        }
                        Ok(row)
                    })
                })
                .await?;

            let Some(row) = row else {
                return Ok(None);
            };
            let id = row.id;
            match Task::try_from(row) {
                Ok(task) => {
                    tracing::debug!("Claimed task {} of variant {}", task.id, task.variant);
                    return Ok(Some(task));
                }
                Err(e) => {
                    tracing::error!("[SKIP] Task {} cannot be decoded and is deleted: {}", id, e);
                    self.delete_task(id).await?;
                }
            }
        }
    }

    async fn delete_task(&self, id: TaskId) -> Result<(), StoreError> {
        let mut conn = self.pool.get().await?;
        diesel::delete(sitemap_queue::table.find(id)).execute(&mut conn).await?;
        Ok(())
    }

    async fn count_tasks(&self) -> Result<usize, StoreError> {
        let mut conn = self.pool.get().await?;
        let count: i64 = sitemap_queue::table.count().get_result(&mut conn).await?;
        Ok(count.max(0) as usize)
    }

    async fn delete_all_tasks(&self) -> Result<(), StoreError> {
        let mut conn = self.pool.get().await?;
        diesel::delete(sitemap_queue::table).execute(&mut conn).await?;
        Ok(())
    }

    async fn delete_variant_tasks(&self, variants: &[VariantName]) -> Result<usize, StoreError> {
        let names = names_of(variants);
        let mut conn = self.pool.get().await?;
        let removed = diesel::delete(sitemap_queue::table.filter(sitemap_queue::variant.eq_any(names)))
            .execute(&mut conn)
            .await?;
        Ok(removed)
    }

    async fn upsert_staged(&self, variant: &VariantName, delta: i32, content: &str) -> Result<(), StoreError> {
        let row = ChunkRow {
            variant: variant.as_str().to_string(),
            delta,
            status: ChunkStatus::Staged,
            content: content.to_string(),
            created_at: Utc::now(),
        };
        let mut conn = self.pool.get().await?;
        diesel::insert_into(sitemap_chunk::table)
            .values(&row)
            .on_conflict((sitemap_chunk::variant, sitemap_chunk::delta, sitemap_chunk::status))
            .do_update()
            .set((
                sitemap_chunk::content.eq(excluded(sitemap_chunk::content)),
                sitemap_chunk::created_at.eq(excluded(sitemap_chunk::created_at)),
            ))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    async fn chunks(&self, variant: &VariantName, status: ChunkStatus) -> Result<Vec<SitemapChunk>, StoreError> {
        let mut conn = self.pool.get().await?;
        let rows: Vec<ChunkRow> = sitemap_chunk::table
            .filter(sitemap_chunk::variant.eq(variant.as_str()))
            .filter(sitemap_chunk::status.eq(status))
            .order(sitemap_chunk::delta.asc())
            .select(ChunkRow::as_select())
            .load(&mut conn)
            .await?;
        Ok(rows
            .into_iter()
            .map(SitemapChunk::try_from)
            .collect::<Result<Vec<_>, _>>()?)
    }

    /// Replaces the published rows of a variant with its staged rows in one transaction,
    /// so readers see either the old set or the new one.
    async fn swap_published(&self, variant: &VariantName) -> Result<bool, StoreError> {
        let name = variant.as_str().to_string();
        let mut conn = self.pool.get().await?;

        conn.transaction::<_, StoreError, _>(|conn| {
            Box::pin(async move {
                let staged: i64 = sitemap_chunk::table
                    .filter(sitemap_chunk::variant.eq(&name))
                    .filter(sitemap_chunk::status.eq(ChunkStatus::Staged))
                    .count()
                    .get_result(conn)
                    .await?;
                if staged == 0 {
                    return Ok(false);
                }

                diesel::delete(
                    sitemap_chunk::table
                        .filter(sitemap_chunk::variant.eq(&name))
                        .filter(sitemap_chunk::status.eq(ChunkStatus::Published)),
                )
                .execute(conn)
                .await?;

                diesel::update(
                    sitemap_chunk::table
                        .filter(sitemap_chunk::variant.eq(&name))
                        .filter(sitemap_chunk::status.eq(ChunkStatus::Staged)),
                )
                .set(sitemap_chunk::status.eq(ChunkStatus::Published))
                .execute(conn)
                .await?;

                Ok(true)
            })
        })
        .await
    }

    async fn delete_staged(&self) -> Result<(), StoreError> {
        let mut conn = self.pool.get().await?;
        diesel::delete(sitemap_chunk::table.filter(sitemap_chunk::status.eq(ChunkStatus::Staged)))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    async fn delete_variant_chunks(&self, variants: &[VariantName]) -> Result<(), StoreError> {
        let names = names_of(variants);
        let mut conn = self.pool.get().await?;
        diesel::delete(sitemap_chunk::table.filter(sitemap_chunk::variant.eq_any(names)))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    async fn published_by_delta(&self, variant: &VariantName, delta: i32) -> Result<Option<SitemapChunk>, StoreError> {
        let mut conn = self.pool.get().await?;
        let row: Option<ChunkRow> = sitemap_chunk::table
            .find((variant.as_str(), delta, ChunkStatus::Published))
            .select(ChunkRow::as_select())
            .first(&mut conn)
            .await
            .optional()?;
        Ok(row.map(SitemapChunk::try_from).transpose()?)
    }

    async fn load_run_state(&self) -> Result<Option<RunState>, StoreError> {
        let mut conn = self.pool.get().await?;
        let row: Option<RunStateRow> = sitemap_run_state::table
            .select(RunStateRow::as_select())
            .first(&mut conn)
            .await
            .optional()?;
        Ok(row.map(RunState::try_from).transpose()?)
    }

    async fn save_run_state(&self, state: &RunState) -> Result<(), StoreError> {
        let row = RunStateRow::try_from(state)?;
        let mut conn = self.pool.get().await?;
        diesel::insert_into(sitemap_run_state::table)
            .values(&row)
            .on_conflict(sitemap_run_state::id)
            .do_update()
            .set(&row)
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    async fn clear_run_state(&self) -> Result<(), StoreError> {
        let mut conn = self.pool.get().await?;
        diesel::delete(sitemap_run_state::table).execute(&mut conn).await?;
        Ok(())
    }

    async fn list_variants(&self) -> Result<Vec<Variant>, StoreError> {
        let mut conn = self.pool.get().await?;
        let rows: Vec<VariantRow> = sitemap_variant::table
            .order((sitemap_variant::weight.asc(), sitemap_variant::name.asc()))
            .select(VariantRow::as_select())
            .load(&mut conn)
            .await?;
        Ok(rows.into_iter().map(Variant::try_from).collect::<Result<Vec<_>, _>>()?)
    }

    async fn find_variant(&self, name: &VariantName) -> Result<Option<Variant>, StoreError> {
        let mut conn = self.pool.get().await?;
        let row: Option<VariantRow> = sitemap_variant::table
            .find(name.as_str())
            .select(VariantRow::as_select())
            .first(&mut conn)
            .await
            .optional()?;
        Ok(row.map(Variant::try_from).transpose()?)
    }

    async fn upsert_variant(&self, variant: &Variant) -> Result<(), StoreError> {
        let row = VariantRow::from(variant);
        let mut conn = self.pool.get().await?;
        diesel::insert_into(sitemap_variant::table)
            .values(&row)
            .on_conflict(sitemap_variant::name)
            .do_update()
            .set(&row)
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    async fn delete_variant(&self, name: &VariantName) -> Result<(), StoreError> {
        let mut conn = self.pool.get().await?;
        diesel::delete(sitemap_variant::table.find(name.as_str()))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    async fn load_settings(&self) -> Result<Option<Settings>, StoreError> {
        let mut conn = self.pool.get().await?;
        let row: Option<SettingsRow> = sitemap_settings::table
            .select(SettingsRow::as_select())
            .first(&mut conn)
            .await
            .optional()?;
        match row {
            Some(row) => Ok(Some(
                serde_json::from_value(row.settings).map_err(core_smap::Error::from)?,
            )),
            None => Ok(None),
        }
    }

    async fn save_settings(&self, settings: &Settings) -> Result<(), StoreError> {
        let row = SettingsRow {
            id: true,
            settings: serde_json::to_value(settings).map_err(core_smap::Error::from)?,
        };
        let mut conn = self.pool.get().await?;
        diesel::insert_into(sitemap_settings::table)
            .values(&row)
            .on_conflict(sitemap_settings::id)
            .do_update()
            .set(sitemap_settings::settings.eq(excluded(sitemap_settings::settings)))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    /// Advisory locks belong to a session, so the connection that took it is kept out of the
    /// pool until [`RunLock::unlock`].
    async fn acquire_run_lock(&self) -> Result<bool, StoreError> {
        let mut held = self.lock_conn.lock().await;
        if held.is_some() {
            return Ok(false);
        }

        let mut conn = self.pool.get().await?;
        let lock: AdvisoryLock = diesel::sql_query("SELECT pg_try_advisory_lock($1) AS locked")
            .bind::<BigInt, _>(RUN_LOCK_KEY)
            .get_result(&mut conn)
            .await?;
        if lock.locked {
            *held = Some(conn);
        }
        Ok(lock.locked)
    }

    async fn release_run_lock(&self) -> Result<(), StoreError> {
        let Some(mut conn) = self.lock_conn.lock().await.take() else {
            return Ok(());
        };
        let released: AdvisoryLock = diesel::sql_query("SELECT pg_advisory_unlock($1) AS locked")
            .bind::<BigInt, _>(RUN_LOCK_KEY)
            .get_result(&mut conn)
            .await?;
        if !released.locked {
            tracing::warn!("Generation lock was not held by this session");
        }
        Ok(())
    }
}

fn names_of(variants: &[VariantName]) -> Vec<String> {
    variants.iter().map(|v| v.as_str().to_string()).collect()
}

#[async_trait]
impl TaskQueue for PgStore {
    async fn enqueue(&self, tasks: Vec<NewTask>) -> core_smap::errors::Result<()> {
        Ok(self.insert_tasks(tasks).await?)
    }

    async fn claim(&self, lease: Duration) -> core_smap::errors::Result<Option<Task>> {
        Ok(self.claim_task(lease).await?)
    }

    async fn delete(&self, id: TaskId) -> core_smap::errors::Result<()> {
        Ok(self.delete_task(id).await?)
    }

    async fn count(&self) -> core_smap::errors::Result<usize> {
        Ok(self.count_tasks().await?)
    }

    async fn purge_all(&self) -> core_smap::errors::Result<()> {
        Ok(self.delete_all_tasks().await?)
    }

    async fn purge_variants(&self, variants: &[VariantName]) -> core_smap::errors::Result<usize> {
        Ok(self.delete_variant_tasks(variants).await?)
    }
}

#[async_trait]
impl ChunkStore for PgStore {
    async fn stage(&self, variant: &VariantName, delta: i32, content: &str) -> core_smap::errors::Result<()> {
        Ok(self.upsert_staged(variant, delta, content).await?)
    }

    async fn staged(&self, variant: &VariantName) -> core_smap::errors::Result<Vec<SitemapChunk>> {
        Ok(self.chunks(variant, ChunkStatus::Staged).await?)
    }

    async fn publish(&self, variant: &VariantName) -> core_smap::errors::Result<bool> {
        Ok(self.swap_published(variant).await?)
    }

    async fn purge_staged(&self) -> core_smap::errors::Result<()> {
        Ok(self.delete_staged().await?)
    }

    async fn remove_variants(&self, variants: &[VariantName]) -> core_smap::errors::Result<()> {
        Ok(self.delete_variant_chunks(variants).await?)
    }

    async fn published(&self, variant: &VariantName) -> core_smap::errors::Result<Vec<SitemapChunk>> {
        Ok(self.chunks(variant, ChunkStatus::Published).await?)
    }

    async fn published_chunk(&self, variant: &VariantName, delta: i32) -> core_smap::errors::Result<Option<SitemapChunk>> {
        Ok(self.published_by_delta(variant, delta).await?)
    }
}

#[async_trait]
impl RunStateStore for PgStore {
    async fn load(&self) -> core_smap::errors::Result<Option<RunState>> {
        Ok(self.load_run_state().await?)
    }

    async fn save(&self, state: &RunState) -> core_smap::errors::Result<()> {
        Ok(self.save_run_state(state).await?)
    }

    async fn clear(&self) -> core_smap::errors::Result<()> {
        Ok(self.clear_run_state().await?)
    }
}

#[async_trait]
impl VariantStore for PgStore {
    async fn list(&self) -> core_smap::errors::Result<Vec<Variant>> {
        Ok(self.list_variants().await?)
    }

    async fn get(&self, name: &VariantName) -> core_smap::errors::Result<Option<Variant>> {
        Ok(self.find_variant(name).await?)
    }

    async fn save(&self, variant: &Variant) -> core_smap::errors::Result<()> {
        Ok(self.upsert_variant(variant).await?)
    }

    async fn delete(&self, name: &VariantName) -> core_smap::errors::Result<()> {
        Ok(self.delete_variant(name).await?)
    }
}

#[async_trait]
impl SettingsStore for PgStore {
    async fn load(&self) -> core_smap::errors::Result<Option<Settings>> {
        Ok(self.load_settings().await?)
    }

    async fn save(&self, settings: &Settings) -> core_smap::errors::Result<()> {
        Ok(self.save_settings(settings).await?)
    }
}

#[async_trait]
impl RunLock for PgStore {
    async fn try_lock(&self) -> core_smap::errors::Result<bool> {
        Ok(self.acquire_run_lock().await?)
    }

    async fn unlock(&self) -> core_smap::errors::Result<()> {
        Ok(self.release_run_lock().await?)
    }
}
