use chrono::{DateTime, Utc};
use diesel::deserialize::{self, FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::pg::{Pg, PgValue};
use diesel::prelude::*;
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::SqlType;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::io::Write;
use uuid::Uuid;

use core_smap::{NewTask, RunState, SitemapChunk, Task, Variant, VariantName};

// SQL type definitions for custom enums
// Note: These types use snake_case to match PostgreSQL type names
#[allow(non_camel_case_types)]
#[derive(SqlType, diesel::query_builder::QueryId, Debug, Clone, Copy)]
#[diesel(postgres_type(name = "chunk_status"))]
pub struct Chunk_status;

/// Whether a stored document is a candidate of the pass in flight or what is being served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsExpression, FromSqlRow)]
#[diesel(sql_type = Chunk_status)]
pub enum ChunkStatus {
    Staged,
    Published,
}

impl ToSql<Chunk_status, Pg> for ChunkStatus {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        let s = match self {
            ChunkStatus::Staged => "staged",
            ChunkStatus::Published => "published",
        };
        out.write_all(s.as_bytes())?;
        Ok(IsNull::No)
    }
}

impl FromSql<Chunk_status, Pg> for ChunkStatus {
    fn from_sql(bytes: PgValue) -> deserialize::Result<Self> {
        match bytes.as_bytes() {
            b"staged" => Ok(ChunkStatus::Staged),
            b"published" => Ok(ChunkStatus::Published),
            _ => Err("Unrecognized enum variant".into()),
        }
    }
}

impl From<ChunkStatus> for core_smap::ChunkStatus {
    fn from(status: ChunkStatus) -> Self {
        match status {
            ChunkStatus::Staged => core_smap::ChunkStatus::Staged,
            ChunkStatus::Published => core_smap::ChunkStatus::Published,
        }
    }
}

/// Link and document generator kinds are stored by their serialized name.
fn kind_from_text<T: DeserializeOwned>(text: &str) -> Result<T, serde_json::Error> {
    serde_json::from_value(Value::String(text.to_string()))
}

// sitemap_queue table model
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crate::schema::sitemap_queue)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TaskRow {
    pub id: i64,
    pub variant: String,
    pub generator: String,
    pub document: String,
    pub data_set: Value,
    pub claimed_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<TaskRow> for Task {
    type Error = core_smap::Error;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        Ok(Task {
            id: row.id,
            variant: VariantName::new(row.variant)?,
            generator: kind_from_text(&row.generator)?,
            document: kind_from_text(&row.document)?,
            data_set: serde_json::from_value(row.data_set)?,
        })
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::sitemap_queue)]
pub struct NewTaskRow {
    pub variant: String,
    pub generator: String,
    pub document: String,
    pub data_set: Value,
}

impl TryFrom<NewTask> for NewTaskRow {
    type Error = core_smap::Error;

    fn try_from(task: NewTask) -> Result<Self, Self::Error> {
        Ok(NewTaskRow {
            variant: task.variant.extract(),
            generator: task.generator.as_str().to_string(),
            document: task.document.as_str().to_string(),
            data_set: serde_json::to_value(&task.data_set)?,
        })
    }
}

// sitemap_chunk table model
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = crate::schema::sitemap_chunk)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ChunkRow {
    pub variant: String,
    pub delta: i32,
    pub status: ChunkStatus,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<ChunkRow> for SitemapChunk {
    type Error = core_smap::Error;

    fn try_from(row: ChunkRow) -> Result<Self, Self::Error> {
        Ok(SitemapChunk {
            variant: VariantName::new(row.variant)?,
            delta: row.delta,
            content: row.content,
            created_at: row.created_at,
            status: row.status.into(),
        })
    }
}

// sitemap_variant table model
#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = crate::schema::sitemap_variant)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct VariantRow {
    pub name: String,
    pub label: String,
    pub sitemap_type: String,
    pub weight: i32,
    pub enabled: bool,
}

impl TryFrom<VariantRow> for Variant {
    type Error = core_smap::Error;

    fn try_from(row: VariantRow) -> Result<Self, Self::Error> {
        Ok(Variant {
            name: VariantName::new(row.name)?,
            label: row.label,
            sitemap_type: row.sitemap_type,
            weight: row.weight,
            enabled: row.enabled,
        })
    }
}

impl From<&Variant> for VariantRow {
    fn from(variant: &Variant) -> Self {
        VariantRow {
            name: variant.name.as_str().to_string(),
            label: variant.label.clone(),
            sitemap_type: variant.sitemap_type.clone(),
            weight: variant.weight,
            enabled: variant.enabled,
        }
    }
}

// sitemap_settings table model (a single row, id is always true)
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = crate::schema::sitemap_settings)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct SettingsRow {
    pub id: bool,
    pub settings: Value,
}

// sitemap_run_state table model (a single row, id is always true)
#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = crate::schema::sitemap_run_state)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(treat_none_as_null = true)]
pub struct RunStateRow {
    pub id: bool,
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub initial_task_count: i64,
    pub processed_task_count: i64,
    pub in_progress: bool,
    pub stash: Option<Value>,
}

impl TryFrom<RunStateRow> for RunState {
    type Error = core_smap::Error;

    fn try_from(row: RunStateRow) -> Result<Self, Self::Error> {
        Ok(RunState {
            run_id: row.run_id,
            started_at: row.started_at,
            initial_task_count: row.initial_task_count.max(0) as usize,
            processed_task_count: row.processed_task_count.max(0) as usize,
            in_progress: row.in_progress,
            stash: row.stash.map(serde_json::from_value).transpose()?,
        })
    }
}

impl TryFrom<&RunState> for RunStateRow {
    type Error = core_smap::Error;

    fn try_from(state: &RunState) -> Result<Self, Self::Error> {
        Ok(RunStateRow {
            id: true,
            run_id: state.run_id,
            started_at: state.started_at,
            initial_task_count: state.initial_task_count as i64,
            processed_task_count: state.processed_task_count as i64,
            in_progress: state.in_progress,
            stash: state.stash.as_ref().map(serde_json::to_value).transpose()?,
        })
    }
}
