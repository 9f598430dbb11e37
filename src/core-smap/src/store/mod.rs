//! Storage seams of the pipeline. The worker only talks to these traits; `MemoryStore`
//! implements all of them in process and `data-model-smap` implements them on Postgres.

pub mod memory;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::errors::Result;
use crate::models::{NewTask, SitemapChunk, Task, TaskId, Variant, VariantName};
use crate::settings::Settings;
use crate::worker::RunState;

pub use memory::MemoryStore;

/// Durable ordered queue of tasks with at-least-once delivery.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Appends tasks in order, assigning increasing ids.
    async fn enqueue(&self, tasks: Vec<NewTask>) -> Result<()>;

    /// The oldest task nobody holds a live claim on, claimed for `lease`.
    /// `None` when there is nothing to claim.
    async fn claim(&self, lease: Duration) -> Result<Option<Task>>;

    async fn delete(&self, id: TaskId) -> Result<()>;

    /// Tasks still in the queue, claimed or not.
    async fn count(&self) -> Result<usize>;

    async fn purge_all(&self) -> Result<()>;

    /// Removes the tasks of the given variants. Returns how many were removed.
    async fn purge_variants(&self, variants: &[VariantName]) -> Result<usize>;
}

/// Staged and published sitemap documents.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Stores (or replaces) a staged document of a variant.
    async fn stage(&self, variant: &VariantName, delta: i32, content: &str) -> Result<()>;

    /// Staged documents of a variant, ordered by delta.
    async fn staged(&self, variant: &VariantName) -> Result<Vec<SitemapChunk>>;

    /// Atomically replaces the published set of a variant with its staged set.
    /// Does nothing and returns false when nothing is staged.
    async fn publish(&self, variant: &VariantName) -> Result<bool>;

    /// Drops every staged document, of every variant.
    async fn purge_staged(&self) -> Result<()>;

    /// Drops staged and published documents of the given variants.
    async fn remove_variants(&self, variants: &[VariantName]) -> Result<()>;

    /// Published documents of a variant, ordered by delta.
    async fn published(&self, variant: &VariantName) -> Result<Vec<SitemapChunk>>;

    async fn published_chunk(&self, variant: &VariantName, delta: i32) -> Result<Option<SitemapChunk>>;
}

/// The persisted state of an in-flight generation pass.
#[async_trait]
pub trait RunStateStore: Send + Sync {
    async fn load(&self) -> Result<Option<RunState>>;

    async fn save(&self, state: &RunState) -> Result<()>;

    async fn clear(&self) -> Result<()>;
}

#[async_trait]
pub trait VariantStore: Send + Sync {
    async fn list(&self) -> Result<Vec<Variant>>;

    async fn get(&self, name: &VariantName) -> Result<Option<Variant>>;

    /// Inserts or replaces by name.
    async fn save(&self, variant: &Variant) -> Result<()>;

    async fn delete(&self, name: &VariantName) -> Result<()>;
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// `None` until settings were saved once.
    async fn load(&self) -> Result<Option<Settings>>;

    async fn save(&self, settings: &Settings) -> Result<()>;
}

/// Serializes generation passes across processes.
#[async_trait]
pub trait RunLock: Send + Sync {
    /// True when the lock was acquired, false when someone else holds it.
    async fn try_lock(&self) -> Result<bool>;

    async fn unlock(&self) -> Result<()>;
}

/// Handles to every store, usually all backed by one implementation.
#[derive(Clone)]
pub struct Stores {
    pub queue: Arc<dyn TaskQueue>,
    pub chunks: Arc<dyn ChunkStore>,
    pub run_state: Arc<dyn RunStateStore>,
    pub variants: Arc<dyn VariantStore>,
    pub settings: Arc<dyn SettingsStore>,
    pub lock: Arc<dyn RunLock>,
}

impl Stores {
    pub fn from_store<S>(store: S) -> Self
    where
        S: TaskQueue + ChunkStore + RunStateStore + VariantStore + SettingsStore + RunLock + 'static,
    {
        let store = Arc::new(store);
        Stores {
            queue: store.clone(),
            chunks: store.clone(),
            run_state: store.clone(),
            variants: store.clone(),
            settings: store.clone(),
            lock: store,
        }
    }

    /// Stored settings, or `fallback` when none were saved yet. Validated either way.
    pub async fn settings_or(&self, fallback: Settings) -> Result<Settings> {
        let settings = self.settings.load().await?.unwrap_or(fallback);
        settings.validate()?;
        Ok(settings)
    }
}
