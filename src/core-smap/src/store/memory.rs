use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;

use super::{ChunkStore, RunLock, RunStateStore, SettingsStore, TaskQueue, VariantStore};
use crate::errors::{Error, Result};
use crate::models::{ChunkStatus, NewTask, SitemapChunk, Task, TaskId, Variant, VariantName};
use crate::settings::Settings;
use crate::worker::RunState;

#[derive(Default)]
struct Inner {
    next_task_id: TaskId,
    /// Task and the instant its current claim expires.
    tasks: BTreeMap<TaskId, (Task, Option<Instant>)>,
    staged: BTreeMap<(VariantName, i32), SitemapChunk>,
    published: BTreeMap<(VariantName, i32), SitemapChunk>,
    run_state: Option<RunState>,
    variants: BTreeMap<VariantName, Variant>,
    settings: Option<Settings>,
    locked: bool,
}

/// Every store in process memory. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    fn inner(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|e| Error::Storage(format!("memory store lock poisoned: {}", e)))
    }
}

fn chunks_of(chunks: &BTreeMap<(VariantName, i32), SitemapChunk>, variant: &VariantName) -> Vec<SitemapChunk> {
    chunks
        .iter()
        .filter(|((v, _), _)| v == variant)
        .map(|(_, c)| c.clone())
        .collect()
}

#[async_trait]
impl TaskQueue for MemoryStore {
    async fn enqueue(&self, tasks: Vec<NewTask>) -> Result<()> {
        let mut inner = self.inner()?;
        for task in tasks {
            inner.next_task_id += 1;
            let id = inner.next_task_id;
            inner.tasks.insert(id, (Task::from_new(id, task), None));
        }
        Ok(())
    }

    async fn claim(&self, lease: Duration) -> Result<Option<Task>> {
        let mut inner = self.inner()?;
        let now = Instant::now();
        let claimable = inner
            .tasks
            .values_mut()
            .find(|(_, claimed_until)| claimed_until.is_none_or(|until| until <= now));
        Ok(claimable.map(|(task, claimed_until)| {
            *claimed_until = Some(now + lease);
            task.clone()
        }))
    }

    async fn delete(&self, id: TaskId) -> Result<()> {
        self.inner()?.tasks.remove(&id);
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.inner()?.tasks.len())
    }

    async fn purge_all(&self) -> Result<()> {
        self.inner()?.tasks.clear();
        Ok(())
    }

    async fn purge_variants(&self, variants: &[VariantName]) -> Result<usize> {
        let mut inner = self.inner()?;
        let before = inner.tasks.len();
        inner.tasks.retain(|_, (task, _)| !variants.contains(&task.variant));
        Ok(before - inner.tasks.len())
    }
}

#[async_trait]
impl ChunkStore for MemoryStore {
    async fn stage(&self, variant: &VariantName, delta: i32, content: &str) -> Result<()> {
        let chunk = SitemapChunk {
            variant: variant.clone(),
            delta,
            content: content.to_string(),
            created_at: Utc::now(),
            status: ChunkStatus::Staged,
        };
        self.inner()?.staged.insert((variant.clone(), delta), chunk);
        Ok(())
    }

    async fn staged(&self, variant: &VariantName) -> Result<Vec<SitemapChunk>> {
        Ok(chunks_of(&self.inner()?.staged, variant))
    }

    async fn publish(&self, variant: &VariantName) -> Result<bool> {
        let mut inner = self.inner()?;
        let staged = chunks_of(&inner.staged, variant);
        if staged.is_empty() {
            return Ok(false);
        }
        inner.staged.retain(|(v, _), _| v != variant);
        inner.published.retain(|(v, _), _| v != variant);
        for mut chunk in staged {
            chunk.status = ChunkStatus::Published;
            inner.published.insert((variant.clone(), chunk.delta), chunk);
        }
        Ok(true)
    }

    async fn purge_staged(&self) -> Result<()> {
        self.inner()?.staged.clear();
        Ok(())
    }

    async fn remove_variants(&self, variants: &[VariantName]) -> Result<()> {
        let mut inner = self.inner()?;
        inner.staged.retain(|(v, _), _| !variants.contains(v));
        inner.published.retain(|(v, _), _| !variants.contains(v));
        Ok(())
    }

    async fn published(&self, variant: &VariantName) -> Result<Vec<SitemapChunk>> {
        Ok(chunks_of(&self.inner()?.published, variant))
    }

    async fn published_chunk(&self, variant: &VariantName, delta: i32) -> Result<Option<SitemapChunk>> {
        Ok(self.inner()?.published.get(&(variant.clone(), delta)).cloned())
    }
}

#[async_trait]
impl RunStateStore for MemoryStore {
    async fn load(&self) -> Result<Option<RunState>> {
        Ok(self.inner()?.run_state.clone())
    }

    async fn save(&self, state: &RunState) -> Result<()> {
        self.inner()?.run_state = Some(state.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.inner()?.run_state = None;
        Ok(())
    }
}

#[async_trait]
impl VariantStore for MemoryStore {
    async fn list(&self) -> Result<Vec<Variant>> {
        Ok(self.inner()?.variants.values().cloned().collect())
    }

    async fn get(&self, name: &VariantName) -> Result<Option<Variant>> {
        Ok(self.inner()?.variants.get(name).cloned())
    }

    async fn save(&self, variant: &Variant) -> Result<()> {
        self.inner()?.variants.insert(variant.name.clone(), variant.clone());
        Ok(())
    }

    async fn delete(&self, name: &VariantName) -> Result<()> {
        self.inner()?.variants.remove(name);
        Ok(())
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn load(&self) -> Result<Option<Settings>> {
        Ok(self.inner()?.settings.clone())
    }

    async fn save(&self, settings: &Settings) -> Result<()> {
        self.inner()?.settings = Some(settings.clone());
        Ok(())
    }
}

#[async_trait]
impl RunLock for MemoryStore {
    async fn try_lock(&self) -> Result<bool> {
        let mut inner = self.inner()?;
        if inner.locked {
            Ok(false)
        } else {
            inner.locked = true;
            Ok(true)
        }
    }

    async fn unlock(&self) -> Result<()> {
        self.inner()?.locked = false;
        Ok(())
    }
}
