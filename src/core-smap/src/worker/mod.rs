//! The queue worker: rebuilds the task queue, drains it within a budget and publishes the
//! sitemaps of finished variants.

mod run_state;

#[cfg(test)]
mod tests;

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::errors::Result;
use crate::links::{GenerationContext, LinkGenerator};
use crate::models::{ChunkInfo, NewTask, Task, Variant, VariantName};
use crate::registry::VariantRegistry;
use crate::settings::Settings;
use crate::site::{Language, Site};
use crate::store::Stores;

pub use run_state::{RunState, Stash};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    RebuildingQueue,
    /// A stash from an earlier pass was loaded back before draining.
    Resumed,
    Draining,
    Flushing,
    Publishing,
}

/// How much work one call to [`QueueWorker::resume_or_start`] may do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationBudget {
    /// Stop after `generate_duration_ms` or `batch_process_limit` tasks, whichever comes first.
    Limited,
    /// Drain the whole queue.
    Unbounded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub processed: usize,
    pub total: usize,
    /// Everything processed so far is also published.
    pub published: bool,
}

impl Progress {
    /// Percent of tasks processed. Never 100 while results wait to be published.
    pub fn percent(&self) -> u8 {
        let percent = if self.total == 0 {
            if self.published { 100 } else { 0 }
        } else {
            (self.processed.min(self.total) * 100 / self.total) as u8
        };
        if self.published { percent } else { percent.min(99) }
    }
}

impl std::fmt::Display for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{} tasks ({}%)", self.processed, self.total, self.percent())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// The queue is empty and every variant that produced links is published.
    Completed(Progress),
    /// The budget ran out; the stash holds what is needed to continue.
    Suspended(Progress),
}

impl PassOutcome {
    pub fn progress(&self) -> Progress {
        match self {
            PassOutcome::Completed(p) | PassOutcome::Suspended(p) => *p,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, PassOutcome::Completed(_))
    }
}

/// Inputs shared by every task of one pass.
struct PassInputs {
    settings: Settings,
    base_url: String,
    languages: Vec<Language>,
    variants: Vec<Variant>,
}

/// Long-lived orchestrator. Call [`QueueWorker::resume_or_start`] from whatever schedules work.
pub struct QueueWorker {
    stores: Stores,
    site: Site,
    registry: VariantRegistry,
    fallback_settings: Settings,
    state: WorkerState,
}

impl QueueWorker {
    pub fn new(stores: Stores, site: Site, registry: VariantRegistry) -> Self {
        QueueWorker {
            stores,
            site,
            registry,
            fallback_settings: Settings::default(),
            state: WorkerState::Idle,
        }
    }

    /// Settings used when none were saved in the settings store.
    pub fn with_fallback_settings(mut self, settings: Settings) -> Self {
        self.fallback_settings = settings;
        self
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn registry(&self) -> &VariantRegistry {
        &self.registry
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    async fn settings(&self) -> Result<Settings> {
        self.stores.settings_or(self.fallback_settings.clone()).await
    }

    async fn pass_inputs(&self, settings: Settings) -> Result<PassInputs> {
        let base_url = settings.base_url.clone().unwrap_or_else(|| self.site.paths.base_url());
        Ok(PassInputs {
            languages: self.site.entities.languages().await?,
            variants: self.registry.get_variants().await?,
            base_url,
            settings,
        })
    }

    fn context<'a>(
        &'a self,
        inputs: &'a PassInputs,
        variant: &'a VariantName,
        seen_paths: &'a BTreeSet<String>,
    ) -> GenerationContext<'a> {
        GenerationContext {
            settings: &inputs.settings,
            variant,
            base_url: &inputs.base_url,
            languages: &inputs.languages,
            site: &self.site,
            chunks: self.stores.chunks.as_ref(),
            registry: self.registry.types(),
            variants: &inputs.variants,
            seen_paths,
        }
    }

    /// Discards the queue, staged chunks and run state, then enqueues the data sets of every
    /// enabled variant. Published chunks are untouched. Returns the number of queued tasks.
    pub async fn rebuild_queue(&mut self) -> Result<usize> {
        let settings = self.settings().await?;
        self.rebuild_with(settings).await
    }

    async fn rebuild_with(&mut self, settings: Settings) -> Result<usize> {
        self.state = WorkerState::RebuildingQueue;
        let result = self.enumerate_tasks(settings).await;
        let tasks = match result {
            Ok(tasks) => tasks,
            Err(e) => {
                self.state = WorkerState::Idle;
                return Err(e);
            }
        };

        let count = tasks.len();
        self.stores.queue.purge_all().await?;
        self.stores.chunks.purge_staged().await?;
        self.stores.queue.enqueue(tasks).await?;
        self.stores.run_state.save(&RunState::new(count)).await?;
        info!("Rebuilt sitemap queue with {} tasks", count);
        self.state = WorkerState::Idle;
        Ok(count)
    }

    async fn enumerate_tasks(&self, settings: Settings) -> Result<Vec<NewTask>> {
        let inputs = self.pass_inputs(settings).await?;
        let empty = BTreeSet::new();
        let mut tasks = Vec::new();

        for variant in inputs.variants.iter().filter(|v| v.enabled) {
            let sitemap_type = self.registry.get_sitemap_type(&variant.sitemap_type)?;
            let ctx = self.context(&inputs, &variant.name, &empty);
            for kind in &sitemap_type.link_generators {
                let data_sets = LinkGenerator::from(*kind).enumerate(&ctx).await?;
                debug!("{} generator: {} data sets for variant {}", kind, data_sets.len(), variant.name);
                tasks.extend(data_sets.into_iter().map(|data_set| NewTask {
                    variant: variant.name.clone(),
                    generator: *kind,
                    document: sitemap_type.document,
                    data_set,
                }));
            }
        }
        Ok(tasks)
    }

    /// Continues the current pass, or starts a new one when there is nothing to continue.
    ///
    /// A new pass rebuilds the queue. So does a pass that finds the previous one died while
    /// draining, since whatever it accumulated after its last stash is gone.
    pub async fn resume_or_start(&mut self, budget: GenerationBudget) -> Result<PassOutcome> {
        let settings = self.settings().await?;
        let queued = self.stores.queue.count().await?;
        let mut run = self.stores.run_state.load().await?;

        let crashed = run.as_ref().is_some_and(|r| r.in_progress);
        if crashed {
            warn!("Previous sitemap generation stopped while draining, rebuilding the queue");
        }
        let has_stash = run.as_ref().is_some_and(|r| r.stash.is_some());
        if crashed || (queued == 0 && !has_stash) {
            self.rebuild_with(settings.clone()).await?;
            run = self.stores.run_state.load().await?;
        } else if has_stash {
            self.state = WorkerState::Resumed;
            info!("Resuming sitemap generation from stash");
        }

        let mut run = run.unwrap_or_else(|| RunState::new(queued));
        run.in_progress = true;
        self.stores.run_state.save(&run).await?;

        let inputs = self.pass_inputs(settings).await?;
        let outcome = self.drain(&inputs, budget, run).await;
        if outcome.is_err() {
            self.state = WorkerState::Idle;
        }
        outcome
    }

    async fn drain(&mut self, inputs: &PassInputs, budget: GenerationBudget, mut run: RunState) -> Result<PassOutcome> {
        let started = Instant::now();
        let lease = Duration::from_secs(inputs.settings.claim_lease_secs);
        let mut current = run.stash.take();
        let mut processed_this_pass = 0usize;
        // variants published by this call; a task of one of them can only be a re-offered claim
        let mut published = BTreeSet::new();
        self.state = WorkerState::Draining;

        loop {
            if processed_this_pass > 0 && budget_exhausted(budget, &inputs.settings, started, processed_this_pass) {
                let progress = Progress {
                    processed: run.processed_task_count,
                    total: run.initial_task_count,
                    published: false,
                };
                run.stash = current;
                run.in_progress = false;
                self.stores.run_state.save(&run).await?;
                self.state = WorkerState::Idle;
                info!(
                    "Sitemap generation suspended at {}, {} tasks remaining",
                    progress,
                    run.remaining_task_count()
                );
                return Ok(PassOutcome::Suspended(progress));
            }

            let Some(task) = self.stores.queue.claim(lease).await? else {
                break;
            };

            if published.contains(&task.variant) {
                warn!(
                    "Task {} of variant {} was offered again after the variant was published, dropping it",
                    task.id, task.variant
                );
                self.stores.queue.delete(task.id).await?;
                continue;
            }

            if let Some(finished) = current.take_if(|c| c.variant != task.variant) {
                published.insert(finished.variant.clone());
                self.finish_variant(inputs, finished).await?;
                self.state = WorkerState::Draining;
            }
            let stash = current.get_or_insert_with(|| Stash::new(task.variant.clone(), task.document));

            self.process_task(inputs, &task, stash).await;
            self.stores.queue.delete(task.id).await?;
            run.processed_task_count += 1;
            processed_this_pass += 1;

            self.flush(inputs, stash, false).await?;
            self.state = WorkerState::Draining;
        }

        if let Some(finished) = current.take() {
            self.finish_variant(inputs, finished).await?;
        }
        self.stores.run_state.clear().await?;
        self.state = WorkerState::Idle;

        let progress = Progress {
            processed: run.processed_task_count,
            total: run.initial_task_count.max(run.processed_task_count),
            published: true,
        };
        info!("Sitemap generation completed: {}", progress);
        Ok(PassOutcome::Completed(progress))
    }

    /// Runs one task's generator and accumulates what survives dedup. A failing task is
    /// logged and skipped.
    async fn process_task(&self, inputs: &PassInputs, task: &Task, stash: &mut Stash) {
        let ctx = self.context(inputs, &task.variant, &stash.processed_paths);
        let generator = LinkGenerator::from(task.generator);
        let records = match generator.process(&task.data_set, &ctx).await {
            Ok(records) => records,
            Err(e) => {
                error!(
                    "Task {} ({} for variant {}, {}) failed and is dropped: {}",
                    task.id,
                    task.generator,
                    task.variant,
                    task.data_set.describe(),
                    e
                );
                return;
            }
        };

        let produced = records.len();
        let dropped = stash.add(records, inputs.settings.remove_duplicates);
        debug!(
            "Task {} ({}) produced {} records for variant {}, {} duplicates dropped",
            task.id, task.generator, produced, task.variant, dropped
        );
    }

    /// Stages full chunks of the stash. With `complete`, the remaining partial chunk as well.
    async fn flush(&mut self, inputs: &PassInputs, stash: &mut Stash, complete: bool) -> Result<()> {
        let max_links = inputs.settings.max_links.max(1);
        while stash.results.len() >= max_links || (complete && !stash.results.is_empty()) {
            self.state = WorkerState::Flushing;
            let take = max_links.min(stash.results.len());
            let records = stash.results.drain(..take).collect::<Vec<_>>();
            let xml = stash
                .document
                .render_chunk(&records, &stash.variant, self.site.hooks.as_ref())?;

            let delta = self
                .stores
                .chunks
                .staged(&stash.variant)
                .await?
                .iter()
                .map(|c| c.delta)
                .max()
                .unwrap_or(0)
                + 1;
            self.stores.chunks.stage(&stash.variant, delta, &xml).await?;
            debug!("Staged chunk {} of variant {} with {} links", delta, stash.variant, records.len());
        }
        Ok(())
    }

    /// Final flush, index document and the atomic swap of a variant's staged set.
    async fn finish_variant(&mut self, inputs: &PassInputs, mut stash: Stash) -> Result<()> {
        self.flush(inputs, &mut stash, true).await?;
        self.state = WorkerState::Publishing;

        let variant = &stash.variant;
        let pages = self
            .stores
            .chunks
            .staged(variant)
            .await?
            .iter()
            .filter(|c| c.delta >= 1)
            .map(|c| c.info())
            .collect::<Vec<ChunkInfo>>();

        if pages.len() > 1 {
            let xml = stash.document.render_index(
                &pages,
                &inputs.base_url,
                variant,
                inputs.settings.is_default_variant(variant),
                self.site.hooks.as_ref(),
            )?;
            self.stores.chunks.stage(variant, 0, &xml).await?;
        }

        if self.stores.chunks.publish(variant).await? {
            info!("Published sitemap of variant {} ({} chunks)", variant, pages.len());
        } else {
            warn!("Variant {} produced no links, keeping its previously published sitemap", variant);
        }
        Ok(())
    }

    /// Progress of the pass in flight, or of the last one when idle.
    pub async fn progress(&self) -> Result<Progress> {
        Ok(match self.stores.run_state.load().await? {
            Some(run) => Progress {
                processed: run.processed_task_count,
                total: run.initial_task_count,
                published: false,
            },
            None => Progress {
                processed: 0,
                total: 0,
                published: true,
            },
        })
    }
}

fn budget_exhausted(budget: GenerationBudget, settings: &Settings, started: Instant, processed: usize) -> bool {
    match budget {
        GenerationBudget::Unbounded => false,
        GenerationBudget::Limited => {
            processed >= settings.batch_process_limit || started.elapsed() >= settings.generate_duration()
        }
    }
}
