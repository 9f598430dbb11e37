use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use super::*;
use crate::errors::Error;
use crate::links::DataSet;
use crate::models::SitemapChunk;
use crate::registry::{DEFAULT_HREFLANG, INDEX, SitemapTypeRegistry};
use crate::site::MenuSettings;
use crate::store::{ChunkStore, MemoryStore, RunStateStore, TaskQueue};
use crate::test_helpers::{
    SAMPLE_MANIFEST, entity_task, memory_worker, name, parse_sitemapindex, parse_urlset, site_from_json, variant,
};

/// `count` pages `/p1`.. of bundle node:page, priority alternating 0.5 / 0.9.
fn pages_manifest(count: usize) -> String {
    let entities = (1..=count)
        .map(|i| serde_json::json!({"entity_type": "node", "bundle": "page", "id": i.to_string(), "path": format!("/p{}", i)}))
        .collect::<Vec<_>>();
    serde_json::json!({
        "base_url": "https://example.com",
        "languages": [{"id": "en", "is_default": true}],
        "entities": entities,
        "variants": {"default": {"bundles": [{"entity_type": "node", "bundle": "page"}]}}
    })
    .to_string()
}

const SCENARIO_A: &str = r#"{
  "base_url": "https://example.com",
  "languages": [{"id": "en", "is_default": true}],
  "entities": [
    {"entity_type": "node", "bundle": "page", "id": "1", "path": "/a"},
    {"entity_type": "node", "bundle": "page", "id": "2", "path": "/b"}
  ],
  "variants": {
    "default": {
      "bundles": [{"entity_type": "node", "bundle": "page"}],
      "overrides": [
        {"entity_type": "node", "id": "1", "priority": "0.5"},
        {"entity_type": "node", "id": "2", "priority": "0.9"}
      ]
    }
  }
}"#;

fn settings(max_links: usize) -> Settings {
    Settings {
        max_links,
        ..Settings::default()
    }
}

async fn published(store: &MemoryStore, variant: &str) -> Vec<SitemapChunk> {
    store.published(&name(variant)).await.unwrap()
}

fn deltas(chunks: &[SitemapChunk]) -> Vec<i32> {
    chunks.iter().map(|c| c.delta).collect()
}

/// Content of the numbered chunks, without the index.
fn pages(chunks: &[SitemapChunk]) -> Vec<String> {
    chunks.iter().filter(|c| c.delta >= 1).map(|c| c.content.clone()).collect()
}

#[tokio::test]
async fn test_scenario_a_one_chunk_with_verbatim_priorities() {
    let store = MemoryStore::new();
    let mut worker = memory_worker(&store, site_from_json(SCENARIO_A), settings(10)).await;

    let outcome = worker.resume_or_start(GenerationBudget::Unbounded).await.unwrap();
    assert!(outcome.is_completed());
    assert_eq!(outcome.progress().percent(), 100);
    assert_eq!(worker.state(), WorkerState::Idle);

    let chunks = published(&store, "default").await;
    assert_eq!(deltas(&chunks), vec![1]);
    let urls = parse_urlset(&chunks[0].content).unwrap();
    assert_eq!(urls.len(), 2);
    assert_eq!(urls[0].loc, "https://example.com/a");
    assert_eq!(urls[0].priority.as_deref(), Some("0.5"));
    assert_eq!(urls[1].priority.as_deref(), Some("0.9"));
}

#[tokio::test]
async fn test_scenario_b_chunks_and_index() {
    let store = MemoryStore::new();
    let mut worker = memory_worker(&store, site_from_json(SCENARIO_A), settings(1)).await;
    worker.resume_or_start(GenerationBudget::Unbounded).await.unwrap();

    let chunks = published(&store, "default").await;
    assert_eq!(deltas(&chunks), vec![0, 1, 2]);

    let index = parse_sitemapindex(&chunks[0].content).unwrap();
    let locs = index.iter().map(|(loc, _)| loc.as_str()).collect::<Vec<_>>();
    assert_eq!(
        locs,
        vec!["https://example.com/sitemap.xml?page=1", "https://example.com/sitemap.xml?page=2"]
    );
    assert!(index.iter().all(|(_, lastmod)| lastmod.is_some()));
    assert_eq!(parse_urlset(&chunks[1].content).unwrap().len(), 1);
    assert_eq!(parse_urlset(&chunks[2].content).unwrap().len(), 1);
}

#[tokio::test]
async fn test_scenario_c_custom_path_without_entity_has_no_lastmod() {
    let manifest = r#"{
      "base_url": "https://example.com",
      "paths": [{"path": "/contact"}],
      "variants": {"default": {"custom_links": [{"path": "/contact", "priority": "0.3"}]}}
    }"#;
    let store = MemoryStore::new();
    let mut worker = memory_worker(&store, site_from_json(manifest), settings(10)).await;
    worker.resume_or_start(GenerationBudget::Unbounded).await.unwrap();

    let urls = parse_urlset(&published(&store, "default").await[0].content).unwrap();
    assert_eq!(urls.len(), 1);
    assert_eq!(urls[0].loc, "https://example.com/contact");
    assert_eq!(urls[0].lastmod, None);
    assert_eq!(urls[0].priority.as_deref(), Some("0.3"));
}

#[tokio::test]
async fn test_scenario_d_untranslated_languages_are_not_alternates() {
    let manifest = r#"{
      "base_url": "https://example.com",
      "languages": [{"id": "en", "is_default": true}, {"id": "de"}, {"id": "fr"}],
      "entities": [
        {"entity_type": "node", "bundle": "page", "id": "1", "path": "/a", "translations": ["en", "de"]}
      ],
      "variants": {"default": {"bundles": [{"entity_type": "node", "bundle": "page"}]}}
    }"#;
    let store = MemoryStore::new();
    let mut worker = memory_worker(&store, site_from_json(manifest), settings(10)).await;
    worker.resume_or_start(GenerationBudget::Unbounded).await.unwrap();

    let urls = parse_urlset(&published(&store, "default").await[0].content).unwrap();
    assert_eq!(urls.len(), 1);
    assert_eq!(urls[0].loc, "https://example.com/a");
    assert_eq!(
        urls[0].alternates,
        vec![
            ("de".to_string(), "https://example.com/de/a".to_string()),
            ("en".to_string(), "https://example.com/a".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_default_language_stays_when_object_lacks_its_translation() {
    let manifest = r#"{
      "base_url": "https://example.com",
      "languages": [{"id": "en", "is_default": true}, {"id": "de"}, {"id": "fr"}],
      "entities": [
        {"entity_type": "node", "bundle": "page", "id": "1", "path": "/a", "translations": ["de"]}
      ],
      "variants": {"default": {"bundles": [{"entity_type": "node", "bundle": "page"}]}}
    }"#;
    let store = MemoryStore::new();
    let mut worker = memory_worker(&store, site_from_json(manifest), settings(10)).await;
    worker.resume_or_start(GenerationBudget::Unbounded).await.unwrap();

    let urls = parse_urlset(&published(&store, "default").await[0].content).unwrap();
    assert_eq!(urls.len(), 1);
    assert_eq!(urls[0].loc, "https://example.com/a");
    let languages = urls[0].alternates.iter().map(|(l, _)| l.as_str()).collect::<Vec<_>>();
    assert_eq!(languages, vec!["de", "en"]);
}

#[tokio::test]
async fn test_scenario_e_first_processed_duplicate_survives() {
    let store = MemoryStore::new();
    let mut worker = memory_worker(&store, site_from_json(SAMPLE_MANIFEST), settings(10)).await;
    worker.resume_or_start(GenerationBudget::Unbounded).await.unwrap();

    let urls = parse_urlset(&published(&store, "default").await[0].content).unwrap();
    let locs = urls.iter().map(|u| u.loc.as_str()).collect::<Vec<_>>();
    assert_eq!(
        locs,
        vec!["https://example.com/contact", "https://example.com/a", "https://example.com/b"]
    );
    // the custom link came first and has no priority of its own
    assert_eq!(urls[1].priority, None);
    assert!(urls[1].lastmod.is_some());
}

#[tokio::test]
async fn test_duplicates_are_kept_when_not_removed() {
    let store = MemoryStore::new();
    let settings = Settings {
        remove_duplicates: false,
        ..settings(10)
    };
    let mut worker = memory_worker(&store, site_from_json(SAMPLE_MANIFEST), settings).await;
    worker.resume_or_start(GenerationBudget::Unbounded).await.unwrap();

    let urls = parse_urlset(&published(&store, "default").await[0].content).unwrap();
    assert_eq!(urls.len(), 4);
}

#[tokio::test]
async fn test_chunking_law() {
    for (total, max_links, entities_per_task) in [(7, 3, 2), (6, 3, 4), (5, 5, 1), (1, 4, 3), (9, 2, 9)] {
        let store = MemoryStore::new();
        let settings = Settings {
            entities_per_task,
            ..settings(max_links)
        };
        let mut worker = memory_worker(&store, site_from_json(&pages_manifest(total)), settings).await;
        worker.resume_or_start(GenerationBudget::Unbounded).await.unwrap();

        let chunks = published(&store, "default").await;
        let expected_chunks = total.div_ceil(max_links);
        let sizes = chunks
            .iter()
            .filter(|c| c.delta >= 1)
            .map(|c| parse_urlset(&c.content).unwrap().len())
            .collect::<Vec<_>>();

        assert_eq!(sizes.len(), expected_chunks, "{} links of {} per chunk", total, max_links);
        assert!(sizes[..sizes.len() - 1].iter().all(|s| *s == max_links));
        assert_eq!(sizes.iter().sum::<usize>(), total);
        assert_eq!(chunks.iter().any(|c| c.delta == 0), expected_chunks > 1);
    }
}

#[tokio::test]
async fn test_republishing_unchanged_content_is_byte_identical() {
    let store = MemoryStore::new();
    let mut worker = memory_worker(&store, site_from_json(&pages_manifest(5)), settings(2)).await;

    worker.resume_or_start(GenerationBudget::Unbounded).await.unwrap();
    let first = pages(&published(&store, "default").await);
    worker.resume_or_start(GenerationBudget::Unbounded).await.unwrap();
    let second = pages(&published(&store, "default").await);

    assert_eq!(first.len(), 3);
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_resumed_passes_match_uninterrupted_pass() {
    let settings = Settings {
        entities_per_task: 1,
        batch_process_limit: 2,
        ..settings(3)
    };

    let uninterrupted = MemoryStore::new();
    let mut worker = memory_worker(&uninterrupted, site_from_json(SAMPLE_MANIFEST), settings.clone()).await;
    worker.resume_or_start(GenerationBudget::Unbounded).await.unwrap();

    let interrupted = MemoryStore::new();
    let mut worker = memory_worker(&interrupted, site_from_json(SAMPLE_MANIFEST), settings).await;
    let mut suspensions = 0;
    loop {
        match worker.resume_or_start(GenerationBudget::Limited).await.unwrap() {
            PassOutcome::Completed(_) => break,
            PassOutcome::Suspended(progress) => {
                suspensions += 1;
                assert!(progress.percent() <= 99);
                assert!(worker.progress().await.unwrap().percent() <= 99);
                assert!(suspensions < 10, "generation never completes");
            }
        }
    }

    assert!(suspensions >= 2);
    assert_eq!(
        pages(&published(&interrupted, "default").await),
        pages(&published(&uninterrupted, "default").await)
    );
    assert!(RunStateStore::load(&interrupted).await.unwrap().is_none());
    assert_eq!(worker.progress().await.unwrap().percent(), 100);
}

#[tokio::test]
async fn test_suspension_stashes_unflushed_results() {
    let settings = Settings {
        entities_per_task: 1,
        batch_process_limit: 1,
        ..settings(10)
    };
    let store = MemoryStore::new();
    let mut worker = memory_worker(&store, site_from_json(SCENARIO_A), settings).await;

    let outcome = worker.resume_or_start(GenerationBudget::Limited).await.unwrap();
    assert_eq!(outcome.progress().processed, 1);
    assert_eq!(outcome.progress().total, 2);
    assert_eq!(outcome.progress().percent(), 50);

    let run = RunStateStore::load(&store).await.unwrap().unwrap();
    assert!(!run.in_progress);
    let stash = run.stash.unwrap();
    assert_eq!(stash.results.len(), 1);
    assert!(stash.processed_paths.contains("/a"));

    let outcome = worker.resume_or_start(GenerationBudget::Limited).await.unwrap();
    assert!(matches!(outcome, PassOutcome::Suspended(_)));
    let outcome = worker.resume_or_start(GenerationBudget::Limited).await.unwrap();
    assert!(outcome.is_completed());
    assert_eq!(parse_urlset(&published(&store, "default").await[0].content).unwrap().len(), 2);
}

/// Chunk store whose `stage` can be made to fail.
struct FlakyChunks {
    inner: MemoryStore,
    fail: AtomicBool,
}

#[async_trait]
impl ChunkStore for FlakyChunks {
    async fn stage(&self, variant: &VariantName, delta: i32, content: &str) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Storage("disk full".to_string()));
        }
        self.inner.stage(variant, delta, content).await
    }

    async fn staged(&self, variant: &VariantName) -> Result<Vec<SitemapChunk>> {
        self.inner.staged(variant).await
    }

    async fn publish(&self, variant: &VariantName) -> Result<bool> {
        self.inner.publish(variant).await
    }

    async fn purge_staged(&self) -> Result<()> {
        self.inner.purge_staged().await
    }

    async fn remove_variants(&self, variants: &[VariantName]) -> Result<()> {
        self.inner.remove_variants(variants).await
    }

    async fn published(&self, variant: &VariantName) -> Result<Vec<SitemapChunk>> {
        self.inner.published(variant).await
    }

    async fn published_chunk(&self, variant: &VariantName, delta: i32) -> Result<Option<SitemapChunk>> {
        self.inner.published_chunk(variant, delta).await
    }
}

#[tokio::test]
async fn test_failed_staging_keeps_published_set() {
    let store = MemoryStore::new();
    let mut worker = memory_worker(&store, site_from_json(&pages_manifest(4)), settings(2)).await;
    worker.resume_or_start(GenerationBudget::Unbounded).await.unwrap();
    let before = published(&store, "default").await;
    assert_eq!(deltas(&before), vec![0, 1, 2]);

    let flaky = Arc::new(FlakyChunks {
        inner: store.clone(),
        fail: AtomicBool::new(true),
    });
    let mut stores = Stores::from_store(store.clone());
    stores.chunks = flaky.clone();
    let registry = VariantRegistry::new(stores.clone(), SitemapTypeRegistry::builtin());
    let mut flaky_worker = QueueWorker::new(stores, site_from_json(&pages_manifest(6)), registry);

    let result = flaky_worker.resume_or_start(GenerationBudget::Unbounded).await;
    assert!(matches!(result, Err(Error::Storage(_))));
    assert_eq!(published(&store, "default").await, before);

    // the dead pass left its run marked in progress: the next one starts over
    assert!(RunStateStore::load(&store).await.unwrap().unwrap().in_progress);
    flaky.fail.store(false, Ordering::SeqCst);
    let outcome = flaky_worker.resume_or_start(GenerationBudget::Unbounded).await.unwrap();
    assert!(outcome.is_completed());
    assert_eq!(deltas(&published(&store, "default").await), vec![0, 1, 2, 3]);
}

#[tokio::test]
async fn test_suspended_pass_keeps_published_set() {
    let store = MemoryStore::new();
    let mut worker = memory_worker(&store, site_from_json(&pages_manifest(4)), settings(1)).await;
    worker.resume_or_start(GenerationBudget::Unbounded).await.unwrap();
    let before = published(&store, "default").await;

    let limited = Settings {
        entities_per_task: 1,
        batch_process_limit: 1,
        ..settings(1)
    };
    Stores::from_store(store.clone()).settings.save(&limited).await.unwrap();
    let outcome = worker.resume_or_start(GenerationBudget::Limited).await.unwrap();
    assert!(matches!(outcome, PassOutcome::Suspended(_)));

    // a staged chunk exists but nothing was swapped in
    assert_eq!(store.staged(&name("default")).await.unwrap().len(), 1);
    assert_eq!(published(&store, "default").await, before);
}

#[tokio::test]
async fn test_poison_task_is_dropped_and_pass_continues() {
    let store = MemoryStore::new();
    let mut worker = memory_worker(&store, site_from_json(SCENARIO_A), settings(10)).await;

    let mut poison = entity_task("default", &[]);
    poison.data_set = DataSet::Menu {
        menu: MenuSettings {
            menu: "main".to_string(),
            priority: None,
            changefreq: None,
        },
    };
    TaskQueue::enqueue(&store, vec![poison, entity_task("default", &["1", "2"])])
        .await
        .unwrap();

    let outcome = worker.resume_or_start(GenerationBudget::Unbounded).await.unwrap();
    assert!(outcome.is_completed());
    assert_eq!(outcome.progress().processed, 2);
    assert_eq!(TaskQueue::count(&store).await.unwrap(), 0);
    assert_eq!(parse_urlset(&published(&store, "default").await[0].content).unwrap().len(), 2);
}

#[tokio::test]
async fn test_task_of_already_published_variant_does_not_replace_its_sitemap() {
    let store = MemoryStore::new();
    let mut worker = memory_worker(&store, site_from_json(SAMPLE_MANIFEST), settings(10)).await;
    worker.rebuild_queue().await.unwrap();
    // a straggler of `default` behind another variant's work
    worker
        .stores()
        .queue
        .enqueue(vec![entity_task("news", &["1"]), entity_task("default", &["2"])])
        .await
        .unwrap();

    let outcome = worker.resume_or_start(GenerationBudget::Unbounded).await.unwrap();
    assert!(outcome.is_completed());
    assert_eq!(TaskQueue::count(&store).await.unwrap(), 0);

    let urls = parse_urlset(&published(&store, "default").await[0].content).unwrap();
    assert_eq!(urls.len(), 3);
    let news = parse_urlset(&published(&store, "news").await[0].content).unwrap();
    assert_eq!(news[0].loc, "https://example.com/a");
}

#[tokio::test]
async fn test_crashed_pass_is_rebuilt() {
    let store = MemoryStore::new();
    let mut worker = memory_worker(&store, site_from_json(SCENARIO_A), settings(10)).await;

    // only one of two tasks left and no stash of the records the dead process accumulated
    TaskQueue::enqueue(&store, vec![entity_task("default", &["2"])]).await.unwrap();
    let mut run = RunState::new(2);
    run.processed_task_count = 1;
    run.in_progress = true;
    RunStateStore::save(&store, &run).await.unwrap();

    worker.resume_or_start(GenerationBudget::Unbounded).await.unwrap();
    let urls = parse_urlset(&published(&store, "default").await[0].content).unwrap();
    assert_eq!(urls.len(), 2);
}

#[tokio::test]
async fn test_unknown_sitemap_type_aborts_rebuild() {
    let store = MemoryStore::new();
    let mut worker = memory_worker(&store, site_from_json(SCENARIO_A), settings(10)).await;
    worker.resume_or_start(GenerationBudget::Unbounded).await.unwrap();
    let before = published(&store, "default").await;

    let stores = Stores::from_store(store.clone());
    stores.variants.save(&variant("broken", "no_such_type", 5)).await.unwrap();
    TaskQueue::enqueue(&store, vec![entity_task("default", &["1"])]).await.unwrap();

    assert!(matches!(worker.rebuild_queue().await, Err(Error::UnknownSitemapType(_))));
    assert_eq!(worker.state(), WorkerState::Idle);
    assert_eq!(TaskQueue::count(&store).await.unwrap(), 1);
    assert_eq!(published(&store, "default").await, before);
}

#[tokio::test]
async fn test_variants_are_published_in_weight_order_with_index() {
    let manifest = r#"{
      "base_url": "https://example.com",
      "entities": [
        {"entity_type": "node", "bundle": "page", "id": "1", "path": "/a"},
        {"entity_type": "node", "bundle": "article", "id": "2", "path": "/news/1"}
      ],
      "variants": {
        "default": {"bundles": [{"entity_type": "node", "bundle": "page"}]},
        "news": {"bundles": [{"entity_type": "node", "bundle": "article"}, {"entity_type": "node", "bundle": "page"}]}
      }
    }"#;
    let store = MemoryStore::new();
    let mut worker = memory_worker(&store, site_from_json(manifest), settings(10)).await;
    let stores = Stores::from_store(store.clone());
    stores.variants.save(&variant("news", DEFAULT_HREFLANG, 1)).await.unwrap();
    stores.variants.save(&variant("all", INDEX, 10)).await.unwrap();

    let queued = worker.rebuild_queue().await.unwrap();
    assert_eq!(queued, 4);
    assert!(worker.resume_or_start(GenerationBudget::Unbounded).await.unwrap().is_completed());

    // dedup is per variant: /a is in both
    let default = parse_urlset(&published(&store, "default").await[0].content).unwrap();
    let news = parse_urlset(&published(&store, "news").await[0].content).unwrap();
    assert_eq!(default.len(), 1);
    assert_eq!(news.len(), 2);
    assert!(news.iter().any(|u| u.loc == "https://example.com/a"));

    let index = parse_sitemapindex(&published(&store, "all").await[0].content).unwrap();
    let locs = index.iter().map(|(loc, _)| loc.as_str()).collect::<Vec<_>>();
    assert_eq!(
        locs,
        vec!["https://example.com/sitemap.xml", "https://example.com/news/sitemap.xml"]
    );
}

#[tokio::test]
async fn test_variant_without_links_keeps_previous_sitemap() {
    let store = MemoryStore::new();
    let mut worker = memory_worker(&store, site_from_json(SCENARIO_A), settings(10)).await;
    worker.resume_or_start(GenerationBudget::Unbounded).await.unwrap();
    let before = published(&store, "default").await;

    let empty = r#"{"base_url": "https://example.com", "paths": [{"path": "/gone-soon"}],
                    "variants": {"default": {"custom_links": [{"path": "/missing"}]}}}"#;
    let mut worker = memory_worker(&store, site_from_json(empty), settings(10)).await;
    assert!(worker.resume_or_start(GenerationBudget::Unbounded).await.unwrap().is_completed());
    assert_eq!(published(&store, "default").await, before);
}

#[test]
fn test_progress_is_capped_until_published() {
    let unpublished = Progress {
        processed: 10,
        total: 10,
        published: false,
    };
    assert_eq!(unpublished.percent(), 99);
    let done = Progress {
        published: true,
        ..unpublished
    };
    assert_eq!(done.percent(), 100);
    assert_eq!(
        Progress {
            processed: 1,
            total: 3,
            published: false
        }
        .percent(),
        33
    );
}
