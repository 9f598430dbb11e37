//! Fixtures shared by the tests of this crate and of the crates depending on it
//! (enable the `test-helpers` feature).

use std::collections::{BTreeMap, BTreeSet};

use quick_xml::Reader;
use quick_xml::events::Event;

use crate::document::DocumentGeneratorKind;
use crate::links::{DataSet, GenerationContext, LinkGeneratorKind};
use crate::models::{NewTask, UrlRecord, Variant, VariantName};
use crate::registry::{DEFAULT_HREFLANG, SitemapTypeRegistry, VariantRegistry};
use crate::settings::Settings;
use crate::site::{BundleSettings, Language, Site};
use crate::static_site::StaticSite;
use crate::store::{MemoryStore, Stores};
use crate::worker::QueueWorker;

pub const BASE_URL: &str = "https://example.com";

/// Two pages (`/a` at 0.5, `/b` at 0.9), a custom `/contact` link and a custom link that
/// duplicates page `/a`, in one language.
pub const SAMPLE_MANIFEST: &str = r#"{
  "base_url": "https://example.com",
  "languages": [{"id": "en", "is_default": true}],
  "entities": [
    {"entity_type": "node", "bundle": "page", "id": "1", "path": "/a", "changed": "2024-01-01T00:00:00Z"},
    {"entity_type": "node", "bundle": "page", "id": "2", "path": "/b", "changed": "2024-01-02T00:00:00Z"}
  ],
  "paths": [{"path": "/contact"}],
  "variants": {
    "default": {
      "bundles": [{"entity_type": "node", "bundle": "page"}],
      "overrides": [
        {"entity_type": "node", "id": "1", "priority": "0.5"},
        {"entity_type": "node", "id": "2", "priority": "0.9"}
      ],
      "custom_links": [{"path": "/contact"}, {"path": "/a"}]
    }
  }
}"#;

pub fn sample_site() -> Site {
    site_from_json(SAMPLE_MANIFEST)
}

pub fn site_from_json(json: &str) -> Site {
    StaticSite::from_json(json).expect("valid test manifest").into_site()
}

pub fn name(variant: &str) -> VariantName {
    VariantName::new(variant).expect("valid test variant name")
}

/// A bare record of the default example site.
pub fn record(path: &str, language: &str) -> UrlRecord {
    let url = format!("{}{}", BASE_URL, path);
    UrlRecord {
        path: path.to_string(),
        language: language.to_string(),
        alternate_urls: BTreeMap::from([(language.to_string(), url.clone())]),
        url,
        lastmod: None,
        priority: None,
        changefreq: None,
        images: Vec::new(),
        entity: None,
    }
}

/// An entity task of `node:page` ids.
pub fn entity_task(variant: &str, ids: &[&str]) -> NewTask {
    NewTask {
        variant: name(variant),
        generator: LinkGeneratorKind::Entity,
        document: DocumentGeneratorKind::Default,
        data_set: DataSet::EntityBatch {
            bundle: BundleSettings {
                entity_type: "node".to_string(),
                bundle: "page".to_string(),
                index: true,
                priority: None,
                changefreq: None,
                include_images: false,
            },
            ids: ids.iter().map(|id| id.to_string()).collect(),
        },
    }
}

pub fn variant(variant: &str, sitemap_type: &str, weight: i32) -> Variant {
    Variant {
        name: name(variant),
        label: variant.to_string(),
        sitemap_type: sitemap_type.to_string(),
        weight,
        enabled: true,
    }
}

/// Saves settings and a `default` variant, then builds a worker over the store.
pub async fn memory_worker(store: &MemoryStore, site: Site, settings: Settings) -> QueueWorker {
    let stores = Stores::from_store(store.clone());
    stores.settings.save(&settings).await.expect("save settings");
    if stores.variants.list().await.expect("list variants").is_empty() {
        stores
            .variants
            .save(&variant("default", DEFAULT_HREFLANG, 0))
            .await
            .expect("save variant");
    }
    let registry = VariantRegistry::new(stores.clone(), SitemapTypeRegistry::builtin());
    QueueWorker::new(stores, site, registry)
}

/// Owns everything a [`GenerationContext`] borrows.
pub struct ContextFixture {
    pub settings: Settings,
    pub variant: VariantName,
    pub variants: Vec<Variant>,
    pub store: MemoryStore,
    pub site: Site,
    pub registry: SitemapTypeRegistry,
    pub languages: Vec<Language>,
    pub base_url: String,
    pub seen_paths: BTreeSet<String>,
}

impl ContextFixture {
    /// A site on `https://example.com` with these languages, the first one default.
    pub fn new(languages: &[&str]) -> Self {
        let languages = languages
            .iter()
            .enumerate()
            .map(|(i, id)| serde_json::json!({"id": id, "is_default": i == 0}))
            .collect::<Vec<_>>();
        let manifest = serde_json::json!({"base_url": BASE_URL, "languages": languages});
        ContextFixture::from_manifest(&manifest.to_string())
    }

    pub fn from_manifest(json: &str) -> Self {
        let static_site = StaticSite::from_json(json).expect("valid test manifest");
        let languages = static_site.manifest().languages.clone();
        let base_url = static_site.manifest().base_url.clone();
        ContextFixture {
            settings: Settings::default(),
            variant: name("default"),
            variants: vec![variant("default", DEFAULT_HREFLANG, 0)],
            store: MemoryStore::new(),
            site: static_site.into_site(),
            registry: SitemapTypeRegistry::builtin(),
            languages,
            base_url,
            seen_paths: BTreeSet::new(),
        }
    }

    pub fn context(&self) -> GenerationContext<'_> {
        GenerationContext {
            settings: &self.settings,
            variant: &self.variant,
            base_url: self.settings.base_url.as_deref().unwrap_or(&self.base_url),
            languages: &self.languages,
            site: &self.site,
            chunks: &self.store,
            registry: &self.registry,
            variants: &self.variants,
            seen_paths: &self.seen_paths,
        }
    }
}

/// One `<url>` of a parsed `<urlset>`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedUrl {
    pub loc: String,
    pub lastmod: Option<String>,
    pub changefreq: Option<String>,
    pub priority: Option<String>,
    /// (hreflang, href) of every `xhtml:link`.
    pub alternates: Vec<(String, String)>,
    pub images: Vec<String>,
}

/// Parses the `<url>` entries of a sitemap chunk.
pub fn parse_urlset(xml: &str) -> Result<Vec<ParsedUrl>, String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut urls = Vec::new();
    let mut current: Option<ParsedUrl> = None;
    let mut element = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                element = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if element == "url" {
                    current = Some(ParsedUrl::default());
                }
            }
            Ok(Event::Empty(e)) => {
                if e.name().as_ref() == b"xhtml:link" {
                    let mut hreflang = String::new();
                    let mut href = String::new();
                    for attr in e.attributes() {
                        let attr = attr.map_err(|e| e.to_string())?;
                        let value = attr.unescape_value().map_err(|e| e.to_string())?.to_string();
                        match attr.key.as_ref() {
                            b"hreflang" => hreflang = value,
                            b"href" => href = value,
                            _ => {}
                        }
                    }
                    if let Some(url) = current.as_mut() {
                        url.alternates.push((hreflang, href));
                    }
                }
            }
            Ok(Event::Text(text)) => {
                let text = text.unescape().map_err(|e| e.to_string())?.to_string();
                if let Some(url) = current.as_mut() {
                    match element.as_str() {
                        "loc" => url.loc = text,
                        "lastmod" => url.lastmod = Some(text),
                        "changefreq" => url.changefreq = Some(text),
                        "priority" => url.priority = Some(text),
                        "image:loc" => url.images.push(text),
                        _ => {}
                    }
                }
            }
            Ok(Event::End(e)) => {
                if e.name().as_ref() == b"url" {
                    if let Some(url) = current.take() {
                        urls.push(url);
                    }
                }
                element.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(format!("XML parsing error at {}: {}", reader.buffer_position(), e)),
            _ => {}
        }
    }
    Ok(urls)
}

/// Parses the (loc, lastmod) entries of a `<sitemapindex>`.
pub fn parse_sitemapindex(xml: &str) -> Result<Vec<(String, Option<String>)>, String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut current: Option<(String, Option<String>)> = None;
    let mut element = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                element = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if element == "sitemap" {
                    current = Some((String::new(), None));
                }
            }
            Ok(Event::Text(text)) => {
                let text = text.unescape().map_err(|e| e.to_string())?.to_string();
                if let Some((loc, lastmod)) = current.as_mut() {
                    match element.as_str() {
                        "loc" => *loc = text,
                        "lastmod" => *lastmod = Some(text),
                        _ => {}
                    }
                }
            }
            Ok(Event::End(e)) => {
                if e.name().as_ref() == b"sitemap" {
                    if let Some(entry) = current.take() {
                        entries.push(entry);
                    }
                }
                element.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(format!("XML parsing error at {}: {}", reader.buffer_position(), e)),
            _ => {}
        }
    }
    Ok(entries)
}
