//! Interfaces to everything the pipeline does not own: the content store, routing and access
//! checks, link configuration and extension hooks.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::models::{ChangeFrequency, EntityRef, ImageRef, Priority, UrlRecord, VariantName};

/// Language code of content that is not in any particular language.
pub const LANGUAGE_UNDEFINED: &str = "und";
/// Language code of content for which language does not apply.
pub const LANGUAGE_NOT_APPLICABLE: &str = "zxx";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Language {
    pub id: String,
    #[serde(default)]
    pub is_default: bool,
}

/// What the entity provider knows about one object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityData {
    pub entity_type: String,
    pub id: String,
    /// Canonical site-relative path.
    pub path: String,
    #[serde(default)]
    pub changed: Option<DateTime<Utc>>,
    /// Languages the object is translated into.
    #[serde(default)]
    pub translations: BTreeSet<String>,
    /// Anonymous users may view it.
    #[serde(default = "default_true")]
    pub public: bool,
    #[serde(default)]
    pub images: Vec<ImageRef>,
}

fn default_true() -> bool {
    true
}

impl EntityData {
    pub fn entity_ref(&self) -> EntityRef {
        EntityRef {
            entity_type: self.entity_type.clone(),
            id: self.id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    /// Canonical internal path.
    pub path: String,
    /// The object the path routes to, if any.
    pub entity: Option<EntityRef>,
    pub accessible: bool,
}

/// Supplies candidate objects, per bundle, and their link-relevant data.
#[async_trait]
pub trait EntityProvider: Send + Sync {
    /// Languages of the site, default language included.
    async fn languages(&self) -> Result<Vec<Language>>;

    /// Ordered page of the ids of every object of a bundle.
    async fn entity_ids(&self, entity_type: &str, bundle: &str, offset: usize, limit: usize) -> Result<Vec<String>>;

    /// None when the object no longer exists.
    async fn load(&self, entity_type: &str, id: &str) -> Result<Option<EntityData>>;
}

/// Validates input paths and builds absolute, language specific URLs.
#[async_trait]
pub trait PathResolver: Send + Sync {
    /// The site's own base URL, used unless settings override it.
    fn base_url(&self) -> String;

    /// None when the path does not route anywhere.
    async fn resolve(&self, path: &str) -> Result<Option<ResolvedPath>>;

    /// Site-relative path of a language's version of `path`.
    /// The default language keeps the path, others get a language prefix.
    fn localize(&self, path: &str, language: &Language) -> String {
        if language.is_default {
            path.to_string()
        } else if path == "/" {
            format!("/{}", language.id)
        } else {
            format!("/{}{}", language.id, path)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleSettings {
    pub entity_type: String,
    pub bundle: String,
    #[serde(default = "default_true")]
    pub index: bool,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub changefreq: Option<ChangeFrequency>,
    #[serde(default)]
    pub include_images: bool,
}

/// Per-object override of its bundle's settings.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EntityOverride {
    #[serde(default)]
    pub exclude: bool,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub changefreq: Option<ChangeFrequency>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomLink {
    pub path: String,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub changefreq: Option<ChangeFrequency>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuSettings {
    pub menu: String,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub changefreq: Option<ChangeFrequency>,
}

/// A node of a menu tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuLink {
    pub title: String,
    /// Site-relative path, or an absolute external URL.
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub children: Vec<MenuLink>,
}

/// A link supplied by an extension, emitted as given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArbitraryLink {
    pub url: String,
    /// Dedup key. Links without one are malformed.
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub lastmod: Option<DateTime<Utc>>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub changefreq: Option<ChangeFrequency>,
    #[serde(default)]
    pub images: Vec<ImageRef>,
    #[serde(default)]
    pub alternate_urls: BTreeMap<String, String>,
}

/// Which bundles, objects, paths and menus each variant indexes.
#[async_trait]
pub trait LinkConfig: Send + Sync {
    async fn bundle_settings(&self, variant: &VariantName) -> Result<Vec<BundleSettings>>;

    async fn entity_override(
        &self,
        variant: &VariantName,
        entity_type: &str,
        id: &str,
    ) -> Result<Option<EntityOverride>>;

    async fn custom_links(&self, variant: &VariantName) -> Result<Vec<CustomLink>>;

    async fn menu_settings(&self, variant: &VariantName) -> Result<Vec<MenuSettings>>;

    async fn menu_links(&self, menu: &str) -> Result<Vec<MenuLink>>;
}

/// Extension points. Every method defaults to doing nothing.
#[async_trait]
pub trait SitemapHooks: Send + Sync {
    /// Extra links to add to a variant.
    async fn arbitrary_links(&self, _variant: &VariantName) -> Result<Vec<ArbitraryLink>> {
        Ok(Vec::new())
    }

    /// Rewrite the records a data set produced, before they are validated and accumulated.
    fn alter_links(&self, _variant: &VariantName, _records: &mut Vec<UrlRecord>) {}

    /// Attributes of the `<urlset>` root element.
    fn alter_urlset_attributes(&self, _variant: &VariantName, _attributes: &mut BTreeMap<String, String>) {}

    /// Attributes of the `<sitemapindex>` root element.
    fn alter_index_attributes(&self, _variant: &VariantName, _attributes: &mut BTreeMap<String, String>) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl SitemapHooks for NoHooks {}

/// Every collaborator a generation pass talks to.
#[derive(Clone)]
pub struct Site {
    pub entities: Arc<dyn EntityProvider>,
    pub paths: Arc<dyn PathResolver>,
    pub config: Arc<dyn LinkConfig>,
    pub hooks: Arc<dyn SitemapHooks>,
}

impl Site {
    pub fn new(
        entities: Arc<dyn EntityProvider>,
        paths: Arc<dyn PathResolver>,
        config: Arc<dyn LinkConfig>,
        hooks: Arc<dyn SitemapHooks>,
    ) -> Self {
        Site {
            entities,
            paths,
            config,
            hooks,
        }
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn SitemapHooks>) -> Self {
        self.hooks = hooks;
        self
    }
}
