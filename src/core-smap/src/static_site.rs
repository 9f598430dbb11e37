//! A site described by a JSON manifest.
//!
//! Implements every collaborator of [`Site`] from one document, so a sitemap can be built for
//! content that lives outside any CMS (static site generators, exports, fixtures).
//!
//! ```json
//! {
//!   "base_url": "https://example.com",
//!   "languages": [{"id": "en", "is_default": true}, {"id": "de"}],
//!   "entities": [{"entity_type": "node", "bundle": "page", "id": "1", "path": "/about"}],
//!   "paths": [{"path": "/contact"}],
//!   "variants": {
//!     "default": {
//!       "bundles": [{"entity_type": "node", "bundle": "page", "priority": "0.5"}],
//!       "custom_links": [{"path": "/contact"}],
//!       "menus": [{"menu": "main"}]
//!     }
//!   },
//!   "menus": {"main": [{"title": "About", "path": "/about"}]}
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::models::VariantName;
use crate::site::{
    ArbitraryLink, BundleSettings, CustomLink, EntityData, EntityOverride, EntityProvider, Language, LinkConfig,
    MenuLink, MenuSettings, PathResolver, ResolvedPath, Site, SitemapHooks,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntity {
    pub bundle: String,
    #[serde(flatten)]
    pub data: EntityData,
}

/// A routable path that is not backed by an object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestPath {
    pub path: String,
    #[serde(default = "accessible")]
    pub accessible: bool,
}

fn accessible() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestOverride {
    pub entity_type: String,
    pub id: String,
    #[serde(flatten)]
    pub settings: EntityOverride,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VariantConfig {
    pub bundles: Vec<BundleSettings>,
    pub overrides: Vec<ManifestOverride>,
    pub custom_links: Vec<CustomLink>,
    pub menus: Vec<MenuSettings>,
    pub arbitrary_links: Vec<ArbitraryLink>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteManifest {
    pub base_url: String,
    pub languages: Vec<Language>,
    pub entities: Vec<ManifestEntity>,
    pub paths: Vec<ManifestPath>,
    pub variants: BTreeMap<String, VariantConfig>,
    pub menus: BTreeMap<String, Vec<MenuLink>>,
}

#[derive(Debug, Clone)]
pub struct StaticSite {
    manifest: SiteManifest,
}

impl StaticSite {
    pub fn new(mut manifest: SiteManifest) -> Self {
        if manifest.languages.is_empty() {
            manifest.languages.push(Language {
                id: "en".to_string(),
                is_default: true,
            });
        } else if !manifest.languages.iter().any(|l| l.is_default) {
            manifest.languages[0].is_default = true;
        }
        while manifest.base_url.ends_with('/') {
            manifest.base_url.pop();
        }
        StaticSite { manifest }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(StaticSite::new(serde_json::from_str(json)?))
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        StaticSite::from_json(&contents)
    }

    pub fn manifest(&self) -> &SiteManifest {
        &self.manifest
    }

    /// Uses this one manifest for every collaborator.
    pub fn into_site(self) -> Site {
        let shared = Arc::new(self);
        Site::new(shared.clone(), shared.clone(), shared.clone(), shared)
    }

    fn variant(&self, variant: &VariantName) -> Option<&VariantConfig> {
        self.manifest.variants.get(variant.as_str())
    }

    fn find_entity(&self, entity_type: &str, id: &str) -> Option<&EntityData> {
        self.manifest
            .entities
            .iter()
            .map(|e| &e.data)
            .find(|e| e.entity_type == entity_type && e.id == id)
    }
}

/// Drops query string and fragment, keeps the leading slash, drops any trailing one.
fn normalize(path: &str) -> String {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    let trimmed = path[..end].trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

#[async_trait]
impl EntityProvider for StaticSite {
    async fn languages(&self) -> Result<Vec<Language>> {
        Ok(self.manifest.languages.clone())
    }

    async fn entity_ids(&self, entity_type: &str, bundle: &str, offset: usize, limit: usize) -> Result<Vec<String>> {
        Ok(self
            .manifest
            .entities
            .iter()
            .filter(|e| e.data.entity_type == entity_type && e.bundle == bundle)
            .skip(offset)
            .take(limit)
            .map(|e| e.data.id.clone())
            .collect())
    }

    async fn load(&self, entity_type: &str, id: &str) -> Result<Option<EntityData>> {
        Ok(self.find_entity(entity_type, id).cloned())
    }
}

#[async_trait]
impl PathResolver for StaticSite {
    fn base_url(&self) -> String {
        self.manifest.base_url.clone()
    }

    async fn resolve(&self, path: &str) -> Result<Option<ResolvedPath>> {
        let path = normalize(path);

        let by_alias = self.manifest.entities.iter().map(|e| &e.data).find(|e| e.path == path);
        let by_route = || {
            let mut parts = path.trim_start_matches('/').splitn(2, '/');
            match (parts.next(), parts.next()) {
                (Some(entity_type), Some(id)) => self.find_entity(entity_type, id),
                _ => None,
            }
        };
        if let Some(entity) = by_alias.or_else(by_route) {
            return Ok(Some(ResolvedPath {
                path: entity.path.clone(),
                entity: Some(entity.entity_ref()),
                accessible: entity.public,
            }));
        }

        Ok(self
            .manifest
            .paths
            .iter()
            .find(|p| normalize(&p.path) == path)
            .map(|p| ResolvedPath {
                path: path.clone(),
                entity: None,
                accessible: p.accessible,
            }))
    }
}

#[async_trait]
impl LinkConfig for StaticSite {
    async fn bundle_settings(&self, variant: &VariantName) -> Result<Vec<BundleSettings>> {
        Ok(self.variant(variant).map(|v| v.bundles.clone()).unwrap_or_default())
    }

    async fn entity_override(
        &self,
        variant: &VariantName,
        entity_type: &str,
        id: &str,
    ) -> Result<Option<EntityOverride>> {
        Ok(self.variant(variant).and_then(|v| {
            v.overrides
                .iter()
                .find(|o| o.entity_type == entity_type && o.id == id)
                .map(|o| o.settings.clone())
        }))
    }

    async fn custom_links(&self, variant: &VariantName) -> Result<Vec<CustomLink>> {
        Ok(self.variant(variant).map(|v| v.custom_links.clone()).unwrap_or_default())
    }

    async fn menu_settings(&self, variant: &VariantName) -> Result<Vec<MenuSettings>> {
        Ok(self.variant(variant).map(|v| v.menus.clone()).unwrap_or_default())
    }

    async fn menu_links(&self, menu: &str) -> Result<Vec<MenuLink>> {
        Ok(self.manifest.menus.get(menu).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl SitemapHooks for StaticSite {
    async fn arbitrary_links(&self, variant: &VariantName) -> Result<Vec<ArbitraryLink>> {
        Ok(self.variant(variant).map(|v| v.arbitrary_links.clone()).unwrap_or_default())
    }
}
