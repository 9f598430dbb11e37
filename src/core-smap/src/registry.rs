//! Sitemap types (what a variant renders and which generators feed it) and the variants
//! configured on top of them.

use std::collections::BTreeMap;

use tracing::info;

use crate::document::DocumentGeneratorKind;
use crate::errors::{Error, Result};
use crate::links::LinkGeneratorKind;
use crate::models::{Variant, VariantName};
use crate::store::Stores;

pub const DEFAULT_HREFLANG: &str = "default_hreflang";
pub const INDEX: &str = "index";

/// A fixed pairing of one document generator and an ordered list of link generators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitemapType {
    pub id: String,
    pub label: String,
    pub document: DocumentGeneratorKind,
    /// Enqueue order within a variant.
    pub link_generators: Vec<LinkGeneratorKind>,
    pub enabled_by_default: bool,
}

/// Static registry of sitemap types, keyed by id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitemapTypeRegistry {
    types: BTreeMap<String, SitemapType>,
}

impl SitemapTypeRegistry {
    pub fn empty() -> Self {
        SitemapTypeRegistry { types: BTreeMap::new() }
    }

    /// The built-in types: `default_hreflang` pages and an `index` of other variants.
    pub fn builtin() -> Self {
        SitemapTypeRegistry::empty()
            .with(SitemapType {
                id: DEFAULT_HREFLANG.to_string(),
                label: "Default hreflang".to_string(),
                document: DocumentGeneratorKind::Default,
                link_generators: vec![
                    LinkGeneratorKind::CustomPath,
                    LinkGeneratorKind::Entity,
                    LinkGeneratorKind::MenuLink,
                    LinkGeneratorKind::Arbitrary,
                ],
                enabled_by_default: true,
            })
            .with(SitemapType {
                id: INDEX.to_string(),
                label: "Sitemap index".to_string(),
                document: DocumentGeneratorKind::Index,
                link_generators: vec![LinkGeneratorKind::VariantIndex],
                enabled_by_default: false,
            })
    }

    pub fn with(mut self, sitemap_type: SitemapType) -> Self {
        self.types.insert(sitemap_type.id.clone(), sitemap_type);
        self
    }

    pub fn get(&self, id: &str) -> Option<&SitemapType> {
        self.types.get(id)
    }

    pub fn get_sitemap_type(&self, id: &str) -> Result<&SitemapType> {
        self.get(id).ok_or_else(|| Error::UnknownSitemapType(id.to_string()))
    }

    pub fn types(&self) -> impl Iterator<Item = &SitemapType> {
        self.types.values()
    }
}

impl Default for SitemapTypeRegistry {
    fn default() -> Self {
        SitemapTypeRegistry::builtin()
    }
}

/// Adds, lists and removes variants. Removal cascades through queue, chunks, settings and
/// run state.
pub struct VariantRegistry {
    stores: Stores,
    types: SitemapTypeRegistry,
}

impl VariantRegistry {
    pub fn new(stores: Stores, types: SitemapTypeRegistry) -> Self {
        VariantRegistry { stores, types }
    }

    pub fn types(&self) -> &SitemapTypeRegistry {
        &self.types
    }

    /// Every variant, ordered by weight then name.
    pub async fn get_variants(&self) -> Result<Vec<Variant>> {
        let mut variants = self.stores.variants.list().await?;
        variants.sort_by(|a, b| a.weight.cmp(&b.weight).then_with(|| a.name.cmp(&b.name)));
        Ok(variants)
    }

    pub async fn get_variant(&self, name: &VariantName) -> Result<Variant> {
        self.stores
            .variants
            .get(name)
            .await?
            .ok_or_else(|| Error::UnknownVariant(name.to_string()))
    }

    pub fn get_sitemap_type(&self, id: &str) -> Result<&SitemapType> {
        self.types.get_sitemap_type(id)
    }

    /// Creates or replaces a variant. The name must be a valid token and the type registered.
    pub async fn add_variant(&self, name: &str, sitemap_type: &str, label: Option<&str>, weight: i32) -> Result<Variant> {
        let name = VariantName::new(name)?;
        let sitemap_type = self.types.get_sitemap_type(sitemap_type)?;
        let variant = Variant {
            label: label.map(String::from).unwrap_or_else(|| name.to_string()),
            name,
            sitemap_type: sitemap_type.id.clone(),
            weight,
            enabled: sitemap_type.enabled_by_default,
        };
        self.stores.variants.save(&variant).await?;
        info!("Saved variant {} ({})", variant.name, variant.sitemap_type);
        Ok(variant)
    }

    /// Turns generation of a variant on or off. Published chunks stay servable either way.
    pub async fn set_enabled(&self, name: &str, enabled: bool) -> Result<Variant> {
        let mut variant = self.get_variant(&VariantName::new(name)?).await?;
        variant.enabled = enabled;
        self.stores.variants.save(&variant).await?;
        info!("Variant {} is now {}", variant.name, if enabled { "enabled" } else { "disabled" });
        Ok(variant)
    }

    /// Deletes a variant with its queued tasks, its chunks and every setting pointing at it.
    pub async fn remove_variant(&self, name: &str) -> Result<()> {
        let name = VariantName::new(name)?;
        if self.stores.variants.get(&name).await?.is_none() {
            return Err(Error::UnknownVariant(name.to_string()));
        }
        let names = std::slice::from_ref(&name);

        let purged = self.stores.queue.purge_variants(names).await?;
        self.stores.chunks.remove_variants(names).await?;

        let settings = self.stores.settings.load().await?;
        if let Some(mut settings) = settings.filter(|s| s.default_variant.as_ref() == Some(&name)) {
            settings.default_variant = None;
            self.stores.settings.save(&settings).await?;
        }

        let state = self.stores.run_state.load().await?;
        if let Some(mut state) = state.filter(|s| s.stash.as_ref().is_some_and(|stash| stash.variant == name)) {
            state.stash = None;
            self.stores.run_state.save(&state).await?;
        }

        self.stores.variants.delete(&name).await?;
        info!("Removed variant {} and {} queued tasks", name, purged);
        Ok(())
    }
}
