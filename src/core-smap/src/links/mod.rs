//! Link generators turn one queued data set into localized URL records.
//!
//! Generators are a closed set of kinds. Each kind knows how to `enumerate` the data sets of a
//! variant (once per rebuild) and how to `process` one of them (once per claimed task). They
//! never touch queue, chunk or dedup state; the worker owns all of that.

pub mod arbitrary;
pub mod custom;
pub mod entity;
pub mod language;
pub mod menu;
pub mod variant_index;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};
use crate::models::{UrlRecord, Variant, VariantName};
use crate::registry::SitemapTypeRegistry;
use crate::settings::Settings;
use crate::site::{ArbitraryLink, BundleSettings, CustomLink, Language, MenuSettings, Site};
use crate::store::ChunkStore;

pub use arbitrary::ArbitraryGenerator;
pub use custom::CustomPathGenerator;
pub use entity::EntityGenerator;
pub use menu::MenuLinkGenerator;
pub use variant_index::VariantIndexGenerator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkGeneratorKind {
    Entity,
    CustomPath,
    Arbitrary,
    MenuLink,
    VariantIndex,
}

impl LinkGeneratorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkGeneratorKind::Entity => "entity",
            LinkGeneratorKind::CustomPath => "custom_path",
            LinkGeneratorKind::Arbitrary => "arbitrary",
            LinkGeneratorKind::MenuLink => "menu_link",
            LinkGeneratorKind::VariantIndex => "variant_index",
        }
    }
}

impl std::fmt::Display for LinkGeneratorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Payload of one task. Tagged so stored payloads say which generator they belong to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataSet {
    EntityBatch { bundle: BundleSettings, ids: Vec<String> },
    CustomPath { link: CustomLink },
    Arbitrary { links: Vec<ArbitraryLink> },
    Menu { menu: MenuSettings },
    VariantIndex { variants: Vec<VariantName> },
}

impl DataSet {
    /// Short human readable description for logs.
    pub fn describe(&self) -> String {
        match self {
            DataSet::EntityBatch { bundle, ids } => {
                format!("{} ids of {}:{}", ids.len(), bundle.entity_type, bundle.bundle)
            }
            DataSet::CustomPath { link } => format!("custom path {}", link.path),
            DataSet::Arbitrary { links } => format!("{} arbitrary links", links.len()),
            DataSet::Menu { menu } => format!("menu {}", menu.menu),
            DataSet::VariantIndex { variants } => format!("index of {} variants", variants.len()),
        }
    }
}

/// Everything a generator may read while enumerating or processing.
pub struct GenerationContext<'a> {
    pub settings: &'a Settings,
    pub variant: &'a VariantName,
    /// Base URL of every generated link, settings override already applied.
    pub base_url: &'a str,
    pub languages: &'a [Language],
    pub site: &'a Site,
    pub chunks: &'a dyn ChunkStore,
    pub registry: &'a SitemapTypeRegistry,
    /// All configured variants, enabled or not.
    pub variants: &'a [Variant],
    /// Paths already emitted for this variant by earlier data sets.
    pub seen_paths: &'a BTreeSet<String>,
}

impl GenerationContext<'_> {
    pub fn default_language(&self) -> Option<&Language> {
        self.languages.iter().find(|l| l.is_default).or(self.languages.first())
    }

    /// True when a path was already emitted for this variant and duplicates are being removed.
    pub fn path_seen(&self, path: &str) -> bool {
        self.settings.remove_duplicates && self.seen_paths.contains(path)
    }

    pub fn absolute_url(&self, site_relative_path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), site_relative_path)
    }

    pub fn is_default_variant(&self, variant: &VariantName) -> bool {
        self.settings.is_default_variant(variant)
    }
}

/// The registered link generators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkGenerator {
    Entity(EntityGenerator),
    CustomPath(CustomPathGenerator),
    Arbitrary(ArbitraryGenerator),
    MenuLink(MenuLinkGenerator),
    VariantIndex(VariantIndexGenerator),
}

impl From<LinkGeneratorKind> for LinkGenerator {
    fn from(kind: LinkGeneratorKind) -> Self {
        match kind {
            LinkGeneratorKind::Entity => LinkGenerator::Entity(EntityGenerator),
            LinkGeneratorKind::CustomPath => LinkGenerator::CustomPath(CustomPathGenerator),
            LinkGeneratorKind::Arbitrary => LinkGenerator::Arbitrary(ArbitraryGenerator),
            LinkGeneratorKind::MenuLink => LinkGenerator::MenuLink(MenuLinkGenerator),
            LinkGeneratorKind::VariantIndex => LinkGenerator::VariantIndex(VariantIndexGenerator),
        }
    }
}

impl LinkGenerator {
    pub fn kind(&self) -> LinkGeneratorKind {
        match self {
            LinkGenerator::Entity(_) => LinkGeneratorKind::Entity,
            LinkGenerator::CustomPath(_) => LinkGeneratorKind::CustomPath,
            LinkGenerator::Arbitrary(_) => LinkGeneratorKind::Arbitrary,
            LinkGenerator::MenuLink(_) => LinkGeneratorKind::MenuLink,
            LinkGenerator::VariantIndex(_) => LinkGeneratorKind::VariantIndex,
        }
    }

    /// The data sets this generator contributes to the context's variant.
    pub async fn enumerate(&self, ctx: &GenerationContext<'_>) -> Result<Vec<DataSet>> {
        match self {
            LinkGenerator::Entity(g) => g.enumerate(ctx).await,
            LinkGenerator::CustomPath(g) => g.enumerate(ctx).await,
            LinkGenerator::Arbitrary(g) => g.enumerate(ctx).await,
            LinkGenerator::MenuLink(g) => g.enumerate(ctx).await,
            LinkGenerator::VariantIndex(g) => g.enumerate(ctx).await,
        }
    }

    /// Records of one data set, after the `alter_links` hook.
    /// Fails the whole data set when a record lacks a path.
    pub async fn process(&self, data_set: &DataSet, ctx: &GenerationContext<'_>) -> Result<Vec<UrlRecord>> {
        let mut records = match (self, data_set) {
            (LinkGenerator::Entity(g), DataSet::EntityBatch { bundle, ids }) => g.process(bundle, ids, ctx).await?,
            (LinkGenerator::CustomPath(g), DataSet::CustomPath { link }) => g.process(link, ctx).await?,
            (LinkGenerator::Arbitrary(g), DataSet::Arbitrary { links }) => g.process(links, ctx)?,
            (LinkGenerator::MenuLink(g), DataSet::Menu { menu }) => g.process(menu, ctx).await?,
            (LinkGenerator::VariantIndex(g), DataSet::VariantIndex { variants }) => g.process(variants, ctx).await?,
            (generator, data_set) => {
                return Err(Error::MalformedLinkData(format!(
                    "{} generator cannot process {}",
                    generator.kind(),
                    data_set.describe()
                )));
            }
        };

        ctx.site.hooks.alter_links(ctx.variant, &mut records);

        if let Some(bad) = records.iter().find(|r| r.path.trim().is_empty()) {
            return Err(Error::MalformedLinkData(format!(
                "record for {} has no path ({})",
                bad.url,
                data_set.describe()
            )));
        }
        Ok(records)
    }
}
