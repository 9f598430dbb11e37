//! Sitemap document generators: serialize URL records into `<urlset>` chunks and chunk lists
//! into a `<sitemapindex>`.

pub mod xml;

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::models::{ChunkInfo, UrlRecord, VariantName};
use crate::site::SitemapHooks;
use xml::DocumentWriter;

pub const SITEMAP_NS: &str = "http://www.sitemaps.org/schemas/sitemap/0.9";
pub const XHTML_NS: &str = "http://www.w3.org/1999/xhtml";
pub const IMAGE_NS: &str = "http://www.google.com/schemas/sitemap-image/1.1";

/// How a variant's records are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentGeneratorKind {
    /// `<urlset>` of pages with hreflang alternates and images.
    Default,
    /// `<sitemapindex>` whose entries are the records' URLs (sitemaps of other variants).
    Index,
}

impl DocumentGeneratorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentGeneratorKind::Default => "default",
            DocumentGeneratorKind::Index => "index",
        }
    }

    /// Renders one chunk of records.
    pub fn render_chunk(&self, records: &[UrlRecord], variant: &VariantName, hooks: &dyn SitemapHooks) -> Result<String> {
        match self {
            DocumentGeneratorKind::Default => render_urlset(records, variant, hooks),
            DocumentGeneratorKind::Index => {
                let entries = records
                    .iter()
                    .map(|r| (r.url.as_str(), r.lastmod))
                    .collect::<Vec<_>>();
                render_sitemapindex(&entries, variant, hooks)
            }
        }
    }

    /// Renders the index (delta 0) of a variant's chunks.
    pub fn render_index(
        &self,
        chunks: &[ChunkInfo],
        base_url: &str,
        variant: &VariantName,
        is_default_variant: bool,
        hooks: &dyn SitemapHooks,
    ) -> Result<String> {
        let locs = chunks
            .iter()
            .map(|c| (chunk_url(base_url, variant, is_default_variant, c.delta), Some(c.created_at)))
            .collect::<Vec<_>>();
        let entries = locs.iter().map(|(loc, lastmod)| (loc.as_str(), *lastmod)).collect::<Vec<_>>();
        render_sitemapindex(&entries, variant, hooks)
    }
}

impl std::fmt::Display for DocumentGeneratorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where a variant's sitemap is served. The default variant has no prefix.
pub fn variant_sitemap_url(base_url: &str, variant: &VariantName, is_default_variant: bool) -> String {
    let base_url = base_url.trim_end_matches('/');
    if is_default_variant {
        format!("{}/sitemap.xml", base_url)
    } else {
        format!("{}/{}/sitemap.xml", base_url, variant)
    }
}

pub fn chunk_url(base_url: &str, variant: &VariantName, is_default_variant: bool, delta: i32) -> String {
    format!("{}?page={}", variant_sitemap_url(base_url, variant, is_default_variant), delta)
}

pub fn format_lastmod(lastmod: &DateTime<Utc>) -> String {
    lastmod.to_rfc3339_opts(SecondsFormat::Secs, false)
}

fn render_urlset(records: &[UrlRecord], variant: &VariantName, hooks: &dyn SitemapHooks) -> Result<String> {
    let mut attributes = BTreeMap::from([
        ("xmlns".to_string(), SITEMAP_NS.to_string()),
        ("xmlns:xhtml".to_string(), XHTML_NS.to_string()),
        ("xmlns:image".to_string(), IMAGE_NS.to_string()),
    ]);
    hooks.alter_urlset_attributes(variant, &mut attributes);

    let mut doc = DocumentWriter::new()?;
    doc.start_with_attributes("urlset", &attributes)?;
    for record in records {
        doc.start("url")?;
        doc.text_element("loc", &record.url)?;
        if record.alternate_urls.len() > 1 {
            for (language, href) in &record.alternate_urls {
                doc.empty_element(
                    "xhtml:link",
                    &[("rel", "alternate"), ("hreflang", language.as_str()), ("href", href.as_str())],
                )?;
            }
        }
        if let Some(lastmod) = &record.lastmod {
            doc.text_element("lastmod", &format_lastmod(lastmod))?;
        }
        if let Some(changefreq) = &record.changefreq {
            doc.text_element("changefreq", changefreq.as_str())?;
        }
        if let Some(priority) = &record.priority {
            doc.text_element("priority", priority.as_str())?;
        }
        for image in &record.images {
            doc.start("image:image")?;
            doc.text_element("image:loc", &image.loc)?;
            if let Some(title) = &image.title {
                doc.text_element("image:title", title)?;
            }
            if let Some(caption) = &image.caption {
                doc.text_element("image:caption", caption)?;
            }
            doc.end("image:image")?;
        }
        doc.end("url")?;
    }
    doc.end("urlset")?;
    doc.finish()
}

fn render_sitemapindex(
    entries: &[(&str, Option<DateTime<Utc>>)],
    variant: &VariantName,
    hooks: &dyn SitemapHooks,
) -> Result<String> {
    let mut attributes = BTreeMap::from([("xmlns".to_string(), SITEMAP_NS.to_string())]);
    hooks.alter_index_attributes(variant, &mut attributes);

    let mut doc = DocumentWriter::new()?;
    doc.start_with_attributes("sitemapindex", &attributes)?;
    for (loc, lastmod) in entries {
        doc.start("sitemap")?;
        doc.text_element("loc", loc)?;
        if let Some(lastmod) = lastmod {
            doc.text_element("lastmod", &format_lastmod(lastmod))?;
        }
        doc.end("sitemap")?;
    }
    doc.end("sitemapindex")?;
    doc.finish()
}
