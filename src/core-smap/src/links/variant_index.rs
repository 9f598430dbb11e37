use super::{DataSet, GenerationContext};
use crate::document::{DocumentGeneratorKind, variant_sitemap_url};
use crate::errors::Result;
use crate::models::{UrlRecord, VariantName};

/// Links to the sitemaps of the other variants, for variants whose documents are indexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VariantIndexGenerator;

impl VariantIndexGenerator {
    /// A single data set naming every enabled variant that renders pages.
    pub async fn enumerate(&self, ctx: &GenerationContext<'_>) -> Result<Vec<DataSet>> {
        let variants = ctx
            .variants
            .iter()
            .filter(|v| v.enabled && &v.name != ctx.variant)
            .filter(|v| {
                ctx.registry
                    .get(&v.sitemap_type)
                    .is_some_and(|t| t.document != DocumentGeneratorKind::Index)
            })
            .map(|v| v.name.clone())
            .collect::<Vec<_>>();

        if variants.is_empty() {
            Ok(Vec::new())
        } else {
            Ok(vec![DataSet::VariantIndex { variants }])
        }
    }

    /// One record per listed variant that currently has a published sitemap.
    pub async fn process(&self, variants: &[VariantName], ctx: &GenerationContext<'_>) -> Result<Vec<UrlRecord>> {
        let language = ctx.default_language().map(|l| l.id.clone()).unwrap_or_default();
        let mut records = Vec::new();
        for name in variants {
            let published = ctx.chunks.published(name).await?;
            let Some(lastmod) = published.iter().map(|c| c.created_at).max() else {
                continue;
            };
            let is_default = ctx.is_default_variant(name);
            let url = variant_sitemap_url(ctx.base_url, name, is_default);
            let path = if is_default {
                "/sitemap.xml".to_string()
            } else {
                format!("/{}/sitemap.xml", name)
            };
            records.push(UrlRecord {
                path,
                language: language.clone(),
                url,
                alternate_urls: Default::default(),
                lastmod: Some(lastmod),
                priority: None,
                changefreq: None,
                images: Vec::new(),
                entity: None,
            });
        }
        Ok(records)
    }
}
