use super::{DataSet, GenerationContext};
use crate::errors::{Error, Result};
use crate::models::UrlRecord;
use crate::site::ArbitraryLink;

/// Links supplied by the `arbitrary_links` hook, emitted as given without access checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArbitraryGenerator;

impl ArbitraryGenerator {
    pub async fn enumerate(&self, ctx: &GenerationContext<'_>) -> Result<Vec<DataSet>> {
        let links = ctx.site.hooks.arbitrary_links(ctx.variant).await?;
        Ok(links
            .chunks(ctx.settings.entities_per_task.max(1))
            .map(|links| DataSet::Arbitrary { links: links.to_vec() })
            .collect())
    }

    /// Every link must carry a path; one that doesn't fails the whole data set.
    pub fn process(&self, links: &[ArbitraryLink], ctx: &GenerationContext<'_>) -> Result<Vec<UrlRecord>> {
        let default_language = ctx.default_language().map(|l| l.id.clone()).unwrap_or_default();
        links
            .iter()
            .map(|link| {
                let path = link
                    .path
                    .clone()
                    .filter(|p| !p.trim().is_empty())
                    .ok_or_else(|| Error::MalformedLinkData(format!("arbitrary link {} has no path", link.url)))?;
                Ok(UrlRecord {
                    path,
                    language: link.language.clone().unwrap_or_else(|| default_language.clone()),
                    url: link.url.clone(),
                    alternate_urls: link.alternate_urls.clone(),
                    lastmod: link.lastmod,
                    priority: link.priority.clone(),
                    changefreq: link.changefreq,
                    images: link.images.clone(),
                    entity: None,
                })
            })
            .collect()
    }
}
