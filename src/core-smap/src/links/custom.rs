use tracing::{debug, warn};

use super::language::{LinkAttributes, localized_record};
use super::{DataSet, GenerationContext};
use crate::errors::{Error, Result};
use crate::models::UrlRecord;
use crate::site::CustomLink;

/// Links to individually configured site paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CustomPathGenerator;

impl CustomPathGenerator {
    /// One data set per configured custom link.
    pub async fn enumerate(&self, ctx: &GenerationContext<'_>) -> Result<Vec<DataSet>> {
        Ok(ctx
            .site
            .config
            .custom_links(ctx.variant)
            .await?
            .into_iter()
            .map(|link| DataSet::CustomPath { link })
            .collect())
    }

    /// Records of the link's path, if it resolves and is publicly accessible.
    /// A path backed by an object takes its modification time and translations from it.
    pub async fn process(&self, link: &CustomLink, ctx: &GenerationContext<'_>) -> Result<Vec<UrlRecord>> {
        if !link.path.starts_with('/') {
            return Err(Error::InvalidPath(format!("{} (custom links must start with '/')", link.path)));
        }

        let Some(resolved) = ctx.site.paths.resolve(&link.path).await? else {
            warn!("Custom path {} does not exist, skipping", link.path);
            return Ok(Vec::new());
        };
        if !resolved.accessible {
            warn!("Custom path {} is not publicly accessible, skipping", link.path);
            return Ok(Vec::new());
        }
        if ctx.path_seen(&resolved.path) {
            debug!("Custom path {} was already emitted for variant {}", resolved.path, ctx.variant);
            return Ok(Vec::new());
        }

        let entity = match &resolved.entity {
            Some(entity_ref) => ctx.site.entities.load(&entity_ref.entity_type, &entity_ref.id).await?,
            None => None,
        };

        let attributes = LinkAttributes {
            lastmod: entity.as_ref().and_then(|e| e.changed),
            priority: link.priority.clone(),
            changefreq: link.changefreq,
            images: Vec::new(),
            entity: resolved.entity.clone(),
        };
        Ok(vec![localized_record(
            ctx,
            &resolved.path,
            entity.as_ref().map(|e| &e.translations),
            attributes,
        )])
    }
}
