use tracing::{debug, warn};

use super::language::{LinkAttributes, localized_record};
use super::{DataSet, GenerationContext};
use crate::errors::Result;
use crate::models::UrlRecord;
use crate::site::BundleSettings;

/// Links to every object of the bundles a variant indexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EntityGenerator;

impl EntityGenerator {
    /// One data set per page of `entities_per_task` ids of each indexed bundle.
    pub async fn enumerate(&self, ctx: &GenerationContext<'_>) -> Result<Vec<DataSet>> {
        let page_size = ctx.settings.entities_per_task.max(1);
        let mut data_sets = Vec::new();

        for bundle in ctx.site.config.bundle_settings(ctx.variant).await? {
            if !bundle.index {
                continue;
            }
            let mut offset = 0;
            loop {
                let ids = ctx
                    .site
                    .entities
                    .entity_ids(&bundle.entity_type, &bundle.bundle, offset, page_size)
                    .await?;
                let last_page = ids.len() < page_size;
                offset += ids.len();
                if !ids.is_empty() {
                    data_sets.push(DataSet::EntityBatch {
                        bundle: bundle.clone(),
                        ids,
                    });
                }
                if last_page {
                    break;
                }
            }
        }
        Ok(data_sets)
    }

    pub async fn process(
        &self,
        bundle: &BundleSettings,
        ids: &[String],
        ctx: &GenerationContext<'_>,
    ) -> Result<Vec<UrlRecord>> {
        let mut records = Vec::new();
        for id in ids {
            let Some(entity) = ctx.site.entities.load(&bundle.entity_type, id).await? else {
                warn!("{} {} no longer exists, skipping", bundle.entity_type, id);
                continue;
            };
            if ctx.path_seen(&entity.path) {
                debug!("{} {} ({}) was already emitted for variant {}", bundle.entity_type, id, entity.path, ctx.variant);
                continue;
            }
            if !entity.public {
                warn!("{} {} ({}) is not publicly accessible, skipping", bundle.entity_type, id, entity.path);
                continue;
            }

            let overrides = ctx
                .site
                .config
                .entity_override(ctx.variant, &bundle.entity_type, id)
                .await?
                .unwrap_or_default();
            if overrides.exclude {
                debug!("{} {} is excluded from variant {}", bundle.entity_type, id, ctx.variant);
                continue;
            }

            let images = if bundle.include_images {
                entity.images.clone()
            } else {
                Vec::new()
            };
            let attributes = LinkAttributes {
                lastmod: entity.changed,
                priority: overrides.priority.or_else(|| bundle.priority.clone()),
                changefreq: overrides.changefreq.or(bundle.changefreq),
                images,
                entity: Some(entity.entity_ref()),
            };
            records.push(localized_record(ctx, &entity.path, Some(&entity.translations), attributes));
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::links::LinkGenerator;
    use crate::test_helpers::ContextFixture;
    use indoc::indoc;

    const MANIFEST: &str = indoc! {r#"
        {
          "base_url": "https://example.com",
          "languages": [{"id": "en", "is_default": true}],
          "entities": [
            {"entity_type": "node", "bundle": "page", "id": "1", "path": "/one", "changed": "2024-03-01T10:00:00Z",
             "images": [{"loc": "https://example.com/one.png"}]},
            {"entity_type": "node", "bundle": "page", "id": "2", "path": "/two"},
            {"entity_type": "node", "bundle": "page", "id": "3", "path": "/three", "public": false},
            {"entity_type": "node", "bundle": "page", "id": "4", "path": "/four"},
            {"entity_type": "node", "bundle": "page", "id": "5", "path": "/five"},
            {"entity_type": "node", "bundle": "draft", "id": "6", "path": "/six"}
          ],
          "variants": {
            "default": {
              "bundles": [
                {"entity_type": "node", "bundle": "page", "priority": "0.7", "changefreq": "weekly", "include_images": true},
                {"entity_type": "node", "bundle": "draft", "index": false}
              ],
              "overrides": [
                {"entity_type": "node", "id": "2", "priority": "0.2"},
                {"entity_type": "node", "id": "4", "exclude": true}
              ]
            }
          }
        }
    "#};

    #[tokio::test]
    async fn test_enumerate_pages_indexed_bundles() {
        let mut fixture = ContextFixture::from_manifest(MANIFEST);
        fixture.settings.entities_per_task = 2;
        let ctx = fixture.context();

        let data_sets = LinkGenerator::Entity(EntityGenerator).enumerate(&ctx).await.unwrap();
        let pages = data_sets
            .iter()
            .map(|d| match d {
                DataSet::EntityBatch { ids, .. } => ids.clone(),
                other => panic!("unexpected data set {:?}", other),
            })
            .collect::<Vec<_>>();
        assert_eq!(pages, vec![vec!["1", "2"], vec!["3", "4"], vec!["5"]]);
    }

    #[tokio::test]
    async fn test_process_applies_bundle_settings_and_overrides() {
        let fixture = ContextFixture::from_manifest(MANIFEST);
        let ctx = fixture.context();

        let generator = LinkGenerator::Entity(EntityGenerator);
        let data_sets = generator.enumerate(&ctx).await.unwrap();
        assert_eq!(data_sets.len(), 1);

        let records = generator.process(&data_sets[0], &ctx).await.unwrap();
        let paths = records.iter().map(|r| r.path.as_str()).collect::<Vec<_>>();
        assert_eq!(paths, vec!["/one", "/two", "/five"]);

        assert_eq!(records[0].priority.as_ref().unwrap().as_str(), "0.7");
        assert_eq!(records[0].images.len(), 1);
        assert!(records[0].lastmod.is_some());
        assert_eq!(records[0].entity.as_ref().unwrap().id, "1");
        assert_eq!(records[1].priority.as_ref().unwrap().as_str(), "0.2");
        assert_eq!(records[1].changefreq, Some(crate::models::ChangeFrequency::Weekly));
        assert!(records[1].lastmod.is_none());
    }

    #[tokio::test]
    async fn test_missing_entities_are_skipped() {
        let fixture = ContextFixture::from_manifest(MANIFEST);
        let ctx = fixture.context();

        let bundle = BundleSettings {
            entity_type: "node".to_string(),
            bundle: "page".to_string(),
            index: true,
            priority: None,
            changefreq: None,
            include_images: false,
        };
        let records = EntityGenerator
            .process(&bundle, &["99".to_string(), "5".to_string()], &ctx)
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].url, "https://example.com/five");
    }
}
