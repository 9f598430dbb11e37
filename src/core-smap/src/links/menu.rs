use tracing::{debug, warn};

use super::language::{LinkAttributes, localized_record};
use super::{DataSet, GenerationContext};
use crate::errors::Result;
use crate::models::UrlRecord;
use crate::site::{MenuLink, MenuSettings};

/// Links to the internal, enabled, accessible items of the menus a variant indexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MenuLinkGenerator;

impl MenuLinkGenerator {
    /// One data set per menu.
    pub async fn enumerate(&self, ctx: &GenerationContext<'_>) -> Result<Vec<DataSet>> {
        Ok(ctx
            .site
            .config
            .menu_settings(ctx.variant)
            .await?
            .into_iter()
            .map(|menu| DataSet::Menu { menu })
            .collect())
    }

    pub async fn process(&self, menu: &MenuSettings, ctx: &GenerationContext<'_>) -> Result<Vec<UrlRecord>> {
        let tree = ctx.site.config.menu_links(&menu.menu).await?;

        // depth first, parents before children; a disabled item hides its subtree
        let mut stack = tree.iter().rev().collect::<Vec<&MenuLink>>();
        let mut records = Vec::new();
        while let Some(item) = stack.pop() {
            if !item.enabled {
                debug!("Menu item '{}' of {} is disabled", item.title, menu.menu);
                continue;
            }
            stack.extend(item.children.iter().rev());

            let Some(path) = item.path.as_deref().filter(|p| is_internal(p)) else {
                continue;
            };
            let Some(resolved) = ctx.site.paths.resolve(path).await? else {
                warn!("Menu item '{}' of {} links to missing path {}", item.title, menu.menu, path);
                continue;
            };
            if !resolved.accessible {
                warn!("Menu item '{}' of {} links to inaccessible path {}", item.title, menu.menu, path);
                continue;
            }

            let entity = match &resolved.entity {
                Some(entity_ref) => ctx.site.entities.load(&entity_ref.entity_type, &entity_ref.id).await?,
                None => None,
            };
            let attributes = LinkAttributes {
                lastmod: entity.as_ref().and_then(|e| e.changed),
                priority: menu.priority.clone(),
                changefreq: menu.changefreq,
                images: Vec::new(),
                entity: resolved.entity.clone(),
            };
            records.push(localized_record(
                ctx,
                &resolved.path,
                entity.as_ref().map(|e| &e.translations),
                attributes,
            ));
        }
        Ok(records)
    }
}

/// Site-relative paths only: external and protocol-relative URLs are never indexed.
fn is_internal(path: &str) -> bool {
    path.starts_with('/') && !path.starts_with("//")
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
          "entities": [
            {"entity_type": "node", "bundle": "page", "id": "1", "path": "/about", "changed": "2024-03-01T10:00:00Z"}
          ],
          "paths": [{"path": "/"}, {"path": "/team"}, {"path": "/private", "accessible": false}],
          "variants": {"default": {"menus": [{"menu": "main", "priority": "0.9"}]}},
          "menus": {
            "main": [
              {"title": "Home", "path": "/"},
              {"title": "About", "path": "/node/1", "children": [
                {"title": "Team", "path": "/team"},
                {"title": "Elsewhere", "path": "https://other.example.org/"}
              ]},
              {"title": "Hidden", "path": "/hidden", "enabled": false, "children": [
                {"title": "Hidden child", "path": "/team"}
              ]},
              {"title": "Private", "path": "/private"},
              {"title": "Heading"},
              {"title": "Gone", "path": "/gone"}
            ]
          }
        }
    "#};

    #[tokio::test]
    async fn test_menu_tree_is_walked_in_order() {
        let fixture = ContextFixture::from_manifest(MANIFEST);
        let ctx = fixture.context();

        let generator = LinkGenerator::MenuLink(MenuLinkGenerator);
        let data_sets = generator.enumerate(&ctx).await.unwrap();
        assert_eq!(data_sets.len(), 1);

        let records = generator.process(&data_sets[0], &ctx).await.unwrap();
        let paths = records.iter().map(|r| r.path.as_str()).collect::<Vec<_>>();
        assert_eq!(paths, vec!["/", "/about", "/team"]);
        assert!(records.iter().all(|r| r.priority.as_ref().unwrap().as_str() == "0.9"));
        assert!(records[1].lastmod.is_some());
        assert!(records[2].lastmod.is_none());
    }

    #[test]
    fn test_is_internal() {
        assert!(is_internal("/a"));
        assert!(!is_internal("//cdn.example.com/a"));
        assert!(!is_internal("https://example.com/a"));
        assert!(!is_internal("mailto:x@example.com"));
    }
}
