//! Language fan-out: one record per link, carrying the URL of every language it is published in
//! as alternates.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};

use super::GenerationContext;
use crate::models::{ChangeFrequency, EntityRef, ImageRef, Priority, UrlRecord};
use crate::site::{LANGUAGE_NOT_APPLICABLE, LANGUAGE_UNDEFINED, Language};

/// Language-independent part of a link.
#[derive(Debug, Clone, Default)]
pub struct LinkAttributes {
    pub lastmod: Option<DateTime<Utc>>,
    pub priority: Option<Priority>,
    pub changefreq: Option<ChangeFrequency>,
    pub images: Vec<ImageRef>,
    pub entity: Option<EntityRef>,
}

/// Languages a link is emitted in. The default language is always one of them.
///
/// Excluded languages are dropped. With `skip_untranslated`, an object with a translation set
/// loses the languages it is not translated into, unless all its translations are language
/// neutral.
pub fn link_languages<'a>(ctx: &GenerationContext<'a>, translations: Option<&BTreeSet<String>>) -> Vec<&'a Language> {
    let translations = translations.filter(|t| ctx.settings.skip_untranslated && !is_language_neutral(t));
    ctx.languages
        .iter()
        .filter(|l| l.is_default || !ctx.settings.excluded_languages.contains(&l.id))
        .filter(|l| l.is_default || translations.is_none_or(|t| t.contains(&l.id)))
        .collect()
}

fn is_language_neutral(translations: &BTreeSet<String>) -> bool {
    translations.is_empty()
        || translations
            .iter()
            .all(|t| t == LANGUAGE_UNDEFINED || t == LANGUAGE_NOT_APPLICABLE)
}

/// Language id -> absolute URL for every language the link is emitted in.
pub fn alternate_urls(ctx: &GenerationContext<'_>, path: &str, languages: &[&Language]) -> BTreeMap<String, String> {
    languages
        .iter()
        .map(|l| (l.id.clone(), ctx.absolute_url(&ctx.site.paths.localize(path, l))))
        .collect()
}

/// The record of one canonical path. Its URL is the default language's; every emitted language,
/// default included, is in the alternate map.
pub fn localized_record(
    ctx: &GenerationContext<'_>,
    path: &str,
    translations: Option<&BTreeSet<String>>,
    attributes: LinkAttributes,
) -> UrlRecord {
    let languages = link_languages(ctx, translations);
    let alternates = alternate_urls(ctx, path, &languages);
    let primary = languages.iter().find(|l| l.is_default).or(languages.first());

    let (language, url) = match primary {
        Some(l) => (
            l.id.clone(),
            alternates
                .get(&l.id)
                .cloned()
                .unwrap_or_else(|| ctx.absolute_url(path)),
        ),
        None => (String::new(), ctx.absolute_url(path)),
    };

    UrlRecord {
        path: path.to_string(),
        language,
        url,
        alternate_urls: alternates,
        lastmod: attributes.lastmod,
        priority: attributes.priority,
        changefreq: attributes.changefreq,
        images: attributes.images,
        entity: attributes.entity,
    }
}
