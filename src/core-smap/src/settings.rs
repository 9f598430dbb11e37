//! Process-wide configuration of the sitemap pipeline.
//!
//! A [`Settings`] value is loaded once at the start of a generation pass and never changes during
//! it. Changes saved mid-pass apply to the next pass.

use std::collections::BTreeSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::{Error, Result};
use crate::models::VariantName;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Maximum number of tasks one invocation processes before stashing.
    pub batch_process_limit: usize,
    /// Maximum number of `<url>` elements per chunk.
    pub max_links: usize,
    /// Wall clock budget of one invocation, in milliseconds.
    pub generate_duration_ms: u64,
    pub remove_duplicates: bool,
    pub skip_untranslated: bool,
    pub excluded_languages: BTreeSet<String>,
    /// Overrides the site's own base URL in every generated link.
    pub base_url: Option<String>,
    /// The variant served at `/sitemap.xml` without a prefix.
    pub default_variant: Option<VariantName>,
    /// Number of entities (or arbitrary links) per queued task.
    pub entities_per_task: usize,
    /// Seconds a claimed task stays invisible to other claimants.
    pub claim_lease_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            batch_process_limit: 1500,
            max_links: 2000,
            generate_duration_ms: 10_000,
            remove_duplicates: true,
            skip_untranslated: true,
            excluded_languages: BTreeSet::new(),
            base_url: None,
            default_variant: VariantName::new("default").ok(),
            entities_per_task: 50,
            claim_lease_secs: 3600,
        }
    }
}

impl Settings {
    /// Defaults overridden by any `SMAP_*` environment variables that are set.
    pub fn from_env() -> Result<Self> {
        Settings::default().with_env_overrides()
    }

    /// Applies `SMAP_*` environment variables on top of these settings.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Applies overrides looked up by variable name. Empty values are ignored.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = get("SMAP_BATCH_PROCESS_LIMIT") {
            self.batch_process_limit = parse("SMAP_BATCH_PROCESS_LIMIT", &v)?;
        }
        if let Some(v) = get("SMAP_MAX_LINKS") {
            self.max_links = parse("SMAP_MAX_LINKS", &v)?;
        }
        if let Some(v) = get("SMAP_GENERATE_DURATION_MS") {
            self.generate_duration_ms = parse("SMAP_GENERATE_DURATION_MS", &v)?;
        }
        if let Some(v) = get("SMAP_REMOVE_DUPLICATES") {
            self.remove_duplicates = parse("SMAP_REMOVE_DUPLICATES", &v)?;
        }
        if let Some(v) = get("SMAP_SKIP_UNTRANSLATED") {
            self.skip_untranslated = parse("SMAP_SKIP_UNTRANSLATED", &v)?;
        }
        if let Some(v) = get("SMAP_EXCLUDED_LANGUAGES") {
            self.excluded_languages = v
                .split(',')
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(v) = get("SMAP_BASE_URL") {
            self.base_url = Some(v);
        }
        if let Some(v) = get("SMAP_DEFAULT_VARIANT") {
            self.default_variant = Some(VariantName::new(v)?);
        }
        if let Some(v) = get("SMAP_ENTITIES_PER_TASK") {
            self.entities_per_task = parse("SMAP_ENTITIES_PER_TASK", &v)?;
        }
        if let Some(v) = get("SMAP_CLAIM_LEASE_SECS") {
            self.claim_lease_secs = parse("SMAP_CLAIM_LEASE_SECS", &v)?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_links < 1 {
            return Err(Error::InvalidSettings("max_links must be at least 1".into()));
        }
        if self.entities_per_task < 1 {
            return Err(Error::InvalidSettings("entities_per_task must be at least 1".into()));
        }
        if let Some(base_url) = &self.base_url {
            let parsed = Url::parse(base_url)
                .map_err(|e| Error::InvalidSettings(format!("base_url '{}' is not a URL: {}", base_url, e)))?;
            if parsed.cannot_be_a_base() || !matches!(parsed.scheme(), "http" | "https") {
                return Err(Error::InvalidSettings(format!(
                    "base_url '{}' must be an absolute http(s) URL",
                    base_url
                )));
            }
        }
        Ok(())
    }

    pub fn generate_duration(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.generate_duration_ms)
    }

    pub fn is_default_variant(&self, variant: &VariantName) -> bool {
        self.default_variant.as_ref() == Some(variant)
    }
}

fn parse<T: FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse::<T>()
        .map_err(|e| Error::InvalidSettings(format!("{} = '{}': {}", name, value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let s = Settings::default();
        assert!(s.validate().is_ok());
        assert_eq!(s.max_links, 2000);
        assert_eq!(s.default_variant.as_ref().map(|v| v.as_str()), Some("default"));
    }

    #[test]
    fn test_overrides() {
        let s = Settings::default()
            .with_overrides(env(&[
                ("SMAP_MAX_LINKS", "10"),
                ("SMAP_REMOVE_DUPLICATES", "false"),
                ("SMAP_EXCLUDED_LANGUAGES", "fr, de ,"),
                ("SMAP_BASE_URL", "https://example.com"),
                ("SMAP_BATCH_PROCESS_LIMIT", " "),
            ]))
            .unwrap();
        assert_eq!(s.max_links, 10);
        assert!(!s.remove_duplicates);
        assert_eq!(s.excluded_languages.iter().cloned().collect::<Vec<_>>(), vec!["de", "fr"]);
        assert_eq!(s.base_url.as_deref(), Some("https://example.com"));
        assert_eq!(s.batch_process_limit, 1500);
    }

    #[test]
    fn test_invalid_overrides() {
        assert!(matches!(
            Settings::default().with_overrides(env(&[("SMAP_MAX_LINKS", "0")])),
            Err(Error::InvalidSettings(_))
        ));
        assert!(matches!(
            Settings::default().with_overrides(env(&[("SMAP_MAX_LINKS", "many")])),
            Err(Error::InvalidSettings(_))
        ));
        assert!(matches!(
            Settings::default().with_overrides(env(&[("SMAP_BASE_URL", "/relative")])),
            Err(Error::InvalidSettings(_))
        ));
        assert!(matches!(
            Settings::default().with_overrides(env(&[("SMAP_DEFAULT_VARIANT", "a b")])),
            Err(Error::InvalidVariantName(_))
        ));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let s: Settings = serde_json::from_str(r#"{"max_links": 5, "excluded_languages": ["fr"]}"#).unwrap();
        assert_eq!(s.max_links, 5);
        assert_eq!(s.entities_per_task, 50);
        assert!(s.excluded_languages.contains("fr"));
    }
}
