use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::document::DocumentGeneratorKind;
use crate::errors::Error;
use crate::links::{DataSet, LinkGeneratorKind};

static VARIANT_NAME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("variant name pattern compiles"));

static PRIORITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(0(\.[0-9]+)?|1(\.0+)?|\.[0-9]+)$").expect("priority pattern compiles"));

pub fn is_valid_variant_name(name: &str) -> bool {
    VARIANT_NAME.is_match(name)
}

/// Decimal text in [0.0, 1.0]. The text itself is what gets emitted, so "0.50" stays "0.50".
pub fn is_valid_priority(priority: &str) -> bool {
    PRIORITY.is_match(priority)
}

newtype_valid!(VariantName, is_valid_variant_name, Error, |n: &String| Error::InvalidVariantName(n.clone()));

newtype_valid!(Priority, is_valid_priority, Error, |p: &String| Error::InvalidPriority(p.clone()));

/// `<changefreq>` values allowed by the sitemap protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeFrequency {
    Always,
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Yearly,
    Never,
}

impl ChangeFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeFrequency::Always => "always",
            ChangeFrequency::Hourly => "hourly",
            ChangeFrequency::Daily => "daily",
            ChangeFrequency::Weekly => "weekly",
            ChangeFrequency::Monthly => "monthly",
            ChangeFrequency::Yearly => "yearly",
            ChangeFrequency::Never => "never",
        }
    }
}

impl std::fmt::Display for ChangeFrequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub loc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

/// Weak back-reference to the object a link was generated for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub entity_type: String,
    pub id: String,
}

/// One localized link destined for a sitemap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrlRecord {
    /// Canonical site-relative path. Dedup key.
    pub path: String,
    pub language: String,
    /// Absolute URL of this language's version.
    pub url: String,
    /// Language id -> absolute URL of every version of this path, this one included.
    #[serde(default)]
    pub alternate_urls: BTreeMap<String, String>,
    #[serde(default)]
    pub lastmod: Option<DateTime<Utc>>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub changefreq: Option<ChangeFrequency>,
    #[serde(default)]
    pub images: Vec<ImageRef>,
    #[serde(default)]
    pub entity: Option<EntityRef>,
}

pub type TaskId = i64;

/// A task as it is enqueued: everything but the queue-assigned id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTask {
    pub variant: VariantName,
    pub generator: LinkGeneratorKind,
    pub document: DocumentGeneratorKind,
    pub data_set: DataSet,
}

/// One unit of enqueued work: a data set for one link generator of one variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub variant: VariantName,
    pub generator: LinkGeneratorKind,
    pub document: DocumentGeneratorKind,
    pub data_set: DataSet,
}

impl Task {
    pub fn from_new(id: TaskId, task: NewTask) -> Self {
        Task {
            id,
            variant: task.variant,
            generator: task.generator,
            document: task.document,
            data_set: task.data_set,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStatus {
    Staged,
    Published,
}

impl std::fmt::Display for ChunkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChunkStatus::Staged => write!(f, "staged"),
            ChunkStatus::Published => write!(f, "published"),
        }
    }
}

/// One generated XML document. Delta 0 is the index, chunks count from 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SitemapChunk {
    pub variant: VariantName,
    pub delta: i32,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub status: ChunkStatus,
}

impl SitemapChunk {
    pub fn info(&self) -> ChunkInfo {
        ChunkInfo {
            delta: self.delta,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkInfo {
    pub delta: i32,
    pub created_at: DateTime<Utc>,
}

/// An independently configured and published sitemap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    pub name: VariantName,
    pub label: String,
    pub sitemap_type: String,
    pub weight: i32,
    #[serde(default = "enabled")]
    pub enabled: bool,
}

fn enabled() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_names() {
        assert!(VariantName::new("default").is_ok());
        assert!(VariantName::new("news_2024-de").is_ok());
        assert!(matches!(VariantName::new(""), Err(Error::InvalidVariantName(_))));
        assert!(matches!(VariantName::new("a/b"), Err(Error::InvalidVariantName(_))));
        assert!(matches!(VariantName::new("with space"), Err(Error::InvalidVariantName(_))));
    }

    #[test]
    fn test_priority_text_is_kept() {
        let p = Priority::new("0.50").unwrap();
        assert_eq!(p.as_str(), "0.50");
        assert!(Priority::new("1").is_ok());
        assert!(Priority::new("1.0").is_ok());
        assert!(Priority::new("0").is_ok());
        assert!(Priority::new("1.1").is_err());
        assert!(Priority::new("-0.1").is_err());
        assert!(Priority::new("high").is_err());
    }

    #[test]
    fn test_variant_name_deserialization_validates() {
        let ok: VariantName = serde_json::from_str("\"news\"").unwrap();
        assert_eq!(ok.as_str(), "news");
        assert!(serde_json::from_str::<VariantName>("\"no good\"").is_err());
    }

    #[test]
    fn test_changefreq_serde() {
        assert_eq!(serde_json::to_string(&ChangeFrequency::Weekly).unwrap(), "\"weekly\"");
        let c: ChangeFrequency = serde_json::from_str("\"never\"").unwrap();
        assert_eq!(c, ChangeFrequency::Never);
    }
}
