//! Error types for the sitemap build pipeline.

use thiserror::Error;

/// Main error type for sitemap generation operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Queue, chunk, variant or run-state storage failed. Structural: aborts the current operation.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A variant references a sitemap type that is not registered.
    #[error("Unknown sitemap type: {0}")]
    UnknownSitemapType(String),

    /// No variant with this name exists.
    #[error("Unknown variant: {0}")]
    UnknownVariant(String),

    /// Variant names are non-empty tokens of ASCII letters, digits, dashes and underscores.
    #[error("Invalid variant name: '{0}'")]
    InvalidVariantName(String),

    /// Priorities are decimals in [0.0, 1.0].
    #[error("Invalid priority: '{0}'")]
    InvalidPriority(String),

    /// A configured path could not be used (not site-relative, does not resolve, ...).
    #[error("Invalid path: '{0}'")]
    InvalidPath(String),

    /// A link generator produced output without the required shape. Fails one data set only.
    #[error("Malformed link data: {0}")]
    MalformedLinkData(String),

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    /// Writing or reading sitemap XML failed.
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Task payloads, stashes and manifests are JSON.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// An external collaborator (entity provider, path resolver, hooks) failed.
    #[error("Collaborator error: {0}")]
    Collaborator(String),
}

/// Type alias for Result with the sitemap Error.
pub type Result<T> = std::result::Result<T, Error>;
