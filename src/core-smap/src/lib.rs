//! # core-smap
//!
//! Functional core of the incremental XML sitemap builder.
//!
//! A rebuild turns every enabled variant's sitemap type into queued tasks (one per data set a
//! link generator enumerates). The [`QueueWorker`] drains that queue, turns each task into
//! localized [`UrlRecord`]s, suppresses duplicate paths, writes size-bounded chunks into a staged
//! copy and finally swaps the staged copy in as the published sitemap of the variant.
//!
//! Storage is abstracted behind the traits in [`store`]; [`store::MemoryStore`] keeps everything
//! in process, the `data-model-smap` crate keeps it in Postgres.

pub mod common;
pub mod document;
pub mod errors;
#[macro_use]
pub mod functional;
pub mod links;
pub mod models;
pub mod registry;
pub mod settings;
pub mod site;
pub mod static_site;
pub mod store;
pub mod worker;

// Make test_helpers available for tests in this crate and dependent crates
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use common::hostname::{HostPortError, get_api_base_url};
pub use common::logging::setup_logging;
pub use common::poll_interval::{TimeUnit, get_poll_interval};
pub use document::DocumentGeneratorKind;
pub use errors::Error;
pub use links::{DataSet, GenerationContext, LinkGenerator, LinkGeneratorKind};
pub use models::{
    ChangeFrequency, ChunkInfo, ChunkStatus, EntityRef, ImageRef, NewTask, Priority, SitemapChunk, Task, TaskId,
    UrlRecord, Variant, VariantName,
};
pub use registry::{SitemapType, SitemapTypeRegistry, VariantRegistry};
pub use settings::Settings;
pub use site::Site;
pub use static_site::StaticSite;
pub use store::{MemoryStore, Stores};
pub use worker::{GenerationBudget, PassOutcome, Progress, QueueWorker, RunState, Stash, WorkerState};
