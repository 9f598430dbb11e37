//! Postgres storage of the sitemap pipeline. [`store::PgStore`] implements every storage trait
//! of `core-smap`, so a worker and the API server can share one database.

pub mod db;
pub mod models;
pub mod schema;
pub mod store;

// Make test_helpers available for tests in this crate and dependent crates
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use db::{ConnectionPoolError, DbPool, establish_connection_pool, get_db_pool};
pub use store::{PgStore, StoreError};
