//! docsync Catalog - Durable item catalog
//!
//! SQLite-based persistence for:
//! - Tracked items and their synchronization state
//! - The remote change cursor and local journal cursor
//! - The catalog-built flag
//!
//! ## Architecture
//!
//! This crate implements the `IItemCatalog` port from `docsync-core` using
//! SQLite as the storage backend. It is a driven (secondary) adapter in the
//! hexagonal architecture. The database and the cursor files live in the
//! hidden store folder of the synchronized root.
//!
//! ## Key Components
//!
//! - [`DatabasePool`] - Connection pool with migration support
//! - [`SqliteItemCatalog`] - Full `IItemCatalog` implementation
//! - [`CursorStore`] - Cursor and build-flag files in the store folder
//! - [`CatalogError`] - Error types for catalog operations
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use docsync_catalog::SqliteItemCatalog;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let catalog = SqliteItemCatalog::open(Path::new("/home/user/Documents")).await?;
//! // Use catalog as IItemCatalog...
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod cursors;
pub mod pool;

pub use catalog::SqliteItemCatalog;
pub use cursors::CursorStore;
pub use pool::DatabasePool;

/// Errors that can occur during catalog operations
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// Failed to establish a database connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A database query failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Schema migration failed
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Serialization or deserialization of domain types failed
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// The hidden store folder cannot be created or accessed
    #[error("Store folder unavailable: {0}")]
    StoreFolderUnavailable(String),
}

impl From<sqlx::Error> for CatalogError {
    fn from(e: sqlx::Error) -> Self {
        CatalogError::QueryFailed(e.to_string())
    }
}
