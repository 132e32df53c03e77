//! Item catalog port (driven/secondary port)
//!
//! This module defines the interface for the durable per-root catalog:
//! tracked items, the two sync cursors, and the catalog-built flag.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because storage errors are adapter-specific
//!   (SQLite, filesystem, etc.) and don't need domain-level classification.
//! - Every mutating operation must persist synchronously before returning;
//!   the catalog is the durable source of truth and a crash must never lose
//!   a completed state transition.
//! - Implementations serialize structural mutations internally; callers may
//!   issue reads concurrently.

use crate::domain::{ChangeCursor, Item, ItemId, ItemKind, JournalCursor, RemoteId};

/// Port trait for the durable item catalog
///
/// `next_to_process` and `count_to_process` consider only items with a
/// pending state, no sticky error, and a `Pending` pass tag, in insertion
/// order. There is no priority beyond that order.
#[async_trait::async_trait]
pub trait IItemCatalog: Send + Sync {
    // --- Item CRUD ---

    /// Inserts a new item
    ///
    /// Fails if an item with the same (parent, name) already exists.
    async fn insert(&self, item: &Item) -> anyhow::Result<()>;

    /// Persists the current state of an existing item
    async fn update(&self, item: &Item) -> anyhow::Result<()>;

    /// Retrieves an item by its unique ID
    async fn get(&self, id: ItemId) -> anyhow::Result<Option<Item>>;

    /// Retrieves an item by its root-relative location
    async fn get_by_path(&self, parent: &str, name: &str) -> anyhow::Result<Option<Item>>;

    /// Retrieves an item by its remote identifier
    async fn get_by_remote_id(&self, remote_id: RemoteId) -> anyhow::Result<Option<Item>>;

    /// Deletes an item by its unique ID
    async fn delete(&self, id: ItemId) -> anyhow::Result<()>;

    // --- Enumeration ---

    /// All items directly inside `folder` (root-relative path, empty for
    /// the root)
    async fn items_in_dir(&self, folder: &str) -> anyhow::Result<Vec<Item>>;

    /// All items inside `folder` and any of its subfolders
    async fn items_in_subtree(&self, folder: &str) -> anyhow::Result<Vec<Item>>;

    /// All items with a pending state
    async fn items_changed(&self) -> anyhow::Result<Vec<Item>>;

    /// All items with the sticky error flag set
    async fn items_with_error(&self) -> anyhow::Result<Vec<Item>>;

    /// All error-free items of the given kind in state `Unchanged`
    ///
    /// Used by the rescan collector to detect local deletions.
    async fn items_unchanged_clean(&self, kind: ItemKind) -> anyhow::Result<Vec<Item>>;

    // --- Drain support ---

    /// The first eligible item for processing, if any
    async fn next_to_process(&self) -> anyhow::Result<Option<Item>>;

    /// The number of eligible items
    async fn count_to_process(&self) -> anyhow::Result<u64>;

    /// Tags an item as handled for the current drain pass
    async fn mark_in_flight(&self, id: ItemId) -> anyhow::Result<()>;

    /// Returns every in-flight item to the pending tag (end of pass)
    async fn reset_postponed(&self) -> anyhow::Result<()>;

    /// Resets all non-conflict items to `Unchanged` and clears their errors
    ///
    /// Operator action; conflicts keep waiting for resolution.
    async fn reset_except_conflicts(&self) -> anyhow::Result<()>;

    // --- Folder rename propagation ---

    /// Rewrites the parent path of every item under `old_prefix` to sit
    /// under `new_prefix`, in a single transaction
    ///
    /// With `mark_error` set, rewritten descendants additionally get the
    /// sticky error flag (used when a remote rename implies a move whose
    /// descendant mapping is ambiguous). Returns the number of rewritten
    /// records.
    async fn rewrite_parent_prefix(
        &self,
        old_prefix: &str,
        new_prefix: &str,
        mark_error: bool,
    ) -> anyhow::Result<u64>;

    // --- Cursors and build flag ---

    /// The stored remote change cursor, if any
    async fn remote_cursor(&self) -> anyhow::Result<Option<ChangeCursor>>;

    /// Replaces the stored remote change cursor
    async fn set_remote_cursor(&self, cursor: &ChangeCursor) -> anyhow::Result<()>;

    /// The stored journal cursor, if any
    async fn journal_cursor(&self) -> anyhow::Result<Option<JournalCursor>>;

    /// Replaces the stored journal cursor
    async fn set_journal_cursor(&self, cursor: JournalCursor) -> anyhow::Result<()>;

    /// True once the initial full reconciliation has completed
    async fn catalog_built(&self) -> anyhow::Result<bool>;

    /// Sets the catalog-built flag
    async fn set_catalog_built(&self, built: bool) -> anyhow::Result<()>;
}
