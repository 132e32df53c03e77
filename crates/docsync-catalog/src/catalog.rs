//! SQLite implementation of IItemCatalog
//!
//! This module provides the concrete SQLite-based implementation of the
//! item catalog port defined in docsync-core. It handles all domain type
//! serialization/deserialization and SQL query construction.
//!
//! ## Type Mapping
//!
//! | Domain Type   | SQL Type | Strategy                                       |
//! |---------------|----------|------------------------------------------------|
//! | ItemId        | TEXT     | UUID string via `.to_string()` / `FromStr`     |
//! | RemoteId      | INTEGER  | raw i64                                        |
//! | Etag          | INTEGER  | raw i64                                        |
//! | DateTime<Utc> | TEXT     | ISO 8601 via `to_rfc3339()`                    |
//! | ItemKind      | TEXT     | "file" / "folder"                              |
//! | ItemState     | TEXT     | snake_case state name                          |
//! | PassTag       | TEXT     | "pending" / "in_flight"                        |
//!
//! Insertion order is the drain order: rows are only ever UPDATEd in place
//! so rowid remains stable, and the pop-next query orders by rowid.

use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tokio::sync::Mutex;

use docsync_core::domain::{
    ChangeCursor, Etag, Item, ItemId, ItemKind, ItemState, JournalCursor, PassTag, RemoteId,
};
use docsync_core::ports::IItemCatalog;
use docsync_core::STORE_FOLDER;

use crate::{CatalogError, CursorStore, DatabasePool};

const DB_FILE: &str = "catalog.db";

/// SQLite-based implementation of the item catalog port
///
/// Items live in the database; the cursors and the build flag live as
/// files next to it (see [`CursorStore`]). Structural writes are
/// serialized through an internal mutex so lookup-then-insert sequences
/// from concurrent collectors cannot race the uniqueness constraint.
pub struct SqliteItemCatalog {
    pool: SqlitePool,
    cursors: CursorStore,
    write_lock: Mutex<()>,
}

impl SqliteItemCatalog {
    /// Opens (or creates) the catalog for a synchronized root
    ///
    /// # Errors
    ///
    /// Fails when the store folder cannot be created or the database is
    /// corrupt or unreachable; either is fatal for this root's engine.
    pub async fn open(root: &Path) -> Result<Self, CatalogError> {
        let store_dir = root.join(STORE_FOLDER);
        let cursors = CursorStore::new(&store_dir)?;
        let pool = DatabasePool::new(&store_dir.join(DB_FILE)).await?;
        Ok(Self {
            pool: pool.pool().clone(),
            cursors,
            write_lock: Mutex::new(()),
        })
    }

    /// Creates a catalog with an in-memory database for testing
    ///
    /// Cursor files still need a directory; pass a temp dir.
    pub async fn in_memory(store_dir: &Path) -> Result<Self, CatalogError> {
        let cursors = CursorStore::new(store_dir)?;
        let pool = DatabasePool::in_memory().await?;
        Ok(Self {
            pool: pool.pool().clone(),
            cursors,
            write_lock: Mutex::new(()),
        })
    }
}

// ============================================================================
// Helper functions for type conversion
// ============================================================================

/// Serialize an ItemState to a string for storage
fn state_to_string(state: ItemState) -> &'static str {
    match state {
        ItemState::Unchanged => "unchanged",
        ItemState::UpdatedLocal => "updated_local",
        ItemState::UpdatedRemote => "updated_remote",
        ItemState::DeletedLocal => "deleted_local",
        ItemState::DeletedRemote => "deleted_remote",
        ItemState::RenamedLocal => "renamed_local",
        ItemState::RenamedRemote => "renamed_remote",
        ItemState::Conflict => "conflict",
    }
}

/// Deserialize an ItemState from its stored string representation
fn state_from_string(s: &str) -> Result<ItemState, CatalogError> {
    match s {
        "unchanged" => Ok(ItemState::Unchanged),
        "updated_local" => Ok(ItemState::UpdatedLocal),
        "updated_remote" => Ok(ItemState::UpdatedRemote),
        "deleted_local" => Ok(ItemState::DeletedLocal),
        "deleted_remote" => Ok(ItemState::DeletedRemote),
        "renamed_local" => Ok(ItemState::RenamedLocal),
        "renamed_remote" => Ok(ItemState::RenamedRemote),
        "conflict" => Ok(ItemState::Conflict),
        other => Err(CatalogError::SerializationError(format!(
            "Unknown item state: {}",
            other
        ))),
    }
}

fn kind_to_string(kind: ItemKind) -> &'static str {
    match kind {
        ItemKind::File => "file",
        ItemKind::Folder => "folder",
    }
}

fn kind_from_string(s: &str) -> Result<ItemKind, CatalogError> {
    match s {
        "file" => Ok(ItemKind::File),
        "folder" => Ok(ItemKind::Folder),
        other => Err(CatalogError::SerializationError(format!(
            "Unknown item kind: {}",
            other
        ))),
    }
}

fn pass_tag_to_string(tag: PassTag) -> &'static str {
    match tag {
        PassTag::Pending => "pending",
        PassTag::InFlight => "in_flight",
    }
}

fn pass_tag_from_string(s: &str) -> Result<PassTag, CatalogError> {
    match s {
        "pending" => Ok(PassTag::Pending),
        "in_flight" => Ok(PassTag::InFlight),
        other => Err(CatalogError::SerializationError(format!(
            "Unknown pass tag: {}",
            other
        ))),
    }
}

/// Parse a DateTime<Utc> from an ISO 8601 string
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, CatalogError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            CatalogError::SerializationError(format!("Failed to parse datetime '{}': {}", s, e))
        })
}

// ============================================================================
// Row mapping
// ============================================================================

/// Reconstruct an Item from a database row
fn item_from_row(row: &SqliteRow) -> Result<Item, CatalogError> {
    let id_str: String = row.get("id");
    let remote_id: Option<i64> = row.get("remote_id");
    let etag: Option<i64> = row.get("etag");
    let parent: String = row.get("parent");
    let name: String = row.get("name");
    let last_modified_str: String = row.get("last_modified");
    let kind_str: String = row.get("kind");
    let state_str: String = row.get("state");
    let pass_tag_str: String = row.get("pass_tag");
    let has_error: i64 = row.get("has_error");
    let last_error: Option<String> = row.get("last_error");
    let new_name: Option<String> = row.get("new_name");

    let id = ItemId::from_str(&id_str).map_err(|e| {
        CatalogError::SerializationError(format!("Invalid ItemId '{}': {}", id_str, e))
    })?;

    Ok(Item::from_parts(
        id,
        remote_id.map(RemoteId::new),
        etag.map(Etag::new),
        parent,
        name,
        parse_datetime(&last_modified_str)?,
        kind_from_string(&kind_str)?,
        state_from_string(&state_str)?,
        pass_tag_from_string(&pass_tag_str)?,
        has_error != 0,
        last_error,
        new_name,
    ))
}

fn rows_to_items(rows: Vec<SqliteRow>) -> Result<Vec<Item>, CatalogError> {
    rows.iter().map(item_from_row).collect()
}

// ============================================================================
// IItemCatalog implementation
// ============================================================================

const POP_FILTER: &str = "state != 'unchanged' AND has_error = 0 AND pass_tag = 'pending'";

#[async_trait::async_trait]
impl IItemCatalog for SqliteItemCatalog {
    // --- Item CRUD ---

    async fn insert(&self, item: &Item) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock().await;

        sqlx::query(
            "INSERT INTO items \
             (id, remote_id, etag, parent, name, last_modified, kind, state, \
              pass_tag, has_error, last_error, new_name) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(item.id().to_string())
        .bind(item.remote_id().map(|r| r.value()))
        .bind(item.etag().map(|e| e.value()))
        .bind(item.parent())
        .bind(item.name())
        .bind(item.last_modified().to_rfc3339())
        .bind(kind_to_string(item.kind()))
        .bind(state_to_string(item.state()))
        .bind(pass_tag_to_string(item.pass_tag()))
        .bind(item.has_error() as i64)
        .bind(item.last_error())
        .bind(item.new_name())
        .execute(&self.pool)
        .await?;

        tracing::trace!(item_id = %item.id(), path = %item.relative_path(), "Inserted item");
        Ok(())
    }

    async fn update(&self, item: &Item) -> anyhow::Result<()> {
        let result = sqlx::query(
            "UPDATE items SET \
             remote_id = ?, etag = ?, parent = ?, name = ?, last_modified = ?, \
             kind = ?, state = ?, pass_tag = ?, has_error = ?, last_error = ?, \
             new_name = ? \
             WHERE id = ?",
        )
        .bind(item.remote_id().map(|r| r.value()))
        .bind(item.etag().map(|e| e.value()))
        .bind(item.parent())
        .bind(item.name())
        .bind(item.last_modified().to_rfc3339())
        .bind(kind_to_string(item.kind()))
        .bind(state_to_string(item.state()))
        .bind(pass_tag_to_string(item.pass_tag()))
        .bind(item.has_error() as i64)
        .bind(item.last_error())
        .bind(item.new_name())
        .bind(item.id().to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            anyhow::bail!("Cannot update unknown item {}", item.id());
        }

        tracing::trace!(item_id = %item.id(), state = %item.state(), "Updated item");
        Ok(())
    }

    async fn get(&self, id: ItemId) -> anyhow::Result<Option<Item>> {
        let row = sqlx::query("SELECT * FROM items WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(item_from_row(r)?)),
            None => Ok(None),
        }
    }

    async fn get_by_path(&self, parent: &str, name: &str) -> anyhow::Result<Option<Item>> {
        let row = sqlx::query("SELECT * FROM items WHERE parent = ? AND name = ?")
            .bind(parent)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(item_from_row(r)?)),
            None => Ok(None),
        }
    }

    async fn get_by_remote_id(&self, remote_id: RemoteId) -> anyhow::Result<Option<Item>> {
        let row = sqlx::query("SELECT * FROM items WHERE remote_id = ?")
            .bind(remote_id.value())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(item_from_row(r)?)),
            None => Ok(None),
        }
    }

    async fn delete(&self, id: ItemId) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock().await;

        sqlx::query("DELETE FROM items WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        tracing::trace!(item_id = %id, "Deleted item");
        Ok(())
    }

    // --- Enumeration ---

    async fn items_in_dir(&self, folder: &str) -> anyhow::Result<Vec<Item>> {
        let rows = sqlx::query("SELECT * FROM items WHERE parent = ? ORDER BY rowid")
            .bind(folder)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows_to_items(rows)?)
    }

    async fn items_in_subtree(&self, folder: &str) -> anyhow::Result<Vec<Item>> {
        let rows = if folder.is_empty() {
            sqlx::query("SELECT * FROM items ORDER BY rowid")
                .fetch_all(&self.pool)
                .await?
        } else {
            sqlx::query(
                "SELECT * FROM items WHERE parent = ?1 OR parent LIKE ?1 || '/%' ORDER BY rowid",
            )
            .bind(folder)
            .fetch_all(&self.pool)
            .await?
        };
        Ok(rows_to_items(rows)?)
    }

    async fn items_changed(&self) -> anyhow::Result<Vec<Item>> {
        let rows = sqlx::query("SELECT * FROM items WHERE state != 'unchanged' ORDER BY rowid")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows_to_items(rows)?)
    }

    async fn items_with_error(&self) -> anyhow::Result<Vec<Item>> {
        let rows = sqlx::query("SELECT * FROM items WHERE has_error = 1 ORDER BY rowid")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows_to_items(rows)?)
    }

    async fn items_unchanged_clean(&self, kind: ItemKind) -> anyhow::Result<Vec<Item>> {
        let rows = sqlx::query(
            "SELECT * FROM items \
             WHERE state = 'unchanged' AND has_error = 0 AND kind = ? \
             ORDER BY rowid",
        )
        .bind(kind_to_string(kind))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows_to_items(rows)?)
    }

    // --- Drain support ---

    async fn next_to_process(&self) -> anyhow::Result<Option<Item>> {
        let row = sqlx::query(&format!(
            "SELECT * FROM items WHERE {POP_FILTER} ORDER BY rowid LIMIT 1"
        ))
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(item_from_row(r)?)),
            None => Ok(None),
        }
    }

    async fn count_to_process(&self) -> anyhow::Result<u64> {
        let count: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM items WHERE {POP_FILTER}"))
                .fetch_one(&self.pool)
                .await?;
        Ok(count as u64)
    }

    async fn mark_in_flight(&self, id: ItemId) -> anyhow::Result<()> {
        sqlx::query("UPDATE items SET pass_tag = 'in_flight' WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn reset_postponed(&self) -> anyhow::Result<()> {
        let result = sqlx::query("UPDATE items SET pass_tag = 'pending' WHERE pass_tag != 'pending'")
            .execute(&self.pool)
            .await?;
        tracing::debug!(
            released = result.rows_affected(),
            "Returned in-flight items to pending"
        );
        Ok(())
    }

    async fn reset_except_conflicts(&self) -> anyhow::Result<()> {
        let result = sqlx::query(
            "UPDATE items SET \
             state = 'unchanged', pass_tag = 'pending', has_error = 0, \
             last_error = NULL, new_name = NULL \
             WHERE state != 'conflict'",
        )
        .execute(&self.pool)
        .await?;
        tracing::info!(reset = result.rows_affected(), "Reset non-conflict items");
        Ok(())
    }

    // --- Folder rename propagation ---

    async fn rewrite_parent_prefix(
        &self,
        old_prefix: &str,
        new_prefix: &str,
        mark_error: bool,
    ) -> anyhow::Result<u64> {
        let _guard = self.write_lock.lock().await;

        let result = sqlx::query(
            "UPDATE items SET \
             parent = ?2 || substr(parent, length(?1) + 1), \
             has_error = CASE WHEN ?3 != 0 THEN 1 ELSE has_error END \
             WHERE parent = ?1 OR parent LIKE ?1 || '/%'",
        )
        .bind(old_prefix)
        .bind(new_prefix)
        .bind(mark_error as i64)
        .execute(&self.pool)
        .await?;

        tracing::debug!(
            old = %old_prefix,
            new = %new_prefix,
            rewritten = result.rows_affected(),
            "Rewrote descendant parent paths"
        );
        Ok(result.rows_affected())
    }

    // --- Cursors and build flag ---

    async fn remote_cursor(&self) -> anyhow::Result<Option<ChangeCursor>> {
        Ok(self.cursors.remote_cursor().await?)
    }

    async fn set_remote_cursor(&self, cursor: &ChangeCursor) -> anyhow::Result<()> {
        Ok(self.cursors.set_remote_cursor(cursor).await?)
    }

    async fn journal_cursor(&self) -> anyhow::Result<Option<JournalCursor>> {
        Ok(self.cursors.journal_cursor().await?)
    }

    async fn set_journal_cursor(&self, cursor: JournalCursor) -> anyhow::Result<()> {
        Ok(self.cursors.set_journal_cursor(cursor).await?)
    }

    async fn catalog_built(&self) -> anyhow::Result<bool> {
        Ok(self.cursors.catalog_built().await?)
    }

    async fn set_catalog_built(&self, built: bool) -> anyhow::Result<()> {
        Ok(self.cursors.set_catalog_built(built).await?)
    }
}
