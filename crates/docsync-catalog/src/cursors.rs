//! Cursor and build-flag files in the hidden store folder
//!
//! The two sync cursors and the catalog-built flag are tiny values read at
//! startup and rewritten rarely, so they live as plain files next to the
//! database rather than inside it. Writes go through a temp file plus
//! rename so a crash can never leave a half-written cursor.

use std::path::{Path, PathBuf};

use docsync_core::domain::{ChangeCursor, JournalCursor};

use crate::CatalogError;

const REMOTE_CURSOR_FILE: &str = "remote.cursor";
const JOURNAL_CURSOR_FILE: &str = "journal.cursor";
const BUILT_FLAG_FILE: &str = "catalog.built";

/// File-backed storage for the per-root cursors and the build flag
pub struct CursorStore {
    store_dir: PathBuf,
}

impl CursorStore {
    /// Creates a cursor store rooted at the given hidden store folder
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::StoreFolderUnavailable` if the folder cannot
    /// be created; without write access to the store folder the whole root
    /// cannot be synchronized.
    pub fn new(store_dir: impl Into<PathBuf>) -> Result<Self, CatalogError> {
        let store_dir = store_dir.into();
        std::fs::create_dir_all(&store_dir).map_err(|e| {
            CatalogError::StoreFolderUnavailable(format!(
                "{}: {}",
                store_dir.display(),
                e
            ))
        })?;
        Ok(Self { store_dir })
    }

    /// Returns the store folder path
    pub fn store_dir(&self) -> &Path {
        &self.store_dir
    }

    /// The stored remote change cursor, if any
    pub async fn remote_cursor(&self) -> Result<Option<ChangeCursor>, CatalogError> {
        Ok(self
            .read_value(REMOTE_CURSOR_FILE)
            .await?
            .map(ChangeCursor::new))
    }

    /// Replaces the stored remote change cursor
    pub async fn set_remote_cursor(&self, cursor: &ChangeCursor) -> Result<(), CatalogError> {
        self.write_value(REMOTE_CURSOR_FILE, cursor.as_str()).await
    }

    /// The stored journal cursor, if any
    pub async fn journal_cursor(&self) -> Result<Option<JournalCursor>, CatalogError> {
        match self.read_value(JOURNAL_CURSOR_FILE).await? {
            Some(raw) => {
                let cursor = raw.parse::<JournalCursor>().map_err(|e| {
                    CatalogError::SerializationError(format!(
                        "Corrupt journal cursor '{}': {}",
                        raw.trim(),
                        e
                    ))
                })?;
                Ok(Some(cursor))
            }
            None => Ok(None),
        }
    }

    /// Replaces the stored journal cursor
    pub async fn set_journal_cursor(&self, cursor: JournalCursor) -> Result<(), CatalogError> {
        self.write_value(JOURNAL_CURSOR_FILE, &cursor.value().to_string())
            .await
    }

    /// True once the initial full reconciliation has completed
    pub async fn catalog_built(&self) -> Result<bool, CatalogError> {
        Ok(self.read_value(BUILT_FLAG_FILE).await?.is_some())
    }

    /// Sets or clears the catalog-built flag
    pub async fn set_catalog_built(&self, built: bool) -> Result<(), CatalogError> {
        let path = self.store_dir.join(BUILT_FLAG_FILE);
        if built {
            self.write_value(BUILT_FLAG_FILE, "1").await
        } else {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(CatalogError::QueryFailed(format!(
                    "Failed to clear {}: {}",
                    path.display(),
                    e
                ))),
            }
        }
    }

    async fn read_value(&self, file: &str) -> Result<Option<String>, CatalogError> {
        let path = self.store_dir.join(file);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CatalogError::QueryFailed(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    // Temp file plus rename keeps the value atomic on the same filesystem.
    async fn write_value(&self, file: &str, value: &str) -> Result<(), CatalogError> {
        let path = self.store_dir.join(file);
        let tmp_path = self.store_dir.join(format!("{file}.tmp"));

        tokio::fs::write(&tmp_path, value).await.map_err(|e| {
            CatalogError::QueryFailed(format!("Failed to write {}: {}", tmp_path.display(), e))
        })?;
        tokio::fs::rename(&tmp_path, &path).await.map_err(|e| {
            CatalogError::QueryFailed(format!("Failed to rename {}: {}", path.display(), e))
        })?;
        Ok(())
    }
}
