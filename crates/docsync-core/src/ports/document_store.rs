//! Document store port (driven/secondary port)
//!
//! This module defines the interface for the remote document store:
//! listing, delta fetching, and the per-item content operations the
//! orchestrator executes. Transport, authentication, and byte streaming
//! are the adapter's concern.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ChangeCursor, Etag, ItemKind, RemoteId};

/// One item as reported by the remote document store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteItem {
    /// Identifier on the remote store
    pub remote_id: RemoteId,
    /// Item name
    pub name: String,
    /// Root-relative parent folder path (empty for the root)
    pub parent: String,
    /// File or folder
    pub kind: ItemKind,
    /// Version token
    pub etag: Etag,
    /// Remote modification time
    pub modified: DateTime<Utc>,
}

impl RemoteItem {
    /// Root-relative path of the item
    pub fn relative_path(&self) -> String {
        if self.parent.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", self.parent, self.name)
        }
    }
}

/// Kind of change carried by a remote delta
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteDeltaKind {
    /// Item created remotely
    Add,
    /// Item content or metadata changed remotely
    Update,
    /// Item renamed remotely (the delta carries the new name)
    Rename,
    /// Item removed remotely
    DeleteObject,
}

/// One remote change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteDelta {
    /// What happened
    pub kind: RemoteDeltaKind,
    /// The item after the change
    pub item: RemoteItem,
}

/// Result of a delta fetch: the changes plus the cursor to resume from
#[derive(Debug, Clone, PartialEq)]
pub struct DeltaBatch {
    /// Remote changes since the requested cursor
    pub deltas: Vec<RemoteDelta>,
    /// Cursor to store once the batch is fully processed
    pub cursor: ChangeCursor,
}

/// Port trait for the remote document store
///
/// Folder arguments are root-relative paths; file content moves through
/// local paths so the adapter can stream without buffering in the core.
#[async_trait::async_trait]
pub trait IDocumentStore: Send + Sync {
    /// Full listing of every item under the remote root (rescan fallback)
    async fn list_all(&self) -> anyhow::Result<Vec<RemoteItem>>;

    /// Changes since `cursor`; `None` requests changes from the beginning
    async fn fetch_deltas(&self, cursor: Option<&ChangeCursor>) -> anyhow::Result<DeltaBatch>;

    /// Uploads a local file into the remote folder, returning its remote id
    async fn upload(&self, folder: &str, local_file: &Path) -> anyhow::Result<RemoteId>;

    /// Downloads the named remote file into `target_folder`, stamping the
    /// given modification time on the result
    async fn download(
        &self,
        relative_file: &str,
        target_folder: &Path,
        modified: DateTime<Utc>,
    ) -> anyhow::Result<()>;

    /// Deletes a remote file
    async fn delete_file(&self, remote_id: RemoteId) -> anyhow::Result<()>;

    /// Renames a remote item
    async fn rename(&self, remote_id: RemoteId, new_name: &str) -> anyhow::Result<()>;

    /// Creates a remote folder, returning its remote id
    async fn create_folder(&self, folder: &str, name: &str) -> anyhow::Result<RemoteId>;

    /// Deletes a remote folder
    async fn delete_folder(&self, folder: &str, name: &str) -> anyhow::Result<()>;

    /// Creates any missing folders along the given root-relative path
    async fn ensure_folders(&self, folder: &str) -> anyhow::Result<()>;

    /// Current modification time and version token of a remote file
    async fn get_timestamp_and_version(
        &self,
        relative_file: &str,
    ) -> anyhow::Result<(DateTime<Utc>, Etag)>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_item_relative_path() {
        let item = RemoteItem {
            remote_id: RemoteId::new(1),
            name: "a.txt".to_string(),
            parent: "docs".to_string(),
            kind: ItemKind::File,
            etag: Etag::new(1),
            modified: Utc::now(),
        };
        assert_eq!(item.relative_path(), "docs/a.txt");

        let root_item = RemoteItem {
            parent: String::new(),
            ..item
        };
        assert_eq!(root_item.relative_path(), "a.txt");
    }
}
