//! Local filesystem port (driven/secondary port)
//!
//! This module defines the interface for local filesystem operations the
//! orchestrator needs: state probing (including lock detection), renames,
//! trash, copies, and placeholder materialization. Directory walking for
//! rescans is the collector's own concern and is not part of the port.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Observed state of a local path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileSystemState {
    /// Whether the path exists
    pub exists: bool,
    /// Whether the path is a regular file
    pub is_file: bool,
    /// Size in bytes (0 for directories and missing paths)
    pub size: u64,
    /// Modification time, if the path exists
    pub modified: Option<DateTime<Utc>>,
    /// Whether another process holds the file open exclusively
    pub is_locked: bool,
}

impl FileSystemState {
    /// State of a path that does not exist
    pub fn missing() -> Self {
        Self {
            exists: false,
            is_file: false,
            size: 0,
            modified: None,
            is_locked: false,
        }
    }
}

/// Port trait for local filesystem operations
#[async_trait::async_trait]
pub trait ILocalFileSystem: Send + Sync {
    /// Probes the state of a path, including a lock check for files
    async fn get_state(&self, path: &Path) -> anyhow::Result<FileSystemState>;

    /// Creates a directory and any missing parents
    async fn create_dir_all(&self, path: &Path) -> anyhow::Result<()>;

    /// Renames or moves a file or folder
    async fn rename(&self, from: &Path, to: &Path) -> anyhow::Result<()>;

    /// Copies a file
    async fn copy(&self, from: &Path, to: &Path) -> anyhow::Result<()>;

    /// Moves a file or folder to the system trash
    async fn move_to_trash(&self, path: &Path) -> anyhow::Result<()>;

    /// Sets the modification time of a path
    async fn set_modified(&self, path: &Path, modified: DateTime<Utc>) -> anyhow::Result<()>;

    /// Creates a zero-content placeholder file stamped with the given
    /// modification time
    async fn write_placeholder(&self, path: &Path, modified: DateTime<Utc>)
        -> anyhow::Result<()>;
}
