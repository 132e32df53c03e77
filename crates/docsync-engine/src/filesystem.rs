//! Local filesystem adapter (secondary/driven adapter)
//!
//! Implements [`ILocalFileSystem`] using `tokio::fs` for async file
//! operations.
//!
//! ## Design Decisions
//!
//! - **Atomic placeholder writes**: write-to-temp + rename so a crash can
//!   never leave a partial placeholder.
//! - **Lock detection**: attempts an exclusive open via `spawn_blocking` to
//!   check whether another process holds the file.
//! - **Trash, not delete**: remote-initiated deletions move local files to
//!   the system trash so the user can recover them.

use std::io::ErrorKind;
use std::path::Path;

use chrono::{DateTime, Utc};
use filetime::FileTime;
use tracing::{debug, instrument};

use docsync_core::ports::{FileSystemState, ILocalFileSystem};

/// Adapter that bridges the [`ILocalFileSystem`] port to the real filesystem.
///
/// Zero-sized: all operations derive their context from the path arguments.
#[derive(Debug, Clone, Default)]
pub struct LocalFileSystemAdapter;

impl LocalFileSystemAdapter {
    /// Create a new `LocalFileSystemAdapter`.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl ILocalFileSystem for LocalFileSystemAdapter {
    // stat + lock probe
    #[instrument(skip(self), fields(path = %path.display()))]
    async fn get_state(&self, path: &Path) -> anyhow::Result<FileSystemState> {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("path not found");
                return Ok(FileSystemState::missing());
            }
            Err(e) => return Err(e.into()),
        };

        let is_file = metadata.is_file();
        let size = metadata.len();

        let modified = metadata.modified().ok().and_then(|st| {
            st.duration_since(std::time::UNIX_EPOCH)
                .ok()
                .and_then(|dur| DateTime::from_timestamp(dur.as_secs() as i64, dur.subsec_nanos()))
        });

        // Detect a lock by attempting an exclusive write-open from a blocking
        // thread. WouldBlock or PermissionDenied on an existing file means
        // another process holds it.
        let is_locked = if is_file {
            let p_owned = path.to_path_buf();
            tokio::task::spawn_blocking(move || {
                use std::fs::OpenOptions;
                match OpenOptions::new().write(true).open(&p_owned) {
                    Ok(_) => false,
                    Err(e)
                        if e.kind() == ErrorKind::WouldBlock
                            || e.kind() == ErrorKind::PermissionDenied =>
                    {
                        true
                    }
                    // Any other error (e.g. file disappeared) - not locked.
                    Err(_) => false,
                }
            })
            .await?
        } else {
            false
        };

        debug!(exists = true, is_file, size, is_locked, "state retrieved");

        Ok(FileSystemState {
            exists: true,
            is_file,
            size,
            modified,
            is_locked,
        })
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    async fn create_dir_all(&self, path: &Path) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(path).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(from = %from.display(), to = %to.display()))]
    async fn rename(&self, from: &Path, to: &Path) -> anyhow::Result<()> {
        tokio::fs::rename(from, to).await?;
        debug!("rename complete");
        Ok(())
    }

    #[instrument(skip(self), fields(from = %from.display(), to = %to.display()))]
    async fn copy(&self, from: &Path, to: &Path) -> anyhow::Result<()> {
        let bytes = tokio::fs::copy(from, to).await?;
        debug!(bytes, "copy complete");
        Ok(())
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    async fn move_to_trash(&self, path: &Path) -> anyhow::Result<()> {
        let p = path.to_path_buf();
        tokio::task::spawn_blocking(move || trash::delete(&p)).await??;
        debug!("moved to trash");
        Ok(())
    }

    #[instrument(skip(self), fields(path = %path.display(), modified = %modified))]
    async fn set_modified(&self, path: &Path, modified: DateTime<Utc>) -> anyhow::Result<()> {
        let p = path.to_path_buf();
        let mtime = FileTime::from_unix_time(modified.timestamp(), modified.timestamp_subsec_nanos());
        tokio::task::spawn_blocking(move || filetime::set_file_mtime(&p, mtime)).await??;
        Ok(())
    }

    // Zero-content marker stamped with the remote modification time.
    #[instrument(skip(self), fields(path = %path.display()))]
    async fn write_placeholder(
        &self,
        path: &Path,
        modified: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Write to a temporary file in the same directory so rename is
        // atomic (same filesystem).
        let tmp_path = {
            let mut p = path.as_os_str().to_owned();
            p.push(".tmp");
            std::path::PathBuf::from(p)
        };

        tokio::fs::write(&tmp_path, b"").await?;
        tokio::fs::rename(&tmp_path, path).await?;
        self.set_modified(path, modified).await?;

        debug!("placeholder written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use tempfile::TempDir;

    use super::*;

    #[tokio::test]
    async fn test_get_state_existing_file() {
        let dir = TempDir::new().unwrap();
        let fs = LocalFileSystemAdapter::new();
        let path = dir.path().join("state.txt");
        tokio::fs::write(&path, b"twelve bytes").await.unwrap();

        let state = fs.get_state(&path).await.unwrap();
        assert!(state.exists);
        assert!(state.is_file);
        assert_eq!(state.size, 12);
        assert!(state.modified.is_some());
        assert!(!state.is_locked);
    }

    #[tokio::test]
    async fn test_get_state_directory() {
        let dir = TempDir::new().unwrap();
        let fs = LocalFileSystemAdapter::new();
        let sub = dir.path().join("mydir");
        fs.create_dir_all(&sub).await.unwrap();

        let state = fs.get_state(&sub).await.unwrap();
        assert!(state.exists);
        assert!(!state.is_file);
        assert!(!state.is_locked);
    }

    #[tokio::test]
    async fn test_get_state_not_found() {
        let dir = TempDir::new().unwrap();
        let fs = LocalFileSystemAdapter::new();

        let state = fs.get_state(&dir.path().join("nope.txt")).await.unwrap();
        assert!(!state.exists);
        assert_eq!(state.size, 0);
        assert!(state.modified.is_none());
    }

    #[tokio::test]
    async fn test_rename_moves_file() {
        let dir = TempDir::new().unwrap();
        let fs = LocalFileSystemAdapter::new();
        let from = dir.path().join("old.txt");
        let to = dir.path().join("new.txt");
        tokio::fs::write(&from, b"data").await.unwrap();

        fs.rename(&from, &to).await.unwrap();

        assert!(!fs.get_state(&from).await.unwrap().exists);
        assert!(fs.get_state(&to).await.unwrap().exists);
    }

    #[tokio::test]
    async fn test_copy_preserves_source() {
        let dir = TempDir::new().unwrap();
        let fs = LocalFileSystemAdapter::new();
        let from = dir.path().join("a.txt");
        let to = dir.path().join("a_copy.txt");
        tokio::fs::write(&from, b"payload").await.unwrap();

        fs.copy(&from, &to).await.unwrap();

        assert!(fs.get_state(&from).await.unwrap().exists);
        assert_eq!(tokio::fs::read(&to).await.unwrap(), b"payload");
    }

    #[tokio::test]
    async fn test_set_modified_roundtrip() {
        let dir = TempDir::new().unwrap();
        let fs = LocalFileSystemAdapter::new();
        let path = dir.path().join("stamped.txt");
        tokio::fs::write(&path, b"x").await.unwrap();

        let when = Utc.with_ymd_and_hms(2024, 6, 1, 10, 30, 0).unwrap();
        fs.set_modified(&path, when).await.unwrap();

        let state = fs.get_state(&path).await.unwrap();
        assert_eq!(state.modified, Some(when));
    }

    #[tokio::test]
    async fn test_write_placeholder_is_empty_and_stamped() {
        let dir = TempDir::new().unwrap();
        let fs = LocalFileSystemAdapter::new();
        let path = dir.path().join("deep/report.odt.docsync");

        let when = Utc.with_ymd_and_hms(2024, 6, 1, 10, 30, 0).unwrap();
        fs.write_placeholder(&path, when).await.unwrap();

        let state = fs.get_state(&path).await.unwrap();
        assert!(state.exists);
        assert_eq!(state.size, 0);
        assert_eq!(state.modified, Some(when));
    }
}
