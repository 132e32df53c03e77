//! Per-item operation executor
//!
//! Takes one popped item and performs the remote or local side effect its
//! state demands, then settles the record: `Unchanged` on success, record
//! removal for deletions, in-flight postpone for locked files, sticky error
//! for everything else. The executor never picks items itself; the drain
//! loop feeds it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use docsync_core::config::SyncDirection;
use docsync_core::domain::{Item, ItemState};
use docsync_core::placeholder_path;
use docsync_core::ports::{IDocumentStore, IItemCatalog, ILocalFileSystem};

use crate::EngineError;

/// How one execution attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    /// The pending operation succeeded; the item is settled
    Completed,
    /// Transient obstacle (lock, direction gate); retry next pass
    Postponed,
    /// The catalog record was removed
    RecordDeleted,
}

/// Executes the pending operation of a single item
pub struct OperationExecutor {
    catalog: Arc<dyn IItemCatalog>,
    store: Arc<dyn IDocumentStore>,
    filesystem: Arc<dyn ILocalFileSystem>,
    root: PathBuf,
    direction: SyncDirection,
    headers_only: bool,
}

impl OperationExecutor {
    /// Creates an executor for the given root
    pub fn new(
        catalog: Arc<dyn IItemCatalog>,
        store: Arc<dyn IDocumentStore>,
        filesystem: Arc<dyn ILocalFileSystem>,
        root: PathBuf,
        direction: SyncDirection,
        headers_only: bool,
    ) -> Self {
        Self {
            catalog,
            store,
            filesystem,
            root,
            direction,
            headers_only,
        }
    }

    /// Processes one item and persists the outcome
    ///
    /// Operational failures never bubble up: they become the item's sticky
    /// error. The returned error covers catalog persistence only.
    pub async fn process(&self, mut item: Item) -> anyhow::Result<()> {
        let path = item.relative_path();
        match self.run_operation(&mut item).await {
            Ok(Step::Completed) => {
                debug!(path = %path, "Item settled");
                self.catalog.update(&item).await?;
            }
            Ok(Step::Postponed) => {
                debug!(path = %path, "Item postponed until next pass");
                self.catalog.mark_in_flight(item.id()).await?;
            }
            Ok(Step::RecordDeleted) => {}
            Err(e) => {
                let message = format!("{e:#}");
                warn!(path = %path, error = %message, "Item processing failed");
                item.mark_error(message);
                self.catalog.update(&item).await?;
            }
        }
        Ok(())
    }

    async fn run_operation(&self, item: &mut Item) -> anyhow::Result<Step> {
        let allowed = match item.state() {
            ItemState::Unchanged => return Ok(Step::Completed),
            ItemState::UpdatedLocal | ItemState::DeletedLocal | ItemState::RenamedLocal => {
                self.direction.allows_upload()
            }
            ItemState::UpdatedRemote | ItemState::DeletedRemote | ItemState::RenamedRemote => {
                self.direction.allows_download()
            }
            ItemState::Conflict => true,
        };
        if !allowed {
            return Ok(Step::Postponed);
        }

        match item.state() {
            ItemState::Unchanged => Ok(Step::Completed),
            ItemState::UpdatedLocal => self.push_local_update(item).await,
            ItemState::UpdatedRemote => self.pull_remote_update(item).await,
            ItemState::DeletedLocal => self.push_local_delete(item).await,
            ItemState::DeletedRemote => self.pull_remote_delete(item).await,
            ItemState::RenamedLocal => self.push_local_rename(item).await,
            ItemState::RenamedRemote => self.pull_remote_rename(item).await,
            ItemState::Conflict => self.keep_both(item).await,
        }
    }

    /// UpdatedLocal: upload the file (or create the remote folder) and
    /// adopt the remote id, version, and timestamp
    async fn push_local_update(&self, item: &mut Item) -> anyhow::Result<Step> {
        if item.is_folder() {
            self.store.ensure_folders(item.parent()).await?;
            let remote_id = self.store.create_folder(item.parent(), item.name()).await?;
            item.set_remote_id(remote_id);
            item.reset_to_unchanged();
            return Ok(Step::Completed);
        }

        let local = item.local_path(&self.root);
        let state = self.filesystem.get_state(&local).await?;
        if !state.exists {
            return Err(EngineError::LocalFileMissing(local).into());
        }
        if state.is_locked {
            return Ok(Step::Postponed);
        }

        self.store.ensure_folders(item.parent()).await?;
        let remote_id = self.store.upload(item.parent(), &local).await?;
        let (modified, etag) = self
            .store
            .get_timestamp_and_version(&item.relative_path())
            .await?;

        item.set_remote_id(remote_id);
        item.set_etag(etag);
        item.set_last_modified(modified);
        item.reset_to_unchanged();
        Ok(Step::Completed)
    }

    /// UpdatedRemote: materialize the remote content locally, either as a
    /// full download or as a placeholder in headers-only mode
    async fn pull_remote_update(&self, item: &mut Item) -> anyhow::Result<Step> {
        let local = item.local_path(&self.root);
        if item.is_folder() {
            self.filesystem.create_dir_all(&local).await?;
            item.reset_to_unchanged();
            return Ok(Step::Completed);
        }

        let placeholder = placeholder_path(&local);
        if self.filesystem.get_state(&placeholder).await?.exists {
            // Metadata already materialized; hydration happens on demand.
            item.reset_to_unchanged();
            return Ok(Step::Completed);
        }

        let state = self.filesystem.get_state(&local).await?;
        if state.exists {
            if state.is_locked {
                return Ok(Step::Postponed);
            }
            if let Some(local_modified) = state.modified {
                if local_modified > item.last_modified() {
                    // Edited locally after detection; the user's copy wins
                    // this round and the next reconcile sorts out the rest.
                    debug!(path = %item.relative_path(), "Local edit after detection, skipping download");
                    item.reset_to_unchanged();
                    return Ok(Step::Completed);
                }
            }
        }

        let (remote_modified, etag) = self
            .store
            .get_timestamp_and_version(&item.relative_path())
            .await?;

        if self.headers_only && !state.exists {
            self.filesystem
                .write_placeholder(&placeholder, remote_modified)
                .await?;
        } else {
            let target_folder = local
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| self.root.clone());
            self.filesystem.create_dir_all(&target_folder).await?;
            self.store
                .download(&item.relative_path(), &target_folder, remote_modified)
                .await?;
            self.filesystem.set_modified(&local, remote_modified).await?;
        }

        item.set_etag(etag);
        item.set_last_modified(remote_modified);
        item.reset_to_unchanged();
        Ok(Step::Completed)
    }

    /// DeletedLocal: delete the remote counterpart when one exists; the
    /// catalog record goes away either way
    async fn push_local_delete(&self, item: &mut Item) -> anyhow::Result<Step> {
        match item.remote_id() {
            Some(remote_id) => {
                let result = if item.is_folder() {
                    self.store.delete_folder(item.parent(), item.name()).await
                } else {
                    self.store.delete_file(remote_id).await
                };
                if let Err(e) = result {
                    warn!(
                        path = %item.relative_path(),
                        error = %format!("{e:#}"),
                        "Remote delete failed, dropping record anyway"
                    );
                }
            }
            None => {
                debug!(
                    path = %item.relative_path(),
                    "Never uploaded, nothing to delete remotely"
                );
            }
        }

        self.catalog.delete(item.id()).await?;
        Ok(Step::RecordDeleted)
    }

    /// DeletedRemote: move the local path (and its placeholder) to the
    /// system trash, then drop the record
    async fn pull_remote_delete(&self, item: &mut Item) -> anyhow::Result<Step> {
        let local = item.local_path(&self.root);
        let state = self.filesystem.get_state(&local).await?;
        if state.exists {
            if state.is_locked {
                return Ok(Step::Postponed);
            }
            self.filesystem.move_to_trash(&local).await?;
        }

        let placeholder = placeholder_path(&local);
        if self.filesystem.get_state(&placeholder).await?.exists {
            self.filesystem.move_to_trash(&placeholder).await?;
        }

        self.catalog.delete(item.id()).await?;
        Ok(Step::RecordDeleted)
    }

    /// RenamedLocal: rename the remote counterpart, then adopt the new name
    async fn push_local_rename(&self, item: &mut Item) -> anyhow::Result<Step> {
        let Some(new_name) = item.new_name().map(str::to_owned) else {
            return Err(EngineError::RenameWithoutName(item.relative_path()).into());
        };

        match item.remote_id() {
            Some(remote_id) => {
                self.store.rename(remote_id, &new_name).await?;
                item.apply_rename();
                item.reset_to_unchanged();
            }
            None => {
                // Never uploaded; upload happens under the new name.
                item.apply_rename();
                item.set_state(ItemState::UpdatedLocal);
            }
        }
        Ok(Step::Completed)
    }

    /// RenamedRemote: rename the local path, then adopt the new name
    async fn pull_remote_rename(&self, item: &mut Item) -> anyhow::Result<Step> {
        let Some(new_name) = item.new_name().map(str::to_owned) else {
            return Err(EngineError::RenameWithoutName(item.relative_path()).into());
        };

        let old_local = item.local_path(&self.root);
        let new_local = old_local
            .parent()
            .map(|p| p.join(&new_name))
            .unwrap_or_else(|| self.root.join(&new_name));

        let state = self.filesystem.get_state(&old_local).await?;
        if state.is_locked {
            return Ok(Step::Postponed);
        }
        if state.exists {
            self.filesystem.rename(&old_local, &new_local).await?;
        }

        let old_placeholder = placeholder_path(&old_local);
        if self.filesystem.get_state(&old_placeholder).await?.exists {
            self.filesystem
                .rename(&old_placeholder, &placeholder_path(&new_local))
                .await?;
        } else if !state.exists {
            // Nothing local to rename; fetch the content under the new name.
            item.apply_rename();
            item.set_state(ItemState::UpdatedRemote);
            return Ok(Step::Completed);
        }

        item.apply_rename();
        item.reset_to_unchanged();
        Ok(Step::Completed)
    }

    /// Conflict: keep both sides
    ///
    /// The local copy is preserved under a disambiguated name, the original
    /// is back-dated an hour so the remote copy reads as newer, and the
    /// cleared version token forces a fresh first-contact reconciliation.
    async fn keep_both(&self, item: &mut Item) -> anyhow::Result<Step> {
        let local = item.local_path(&self.root);
        let state = self.filesystem.get_state(&local).await?;
        if state.is_locked {
            return Ok(Step::Postponed);
        }

        let backdated = item.last_modified() - Duration::hours(1);
        if state.exists {
            let aside = conflict_copy_path(&local, &local_host_label(), Utc::now());
            self.filesystem.copy(&local, &aside).await?;
            self.filesystem.set_modified(&local, backdated).await?;
            debug!(
                path = %item.relative_path(),
                copy = %aside.display(),
                "Conflict resolved by keeping both copies"
            );
        }

        item.clear_etag();
        item.set_last_modified(backdated);
        item.reset_to_unchanged();
        Ok(Step::Completed)
    }
}

/// Disambiguated sibling name for the preserved local copy of a conflict
fn conflict_copy_path(local: &Path, host: &str, now: DateTime<Utc>) -> PathBuf {
    let stem = local
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = local
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let name = format!("{stem}_{host}_{}{extension}", now.format("%Y%m%d%H%M%S"));
    local.with_file_name(name)
}

/// Host label for conflict copies; falls back when the environment does
/// not expose one
fn local_host_label() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "local".to_string())
}
