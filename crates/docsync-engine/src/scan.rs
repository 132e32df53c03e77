//! Full local rescan collector
//!
//! Walks the synchronized root and seeds the catalog with every file and
//! folder it does not know yet. Used for the initial build and for full
//! verification passes; incremental detection is the journal collector's
//! job.
//!
//! Folders are registered first (parents before children, sequentially) so
//! every file insert finds its containing folder already tracked; the
//! per-folder file scans then run bounded-parallel.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use docsync_core::config::IgnoreList;
use docsync_core::domain::{Item, ItemKind, ItemState};
use docsync_core::ports::{IItemCatalog, ILocalFileSystem};
use docsync_core::{is_placeholder_path, STORE_FOLDER};

/// Collector performing the full local rescan
pub struct RescanCollector {
    catalog: Arc<dyn IItemCatalog>,
    filesystem: Arc<dyn ILocalFileSystem>,
    root: PathBuf,
    ignore: IgnoreList,
    workers: usize,
}

impl RescanCollector {
    /// Creates a rescan collector for the given root
    pub fn new(
        catalog: Arc<dyn IItemCatalog>,
        filesystem: Arc<dyn ILocalFileSystem>,
        root: PathBuf,
        ignore: IgnoreList,
        workers: usize,
    ) -> Self {
        Self {
            catalog,
            filesystem,
            root,
            ignore,
            workers: workers.max(1),
        }
    }

    /// Runs a full rescan; returns the number of newly discovered items
    ///
    /// Also detects local deletions: tracked, clean file records whose
    /// local path no longer exists are marked `DeletedLocal`.
    pub async fn run(&self) -> anyhow::Result<u64> {
        let folders = self.collect_folders().await?;
        let mut discovered = self.register_folders(&folders).await?;
        discovered += self.scan_files(&folders).await?;
        discovered += self.detect_deletions().await?;

        info!(discovered, "Rescan complete");
        Ok(discovered)
    }

    /// Breadth-first walk collecting root-relative folder paths
    ///
    /// The empty string (the root itself) is always first; children follow
    /// their parents. Hidden entries, the store folder, and ignore matches
    /// are pruned together with their subtrees.
    async fn collect_folders(&self) -> anyhow::Result<Vec<String>> {
        let mut folders = vec![String::new()];
        let mut queue = std::collections::VecDeque::from([String::new()]);

        while let Some(rel) = queue.pop_front() {
            let abs = self.absolute(&rel);
            let mut entries = match tokio::fs::read_dir(&abs).await {
                Ok(e) => e,
                Err(e) => {
                    warn!(path = %abs.display(), error = %e, "Cannot read directory, skipping");
                    continue;
                }
            };

            while let Some(entry) = entries.next_entry().await? {
                let file_type = entry.file_type().await?;
                if !file_type.is_dir() {
                    continue;
                }
                let name = entry.file_name().to_string_lossy().into_owned();
                let child_rel = join_rel(&rel, &name);
                if self.skip(&name, &child_rel) {
                    continue;
                }
                folders.push(child_rel.clone());
                queue.push_back(child_rel);
            }
        }

        Ok(folders)
    }

    /// Registers every untracked folder, parents before children
    async fn register_folders(&self, folders: &[String]) -> anyhow::Result<u64> {
        let mut discovered = 0;
        for rel in folders.iter().filter(|r| !r.is_empty()) {
            let (parent, name) = split_rel(rel);
            if self.catalog.get_by_path(parent, name).await?.is_some() {
                continue;
            }
            let modified = self.modified_of(&self.absolute(rel)).await;
            let item = Item::new_local(parent, name, ItemKind::Folder, modified);
            debug!(path = %rel, "Discovered local folder");
            self.catalog.insert(&item).await?;
            discovered += 1;
        }
        Ok(discovered)
    }

    /// Scans the files of every folder, bounded by the worker permit count
    async fn scan_files(&self, folders: &[String]) -> anyhow::Result<u64> {
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut tasks: JoinSet<anyhow::Result<u64>> = JoinSet::new();

        for rel in folders {
            let permit_source = semaphore.clone();
            let catalog = self.catalog.clone();
            let ignore = self.ignore.clone();
            let abs = self.absolute(rel);
            let rel = rel.clone();

            tasks.spawn(async move {
                let _permit = permit_source.acquire_owned().await?;
                scan_folder_files(catalog, ignore, abs, rel).await
            });
        }

        let mut discovered = 0;
        while let Some(result) = tasks.join_next().await {
            discovered += result??;
        }
        Ok(discovered)
    }

    /// Marks clean, tracked files whose local path disappeared
    async fn detect_deletions(&self) -> anyhow::Result<u64> {
        let mut detected = 0;
        for mut item in self.catalog.items_unchanged_clean(ItemKind::File).await? {
            let state = self.filesystem.get_state(&item.local_path(&self.root)).await?;
            if state.exists {
                continue;
            }
            debug!(path = %item.relative_path(), "Local file gone, marking deleted");
            item.mark_deleted(ItemState::DeletedLocal);
            self.catalog.update(&item).await?;
            detected += 1;
        }
        Ok(detected)
    }

    fn skip(&self, name: &str, rel: &str) -> bool {
        name == STORE_FOLDER
            || name.starts_with('.')
            || self.ignore.matches(name)
            || self.ignore.matches(rel)
    }

    fn absolute(&self, rel: &str) -> PathBuf {
        if rel.is_empty() {
            self.root.clone()
        } else {
            self.root.join(rel)
        }
    }

    async fn modified_of(&self, path: &Path) -> DateTime<Utc> {
        match self.filesystem.get_state(path).await {
            Ok(state) => state.modified.unwrap_or_else(Utc::now),
            Err(_) => Utc::now(),
        }
    }
}

/// Scans one folder's direct files and inserts the unknown ones
async fn scan_folder_files(
    catalog: Arc<dyn IItemCatalog>,
    ignore: IgnoreList,
    abs: PathBuf,
    rel: String,
) -> anyhow::Result<u64> {
    let mut discovered = 0;
    let mut entries = match tokio::fs::read_dir(&abs).await {
        Ok(e) => e,
        Err(e) => {
            warn!(path = %abs.display(), error = %e, "Cannot read directory, skipping");
            return Ok(0);
        }
    };

    while let Some(entry) = entries.next_entry().await? {
        let metadata = entry.metadata().await?;
        if !metadata.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let child_rel = join_rel(&rel, &name);
        if name.starts_with('.')
            || is_placeholder_path(Path::new(&name))
            || ignore.matches(&name)
            || ignore.matches(&child_rel)
        {
            continue;
        }
        if catalog.get_by_path(&rel, &name).await?.is_some() {
            continue;
        }

        let modified = metadata
            .modified()
            .ok()
            .and_then(|st| {
                st.duration_since(std::time::UNIX_EPOCH).ok().and_then(|d| {
                    DateTime::from_timestamp(d.as_secs() as i64, d.subsec_nanos())
                })
            })
            .unwrap_or_else(Utc::now);

        let item = Item::new_local(rel.clone(), name, ItemKind::File, modified);
        debug!(path = %child_rel, "Discovered local file");
        catalog.insert(&item).await?;
        discovered += 1;
    }

    Ok(discovered)
}

fn join_rel(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}

fn split_rel(rel: &str) -> (&str, &str) {
    match rel.rsplit_once('/') {
        Some((parent, name)) => (parent, name),
        None => ("", rel),
    }
}
