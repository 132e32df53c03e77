//! Integration tests for the sync engine
//!
//! Exercise the full build / collect / drain cycle against a real SQLite
//! catalog and a real temp-directory root, with the remote store, the
//! change journal, and the lock/trash parts of the filesystem mocked.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;

use docsync_catalog::SqliteItemCatalog;
use docsync_core::config::SyncConfig;
use docsync_core::domain::{
    ChangeCursor, Etag, Item, ItemKind, ItemState, JournalCursor, RemoteId,
};
use docsync_core::ports::{
    reason, DeltaBatch, FileSystemState, IChangeJournal, IDocumentStore, IItemCatalog,
    ILocalFileSystem, JournalBatch, JournalEntry, RemoteDelta, RemoteDeltaKind, RemoteItem,
};
use docsync_core::{placeholder_path, STORE_FOLDER};
use docsync_engine::engine::SyncEngine;
use docsync_engine::filesystem::LocalFileSystemAdapter;

fn remote_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap()
}

// ============================================================================
// Mock remote document store
// ============================================================================

#[derive(Default)]
struct MockStore {
    listing: Mutex<Vec<RemoteItem>>,
    delta_batches: Mutex<VecDeque<DeltaBatch>>,
    uploads: Mutex<Vec<String>>,
    downloads: Mutex<Vec<String>>,
    deleted_files: Mutex<Vec<RemoteId>>,
    deleted_folders: Mutex<Vec<String>>,
    renames: Mutex<Vec<(RemoteId, String)>>,
    created_folders: Mutex<Vec<String>>,
    next_id: AtomicI64,
}

impl MockStore {
    fn new() -> Self {
        Self {
            next_id: AtomicI64::new(100),
            ..Default::default()
        }
    }

    fn with_listing(self, listing: Vec<RemoteItem>) -> Self {
        *self.listing.lock().unwrap() = listing;
        self
    }

    fn queue_deltas(&self, deltas: Vec<RemoteDelta>, cursor: &str) {
        self.delta_batches.lock().unwrap().push_back(DeltaBatch {
            deltas,
            cursor: ChangeCursor::new(cursor),
        });
    }

    fn uploads(&self) -> Vec<String> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl IDocumentStore for MockStore {
    async fn list_all(&self) -> anyhow::Result<Vec<RemoteItem>> {
        Ok(self.listing.lock().unwrap().clone())
    }

    async fn fetch_deltas(&self, cursor: Option<&ChangeCursor>) -> anyhow::Result<DeltaBatch> {
        let queued = self.delta_batches.lock().unwrap().pop_front();
        Ok(queued.unwrap_or_else(|| DeltaBatch {
            deltas: Vec::new(),
            cursor: cursor.cloned().unwrap_or_else(|| ChangeCursor::new("0")),
        }))
    }

    async fn upload(&self, folder: &str, local_file: &Path) -> anyhow::Result<RemoteId> {
        let name = local_file.file_name().unwrap().to_string_lossy().into_owned();
        let rel = if folder.is_empty() {
            name
        } else {
            format!("{folder}/{name}")
        };
        self.uploads.lock().unwrap().push(rel);
        Ok(RemoteId::new(self.next_id.fetch_add(1, Ordering::SeqCst)))
    }

    async fn download(
        &self,
        relative_file: &str,
        target_folder: &Path,
        _modified: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        self.downloads.lock().unwrap().push(relative_file.to_string());
        let name = relative_file.rsplit('/').next().unwrap();
        tokio::fs::write(target_folder.join(name), b"remote content").await?;
        Ok(())
    }

    async fn delete_file(&self, remote_id: RemoteId) -> anyhow::Result<()> {
        self.deleted_files.lock().unwrap().push(remote_id);
        Ok(())
    }

    async fn rename(&self, remote_id: RemoteId, new_name: &str) -> anyhow::Result<()> {
        self.renames
            .lock()
            .unwrap()
            .push((remote_id, new_name.to_string()));
        Ok(())
    }

    async fn create_folder(&self, folder: &str, name: &str) -> anyhow::Result<RemoteId> {
        let rel = if folder.is_empty() {
            name.to_string()
        } else {
            format!("{folder}/{name}")
        };
        self.created_folders.lock().unwrap().push(rel);
        Ok(RemoteId::new(self.next_id.fetch_add(1, Ordering::SeqCst)))
    }

    async fn delete_folder(&self, folder: &str, name: &str) -> anyhow::Result<()> {
        let rel = if folder.is_empty() {
            name.to_string()
        } else {
            format!("{folder}/{name}")
        };
        self.deleted_folders.lock().unwrap().push(rel);
        Ok(())
    }

    async fn ensure_folders(&self, _folder: &str) -> anyhow::Result<()> {
        Ok(())
    }

    async fn get_timestamp_and_version(
        &self,
        _relative_file: &str,
    ) -> anyhow::Result<(DateTime<Utc>, Etag)> {
        Ok((remote_time(), Etag::new(1)))
    }
}

// ============================================================================
// Mock change journal
// ============================================================================

#[derive(Default)]
struct MockJournal {
    batches: Mutex<VecDeque<JournalBatch>>,
    parents: Mutex<std::collections::HashMap<u64, PathBuf>>,
    failing_refs: Mutex<HashSet<u64>>,
    end_cursor: Mutex<u64>,
}

impl MockJournal {
    fn new() -> Self {
        Self::default()
    }

    fn map_parent(&self, parent_ref: u64, path: PathBuf) {
        self.parents.lock().unwrap().insert(parent_ref, path);
    }

    fn fail_parent(&self, parent_ref: u64) {
        self.failing_refs.lock().unwrap().insert(parent_ref);
    }

    fn queue(&self, entries: Vec<JournalEntry>, next_cursor: u64) {
        *self.end_cursor.lock().unwrap() = next_cursor;
        self.batches.lock().unwrap().push_back(JournalBatch {
            entries,
            next_cursor: JournalCursor::new(next_cursor),
        });
    }
}

#[async_trait::async_trait]
impl IChangeJournal for MockJournal {
    async fn cursor_state(&self) -> anyhow::Result<JournalCursor> {
        Ok(JournalCursor::new(*self.end_cursor.lock().unwrap()))
    }

    async fn read_entries_since(
        &self,
        cursor: JournalCursor,
        _mask: u32,
    ) -> anyhow::Result<JournalBatch> {
        let queued = self.batches.lock().unwrap().pop_front();
        Ok(queued.unwrap_or(JournalBatch {
            entries: Vec::new(),
            next_cursor: cursor,
        }))
    }

    async fn resolve_parent_path(&self, parent_ref: u64) -> anyhow::Result<Option<PathBuf>> {
        if self.failing_refs.lock().unwrap().contains(&parent_ref) {
            anyhow::bail!("Journal parent lookup failed for ref {parent_ref}");
        }
        Ok(self.parents.lock().unwrap().get(&parent_ref).cloned())
    }
}

// ============================================================================
// Filesystem wrapper adding lock simulation and trash recording
// ============================================================================

struct TestFileSystem {
    inner: LocalFileSystemAdapter,
    locked: Mutex<HashSet<PathBuf>>,
    failing: Mutex<HashSet<PathBuf>>,
    trashed: Mutex<Vec<PathBuf>>,
}

impl TestFileSystem {
    fn new() -> Self {
        Self {
            inner: LocalFileSystemAdapter::new(),
            locked: Mutex::new(HashSet::new()),
            failing: Mutex::new(HashSet::new()),
            trashed: Mutex::new(Vec::new()),
        }
    }

    fn lock_path(&self, path: PathBuf) {
        self.locked.lock().unwrap().insert(path);
    }

    fn fail_state(&self, path: PathBuf) {
        self.failing.lock().unwrap().insert(path);
    }

    fn trashed(&self) -> Vec<PathBuf> {
        self.trashed.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ILocalFileSystem for TestFileSystem {
    async fn get_state(&self, path: &Path) -> anyhow::Result<FileSystemState> {
        if self.failing.lock().unwrap().contains(path) {
            anyhow::bail!("Stat failed for {}", path.display());
        }
        let mut state = self.inner.get_state(path).await?;
        if self.locked.lock().unwrap().contains(path) {
            state.is_locked = true;
        }
        Ok(state)
    }

    async fn create_dir_all(&self, path: &Path) -> anyhow::Result<()> {
        self.inner.create_dir_all(path).await
    }

    async fn rename(&self, from: &Path, to: &Path) -> anyhow::Result<()> {
        self.inner.rename(from, to).await
    }

    async fn copy(&self, from: &Path, to: &Path) -> anyhow::Result<()> {
        self.inner.copy(from, to).await
    }

    async fn move_to_trash(&self, path: &Path) -> anyhow::Result<()> {
        self.trashed.lock().unwrap().push(path.to_path_buf());
        if tokio::fs::metadata(path).await?.is_dir() {
            tokio::fs::remove_dir_all(path).await?;
        } else {
            tokio::fs::remove_file(path).await?;
        }
        Ok(())
    }

    async fn set_modified(&self, path: &Path, modified: DateTime<Utc>) -> anyhow::Result<()> {
        self.inner.set_modified(path, modified).await
    }

    async fn write_placeholder(
        &self,
        path: &Path,
        modified: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        self.inner.write_placeholder(path, modified).await
    }
}

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    _dir: TempDir,
    root: PathBuf,
    catalog: Arc<SqliteItemCatalog>,
    store: Arc<MockStore>,
    journal: Arc<MockJournal>,
    fs: Arc<TestFileSystem>,
    engine: Arc<SyncEngine>,
}

async fn harness_with(config: SyncConfig, store: MockStore) -> Harness {
    let dir = TempDir::new().expect("tempdir");
    let root = dir.path().to_path_buf();
    let catalog = Arc::new(SqliteItemCatalog::open(&root).await.expect("catalog"));
    let store = Arc::new(store);
    let journal = Arc::new(MockJournal::new());
    let fs = Arc::new(TestFileSystem::new());

    let engine = SyncEngine::new(
        catalog.clone(),
        store.clone(),
        journal.clone(),
        fs.clone(),
        None,
        config,
        root.clone(),
    )
    .expect("engine");
    let engine = Arc::new(engine);

    Harness {
        _dir: dir,
        root,
        catalog,
        store,
        journal,
        fs,
        engine,
    }
}

async fn harness() -> Harness {
    harness_with(SyncConfig::default(), MockStore::new()).await
}

fn remote_file(id: i64, parent: &str, name: &str) -> RemoteItem {
    RemoteItem {
        remote_id: RemoteId::new(id),
        name: name.to_string(),
        parent: parent.to_string(),
        kind: ItemKind::File,
        etag: Etag::new(1),
        modified: remote_time(),
    }
}

fn remote_folder(id: i64, parent: &str, name: &str) -> RemoteItem {
    RemoteItem {
        kind: ItemKind::Folder,
        ..remote_file(id, parent, name)
    }
}

async fn item_at(h: &Harness, parent: &str, name: &str) -> Option<Item> {
    h.catalog.get_by_path(parent, name).await.unwrap()
}

// ============================================================================
// Build and steady-state cycles
// ============================================================================

#[tokio::test]
async fn test_initial_build_pushes_local_and_pulls_remote() {
    let store = MockStore::new().with_listing(vec![
        remote_folder(10, "", "docs"),
        remote_file(11, "docs", "spec.odt"),
    ]);
    let h = harness_with(SyncConfig::default(), store).await;

    tokio::fs::write(h.root.join("notes.txt"), b"local notes")
        .await
        .unwrap();

    let processed = h.engine.run_once().await.unwrap();
    assert_eq!(processed, 3);

    assert_eq!(h.store.uploads(), vec!["notes.txt".to_string()]);
    assert_eq!(
        *h.store.downloads.lock().unwrap(),
        vec!["docs/spec.odt".to_string()]
    );
    assert!(h.root.join("docs/spec.odt").exists());
    assert!(h.catalog.catalog_built().await.unwrap());

    for path in [("", "notes.txt"), ("", "docs"), ("docs", "spec.odt")] {
        let item = item_at(&h, path.0, path.1).await.expect("tracked");
        assert_eq!(item.state(), ItemState::Unchanged, "{path:?}");
        assert!(item.remote_id().is_some(), "{path:?}");
    }
}

#[tokio::test]
async fn test_second_run_is_idempotent() {
    let h = harness().await;
    tokio::fs::write(h.root.join("a.txt"), b"x").await.unwrap();

    h.engine.run_once().await.unwrap();
    let processed = h.engine.run_once().await.unwrap();

    assert_eq!(processed, 0);
    assert_eq!(h.store.uploads().len(), 1);
}

#[tokio::test]
async fn test_store_folder_is_never_tracked() {
    let h = harness().await;
    tokio::fs::write(h.root.join("a.txt"), b"x").await.unwrap();

    h.engine.run_once().await.unwrap();

    // The catalog database lives under the store folder inside the root.
    assert!(h.root.join(STORE_FOLDER).exists());
    let all = h.catalog.items_in_subtree("").await.unwrap();
    assert!(all.iter().all(|i| !i.relative_path().contains(STORE_FOLDER)));
    assert_eq!(all.len(), 1);
}

#[tokio::test]
async fn test_ignored_files_are_not_tracked() {
    let h = harness().await;
    tokio::fs::write(h.root.join("~$draft.docx"), b"lock").await.unwrap();
    tokio::fs::write(h.root.join("scratch.tmp"), b"tmp").await.unwrap();
    tokio::fs::write(h.root.join("real.txt"), b"keep").await.unwrap();

    h.engine.run_once().await.unwrap();

    assert_eq!(h.store.uploads(), vec!["real.txt".to_string()]);
    assert!(item_at(&h, "", "~$draft.docx").await.is_none());
    assert!(item_at(&h, "", "scratch.tmp").await.is_none());
}

#[tokio::test]
async fn test_start_drains_backlog_without_new_changes() {
    let h = harness().await;
    tokio::fs::write(h.root.join("leftover.txt"), b"pending")
        .await
        .unwrap();
    h.catalog.set_catalog_built(true).await.unwrap();
    h.catalog
        .insert(&Item::new_local("", "leftover.txt", ItemKind::File, remote_time()))
        .await
        .unwrap();
    assert_eq!(h.catalog.count_to_process().await.unwrap(), 1);

    // No journal entries and no remote deltas arrive while running; only
    // the item already pending at startup is there to process.
    h.engine.start().await;
    let mut drained = false;
    for _ in 0..50 {
        if h.catalog.count_to_process().await.unwrap() == 0 {
            drained = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
    h.engine.stop().await;

    assert!(drained, "pending backlog was not processed after start");
    assert_eq!(h.store.uploads(), vec!["leftover.txt".to_string()]);
    let after = item_at(&h, "", "leftover.txt").await.expect("tracked");
    assert_eq!(after.state(), ItemState::Unchanged);
}

// ============================================================================
// Journal-driven local changes
// ============================================================================

#[tokio::test]
async fn test_journal_create_is_uploaded() {
    let h = harness().await;
    h.engine.run_once().await.unwrap();

    tokio::fs::write(h.root.join("fresh.txt"), b"new").await.unwrap();
    h.journal.map_parent(1, h.root.clone());
    h.journal.queue(
        vec![JournalEntry {
            file_ref: 42,
            parent_ref: 1,
            name: "fresh.txt".to_string(),
            reason: reason::FILE_CREATE | reason::CLOSE,
            is_directory: false,
        }],
        10,
    );

    h.engine.run_once().await.unwrap();

    assert_eq!(h.store.uploads(), vec!["fresh.txt".to_string()]);
    let item = item_at(&h, "", "fresh.txt").await.expect("tracked");
    assert_eq!(item.state(), ItemState::Unchanged);
    assert_eq!(
        h.catalog.journal_cursor().await.unwrap(),
        Some(JournalCursor::new(10))
    );
}

#[tokio::test]
async fn test_journal_rename_renames_remote() {
    let h = harness().await;
    tokio::fs::write(h.root.join("old.txt"), b"x").await.unwrap();
    h.engine.run_once().await.unwrap();

    tokio::fs::rename(h.root.join("old.txt"), h.root.join("new.txt"))
        .await
        .unwrap();
    h.journal.map_parent(1, h.root.clone());
    h.journal.queue(
        vec![
            JournalEntry {
                file_ref: 7,
                parent_ref: 1,
                name: "old.txt".to_string(),
                reason: reason::RENAME_OLD_NAME,
                is_directory: false,
            },
            JournalEntry {
                file_ref: 7,
                parent_ref: 1,
                name: "new.txt".to_string(),
                reason: reason::RENAME_NEW_NAME | reason::CLOSE,
                is_directory: false,
            },
        ],
        20,
    );

    h.engine.run_once().await.unwrap();

    let renames = h.store.renames.lock().unwrap().clone();
    assert_eq!(renames.len(), 1);
    assert_eq!(renames[0].1, "new.txt");

    assert!(item_at(&h, "", "old.txt").await.is_none());
    let item = item_at(&h, "", "new.txt").await.expect("renamed");
    assert_eq!(item.state(), ItemState::Unchanged);
}

#[tokio::test]
async fn test_journal_delete_removes_remote_file() {
    let h = harness().await;
    tokio::fs::write(h.root.join("doomed.txt"), b"x").await.unwrap();
    h.engine.run_once().await.unwrap();
    let remote_id = item_at(&h, "", "doomed.txt").await.unwrap().remote_id().unwrap();

    tokio::fs::remove_file(h.root.join("doomed.txt")).await.unwrap();
    h.journal.map_parent(1, h.root.clone());
    h.journal.queue(
        vec![JournalEntry {
            file_ref: 3,
            parent_ref: 1,
            name: "doomed.txt".to_string(),
            reason: reason::FILE_DELETE | reason::CLOSE,
            is_directory: false,
        }],
        30,
    );

    h.engine.run_once().await.unwrap();

    assert_eq!(*h.store.deleted_files.lock().unwrap(), vec![remote_id]);
    assert!(item_at(&h, "", "doomed.txt").await.is_none());
}

#[tokio::test]
async fn test_journal_rename_then_delete_in_one_batch_deletes_remote() {
    let h = harness().await;
    tokio::fs::write(h.root.join("a.txt"), b"x").await.unwrap();
    h.engine.run_once().await.unwrap();
    let remote_id = item_at(&h, "", "a.txt").await.unwrap().remote_id().unwrap();

    // The file was renamed and then deleted before the engine observed
    // either step; the catalog still tracks it under the old name.
    tokio::fs::remove_file(h.root.join("a.txt")).await.unwrap();
    h.journal.map_parent(1, h.root.clone());
    h.journal.queue(
        vec![
            JournalEntry {
                file_ref: 7,
                parent_ref: 1,
                name: "a.txt".to_string(),
                reason: reason::RENAME_OLD_NAME,
                is_directory: false,
            },
            JournalEntry {
                file_ref: 7,
                parent_ref: 1,
                name: "b.txt".to_string(),
                reason: reason::RENAME_NEW_NAME | reason::CLOSE,
                is_directory: false,
            },
            JournalEntry {
                file_ref: 7,
                parent_ref: 1,
                name: "b.txt".to_string(),
                reason: reason::FILE_DELETE | reason::CLOSE,
                is_directory: false,
            },
        ],
        60,
    );

    h.engine.run_once().await.unwrap();

    assert_eq!(*h.store.deleted_files.lock().unwrap(), vec![remote_id]);
    assert!(item_at(&h, "", "a.txt").await.is_none());
    assert!(item_at(&h, "", "b.txt").await.is_none());
}

#[tokio::test]
async fn test_journal_failure_leaves_cursor_in_place() {
    let h = harness().await;
    h.engine.run_once().await.unwrap();
    let cursor_before = h.catalog.journal_cursor().await.unwrap();

    h.journal.fail_parent(99);
    h.journal.queue(
        vec![JournalEntry {
            file_ref: 1,
            parent_ref: 99,
            name: "whatever.txt".to_string(),
            reason: reason::FILE_CREATE,
            is_directory: false,
        }],
        50,
    );

    assert!(h.engine.run_once().await.is_err());
    assert_eq!(h.catalog.journal_cursor().await.unwrap(), cursor_before);
}

// ============================================================================
// Remote deltas
// ============================================================================

#[tokio::test]
async fn test_delta_add_downloads_and_advances_cursor() {
    let h = harness().await;
    h.engine.run_once().await.unwrap();

    h.store.queue_deltas(
        vec![RemoteDelta {
            kind: RemoteDeltaKind::Add,
            item: remote_file(21, "", "incoming.txt"),
        }],
        "cursor-1",
    );

    h.engine.run_once().await.unwrap();

    assert!(h.root.join("incoming.txt").exists());
    assert_eq!(
        h.catalog.remote_cursor().await.unwrap(),
        Some(ChangeCursor::new("cursor-1"))
    );
    let item = item_at(&h, "", "incoming.txt").await.expect("tracked");
    assert_eq!(item.state(), ItemState::Unchanged);
    assert_eq!(item.remote_id(), Some(RemoteId::new(21)));
}

#[tokio::test]
async fn test_delta_delete_moves_local_to_trash() {
    let h = harness().await;
    tokio::fs::write(h.root.join("shared.txt"), b"x").await.unwrap();
    h.engine.run_once().await.unwrap();
    let remote_id = item_at(&h, "", "shared.txt").await.unwrap().remote_id().unwrap();

    h.store.queue_deltas(
        vec![RemoteDelta {
            kind: RemoteDeltaKind::DeleteObject,
            item: remote_file(remote_id.value(), "", "shared.txt"),
        }],
        "cursor-2",
    );

    h.engine.run_once().await.unwrap();

    assert_eq!(h.fs.trashed(), vec![h.root.join("shared.txt")]);
    assert!(!h.root.join("shared.txt").exists());
    assert!(item_at(&h, "", "shared.txt").await.is_none());
}

#[tokio::test]
async fn test_delta_rename_renames_local_file() {
    let h = harness().await;
    tokio::fs::write(h.root.join("before.txt"), b"x").await.unwrap();
    h.engine.run_once().await.unwrap();
    let remote_id = item_at(&h, "", "before.txt").await.unwrap().remote_id().unwrap();

    h.store.queue_deltas(
        vec![RemoteDelta {
            kind: RemoteDeltaKind::Rename,
            item: remote_file(remote_id.value(), "", "after.txt"),
        }],
        "cursor-3",
    );

    h.engine.run_once().await.unwrap();

    assert!(!h.root.join("before.txt").exists());
    assert!(h.root.join("after.txt").exists());
    let item = item_at(&h, "", "after.txt").await.expect("renamed");
    assert_eq!(item.state(), ItemState::Unchanged);
}

#[tokio::test]
async fn test_delta_failure_leaves_remote_cursor_in_place() {
    let h = harness().await;
    tokio::fs::write(h.root.join("tracked.txt"), b"x").await.unwrap();
    h.engine.run_once().await.unwrap();
    let remote_id = item_at(&h, "", "tracked.txt").await.unwrap().remote_id().unwrap();
    let cursor_before = h.catalog.remote_cursor().await.unwrap();

    // Applying the update needs a local stat, which is made to fail
    // mid-batch.
    h.fs.fail_state(placeholder_path(&h.root.join("tracked.txt")));
    h.store.queue_deltas(
        vec![RemoteDelta {
            kind: RemoteDeltaKind::Update,
            item: remote_file(remote_id.value(), "", "tracked.txt"),
        }],
        "cursor-lost",
    );

    assert!(h.engine.run_once().await.is_err());
    assert_eq!(h.catalog.remote_cursor().await.unwrap(), cursor_before);
    assert_ne!(cursor_before, Some(ChangeCursor::new("cursor-lost")));
}

// ============================================================================
// Executor edge cases
// ============================================================================

#[tokio::test]
async fn test_deleted_local_without_remote_id_skips_remote_call() {
    let h = harness().await;

    let mut item = Item::new_local("", "ghost.txt", ItemKind::File, remote_time());
    item.mark_deleted(ItemState::DeletedLocal);
    h.catalog.insert(&item).await.unwrap();

    let processed = h.engine.drain_pass().await.unwrap();

    assert_eq!(processed, 1);
    assert!(h.store.deleted_files.lock().unwrap().is_empty());
    assert!(item_at(&h, "", "ghost.txt").await.is_none());
}

#[tokio::test]
async fn test_locked_file_is_postponed_not_errored() {
    let h = harness().await;
    let local = h.root.join("busy.txt");
    tokio::fs::write(&local, b"x").await.unwrap();
    h.fs.lock_path(local);

    let item = Item::new_local("", "busy.txt", ItemKind::File, remote_time());
    h.catalog.insert(&item).await.unwrap();

    let processed = h.engine.drain_pass().await.unwrap();
    assert_eq!(processed, 1);

    let after = item_at(&h, "", "busy.txt").await.expect("tracked");
    assert_eq!(after.state(), ItemState::UpdatedLocal);
    assert!(!after.has_error());
    assert!(h.store.uploads().is_empty());
    // The pass-end reset makes it eligible again next pass.
    assert_eq!(h.catalog.count_to_process().await.unwrap(), 1);
}

#[tokio::test]
async fn test_failed_upload_sets_sticky_error() {
    let h = harness().await;

    // Item tracked but the local file never existed; upload cannot start.
    let item = Item::new_local("", "missing.txt", ItemKind::File, remote_time());
    h.catalog.insert(&item).await.unwrap();

    h.engine.drain_pass().await.unwrap();

    let after = item_at(&h, "", "missing.txt").await.expect("tracked");
    assert!(after.has_error());
    assert_eq!(after.state(), ItemState::UpdatedLocal);
    assert!(after.last_error().unwrap().contains("missing"));
    // Errored items are excluded from further automatic processing.
    assert_eq!(h.catalog.count_to_process().await.unwrap(), 0);
}

#[tokio::test]
async fn test_conflict_keeps_both_copies() {
    let h = harness().await;
    let local = h.root.join("fought.txt");
    tokio::fs::write(&local, b"local version").await.unwrap();

    let mut item = Item::new_local("", "fought.txt", ItemKind::File, remote_time());
    item.set_remote_id(RemoteId::new(5));
    item.set_etag(Etag::new(3));
    item.set_state(ItemState::Conflict);
    h.catalog.insert(&item).await.unwrap();

    h.engine.drain_pass().await.unwrap();

    // The aside copy carries the original content under a new name.
    let mut aside = None;
    let mut entries = tokio::fs::read_dir(&h.root).await.unwrap();
    while let Some(entry) = entries.next_entry().await.unwrap() {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with("fought_") && name.ends_with(".txt") {
            aside = Some(entry.path());
        }
    }
    let aside = aside.expect("aside copy");
    assert_eq!(tokio::fs::read(&aside).await.unwrap(), b"local version");

    let after = item_at(&h, "", "fought.txt").await.expect("tracked");
    assert_eq!(after.state(), ItemState::Unchanged);
    assert!(after.etag().is_none());
    assert_eq!(after.last_modified(), remote_time() - chrono::Duration::hours(1));

    // The original's mtime is back-dated so the remote copy reads newer.
    let state = h.fs.get_state(&local).await.unwrap();
    assert_eq!(state.modified, Some(remote_time() - chrono::Duration::hours(1)));
}

#[tokio::test]
async fn test_headers_only_materializes_placeholder() {
    let config = SyncConfig {
        headers_only: true,
        ..Default::default()
    };
    let h = harness_with(config, MockStore::new()).await;
    h.engine.run_once().await.unwrap();

    h.store.queue_deltas(
        vec![RemoteDelta {
            kind: RemoteDeltaKind::Add,
            item: remote_file(31, "", "big-report.odt"),
        }],
        "cursor-4",
    );

    h.engine.run_once().await.unwrap();

    let local = h.root.join("big-report.odt");
    let placeholder = placeholder_path(&local);
    assert!(!local.exists());
    assert!(placeholder.exists());
    assert!(h.store.downloads.lock().unwrap().is_empty());

    let state = h.fs.get_state(&placeholder).await.unwrap();
    assert_eq!(state.size, 0);
    assert_eq!(state.modified, Some(remote_time()));

    let item = item_at(&h, "", "big-report.odt").await.expect("tracked");
    assert_eq!(item.state(), ItemState::Unchanged);
}

#[tokio::test]
async fn test_local_folder_is_created_remotely() {
    let h = harness().await;
    tokio::fs::create_dir_all(h.root.join("projects/alpha"))
        .await
        .unwrap();
    tokio::fs::write(h.root.join("projects/alpha/plan.txt"), b"x")
        .await
        .unwrap();

    h.engine.run_once().await.unwrap();

    let created = h.store.created_folders.lock().unwrap().clone();
    assert_eq!(created, vec!["projects".to_string(), "projects/alpha".to_string()]);
    assert_eq!(h.store.uploads(), vec!["projects/alpha/plan.txt".to_string()]);
}
