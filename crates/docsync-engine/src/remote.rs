//! Remote delta collector
//!
//! Pulls changes from the remote document store and applies them to the
//! catalog. Two modes: the incremental cursor-based delta fetch used by the
//! watch loop, and the full listing used once when the catalog is first
//! built. The remote cursor is replaced only after every delta in the batch
//! has been applied.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};

use docsync_core::config::IgnoreList;
use docsync_core::domain::{ConflictPolicy, Item, ItemState};
use docsync_core::placeholder_path;
use docsync_core::ports::{
    IConflictArbiter, IDocumentStore, IItemCatalog, ILocalFileSystem, RemoteDelta,
    RemoteDeltaKind, RemoteItem,
};

/// Collector applying remote document-store changes to the catalog
pub struct DeltaCollector {
    catalog: Arc<dyn IItemCatalog>,
    store: Arc<dyn IDocumentStore>,
    filesystem: Arc<dyn ILocalFileSystem>,
    arbiter: Option<Arc<dyn IConflictArbiter>>,
    root: PathBuf,
    ignore: IgnoreList,
    policy: ConflictPolicy,
}

impl DeltaCollector {
    /// Creates a delta collector for the given root
    pub fn new(
        catalog: Arc<dyn IItemCatalog>,
        store: Arc<dyn IDocumentStore>,
        filesystem: Arc<dyn ILocalFileSystem>,
        arbiter: Option<Arc<dyn IConflictArbiter>>,
        root: PathBuf,
        ignore: IgnoreList,
        policy: ConflictPolicy,
    ) -> Self {
        Self {
            catalog,
            store,
            filesystem,
            arbiter,
            root,
            ignore,
            policy,
        }
    }

    /// Fetches and applies the deltas recorded since the stored cursor
    ///
    /// Returns true when at least one item was left with a pending state.
    pub async fn collect(&self) -> anyhow::Result<bool> {
        let cursor = self.catalog.remote_cursor().await?;
        let batch = self.store.fetch_deltas(cursor.as_ref()).await?;
        debug!(deltas = batch.deltas.len(), "Fetched remote deltas");

        let mut changed = false;
        for delta in &batch.deltas {
            changed |= self.apply_delta(delta).await?;
        }

        // Whole batch applied; safe to resume from its cursor.
        self.catalog.set_remote_cursor(&batch.cursor).await?;
        Ok(changed)
    }

    /// Reconciles the catalog against a full remote listing (initial build)
    pub async fn full_listing(&self) -> anyhow::Result<bool> {
        let mut listing = self.store.list_all().await?;
        // Folders before files, parents before children.
        listing.sort_by_key(|r| (!matches!(r.kind, docsync_core::domain::ItemKind::Folder), r.relative_path()));
        info!(items = listing.len(), "Reconciling full remote listing");

        let mut changed = false;
        for remote in &listing {
            if self.skip(remote) {
                continue;
            }
            changed |= match self.find(remote).await? {
                Some(item) => self.reconcile_existing(item, remote).await?,
                None => self.insert_from_remote(remote).await?,
            };
        }
        Ok(changed)
    }

    /// Applies one remote delta to the catalog
    async fn apply_delta(&self, delta: &RemoteDelta) -> anyhow::Result<bool> {
        let remote = &delta.item;
        if self.skip(remote) {
            return Ok(false);
        }

        let found = self.find(remote).await?;
        match delta.kind {
            RemoteDeltaKind::Add | RemoteDeltaKind::Update => match found {
                Some(item) => self.reconcile_existing(item, remote).await,
                None => self.insert_from_remote(remote).await,
            },
            RemoteDeltaKind::Rename => match found {
                Some(item) => self.apply_rename(item, remote).await,
                None => self.insert_from_remote(remote).await,
            },
            RemoteDeltaKind::DeleteObject => match found {
                Some(mut item) => {
                    item.mark_deleted(ItemState::DeletedRemote);
                    self.catalog.update(&item).await?;
                    debug!(path = %item.relative_path(), "Remote deletion recorded");
                    Ok(true)
                }
                None => {
                    debug!(
                        remote_id = %remote.remote_id,
                        "Remote deletion of untracked item, ignored"
                    );
                    Ok(false)
                }
            },
        }
    }

    async fn apply_rename(&self, mut item: Item, remote: &RemoteItem) -> anyhow::Result<bool> {
        if item.name() == remote.name {
            // Same name again: nothing to rename locally.
            item.set_remote_id(remote.remote_id);
            item.set_state(ItemState::Unchanged);
            self.catalog.update(&item).await?;
            return Ok(false);
        }

        if item.is_folder() {
            let old_prefix = item.relative_path();
            let new_prefix = join_rel(&remote.parent, &remote.name);
            // A parent change is a move; the descendant mapping under the
            // new location is not verifiable from the delta alone.
            let moved = item.parent() != remote.parent;
            if moved {
                warn!(
                    from = %old_prefix,
                    to = %new_prefix,
                    "Remote folder moved, flagging descendants for review"
                );
            }
            self.catalog
                .rewrite_parent_prefix(&old_prefix, &new_prefix, moved)
                .await?;
        }

        item.set_remote_id(remote.remote_id);
        item.mark_renamed(remote.name.clone(), ItemState::RenamedRemote);
        self.catalog.update(&item).await?;
        debug!(
            path = %item.relative_path(),
            new_name = %remote.name,
            "Remote rename recorded"
        );
        Ok(true)
    }

    async fn reconcile_existing(
        &self,
        mut item: Item,
        remote: &RemoteItem,
    ) -> anyhow::Result<bool> {
        let local = item.local_path(&self.root);
        let placeholder_present = self
            .filesystem
            .get_state(&placeholder_path(&local))
            .await?
            .exists;

        item.reconcile_with_remote(
            remote.remote_id,
            remote.etag,
            remote.modified,
            self.policy,
            placeholder_present,
        );
        self.arbitrate(&mut item).await;
        self.catalog.update(&item).await?;
        Ok(item.state().is_pending())
    }

    async fn insert_from_remote(&self, remote: &RemoteItem) -> anyhow::Result<bool> {
        let item = Item::new_remote(
            remote.parent.clone(),
            remote.name.clone(),
            remote.kind,
            remote.remote_id,
            remote.etag,
            remote.modified,
        );
        self.catalog.insert(&item).await?;
        debug!(path = %remote.relative_path(), "New remote item recorded");
        Ok(true)
    }

    /// Hands a fresh Conflict to the arbiter, if one is configured
    async fn arbitrate(&self, item: &mut Item) {
        if item.state() != ItemState::Conflict {
            return;
        }
        let (Some(arbiter), Some(snapshot)) = (&self.arbiter, item.conflict()) else {
            return;
        };
        let resolved = arbiter.resolve(item.clone(), snapshot).await;
        if resolved != ItemState::Conflict {
            debug!(
                path = %item.relative_path(),
                resolution = %resolved,
                "Conflict resolved by arbiter"
            );
            item.set_state(resolved);
        }
    }

    /// Finds the tracked counterpart of a remote item, by remote id first
    /// and by path as a fallback for records that predate their upload
    async fn find(&self, remote: &RemoteItem) -> anyhow::Result<Option<Item>> {
        if let Some(item) = self.catalog.get_by_remote_id(remote.remote_id).await? {
            return Ok(Some(item));
        }
        self.catalog.get_by_path(&remote.parent, &remote.name).await
    }

    fn skip(&self, remote: &RemoteItem) -> bool {
        self.ignore.matches(&remote.name) || self.ignore.matches(&remote.relative_path())
    }
}

fn join_rel(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}
