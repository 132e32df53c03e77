//! Incremental local change collector
//!
//! Consumes the local change journal from the stored cursor, coalesces the
//! raw entries into per-path change records, and applies them to the
//! catalog. The cursor advances only after the entire batch has been
//! applied, so a mid-batch failure replays the batch on the next poll.
//!
//! ## Coalescing
//!
//! A rename produces two journal entries sharing a file reference: one
//! carrying the old name, one the new. The collector joins them into a
//! single rename record. All other reasons collapse per path, latest wins,
//! with deletions taking precedence; entries carrying nothing but the
//! close bit are dropped. A delete following a rename in the same batch
//! collapses into a delete at the rename's old path.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use docsync_core::config::IgnoreList;
use docsync_core::domain::{ConflictPolicy, Item, ItemKind, ItemState};
use docsync_core::ports::{
    reason, IChangeJournal, IConflictArbiter, IItemCatalog, ILocalFileSystem, JournalEntry,
};
use docsync_core::{is_placeholder_path, STORE_FOLDER};

/// One coalesced local change
#[derive(Debug, Clone, PartialEq, Eq)]
enum ChangeKind {
    /// Content, attribute, or creation change at the path
    Touch,
    /// The path was removed
    Delete,
    /// The item moved from `old_parent/old_name` to the record's path
    Rename { old_parent: String, old_name: String },
}

#[derive(Debug, Clone)]
struct ChangeRecord {
    parent: String,
    name: String,
    is_directory: bool,
    kind: ChangeKind,
}

impl ChangeRecord {
    fn relative_path(&self) -> String {
        join_rel(&self.parent, &self.name)
    }
}

/// Collector consuming the local change journal incrementally
pub struct JournalCollector {
    catalog: Arc<dyn IItemCatalog>,
    journal: Arc<dyn IChangeJournal>,
    filesystem: Arc<dyn ILocalFileSystem>,
    arbiter: Option<Arc<dyn IConflictArbiter>>,
    root: PathBuf,
    ignore: IgnoreList,
    policy: ConflictPolicy,
}

impl JournalCollector {
    /// Creates a journal collector for the given root
    pub fn new(
        catalog: Arc<dyn IItemCatalog>,
        journal: Arc<dyn IChangeJournal>,
        filesystem: Arc<dyn ILocalFileSystem>,
        arbiter: Option<Arc<dyn IConflictArbiter>>,
        root: PathBuf,
        ignore: IgnoreList,
        policy: ConflictPolicy,
    ) -> Self {
        Self {
            catalog,
            journal,
            filesystem,
            arbiter,
            root,
            ignore,
            policy,
        }
    }

    /// Reads and applies all journal entries since the stored cursor
    ///
    /// Returns true when at least one catalog record changed. A fresh
    /// catalog (no stored cursor) starts at the journal's current end;
    /// history before that point is covered by the initial rescan.
    pub async fn run(&self) -> anyhow::Result<bool> {
        let cursor = match self.catalog.journal_cursor().await? {
            Some(c) => c,
            None => {
                let end = self.journal.cursor_state().await?;
                self.catalog.set_journal_cursor(end).await?;
                return Ok(false);
            }
        };

        let batch = self
            .journal
            .read_entries_since(cursor, reason::DEFAULT_MASK)
            .await?;
        if batch.entries.is_empty() {
            self.catalog.set_journal_cursor(batch.next_cursor).await?;
            return Ok(false);
        }

        let records = self.coalesce(&batch.entries).await?;
        debug!(
            entries = batch.entries.len(),
            records = records.len(),
            "Coalesced journal batch"
        );

        let mut changed = false;
        for record in &records {
            changed |= self.apply(record).await?;
        }

        // Whole batch applied; safe to move past it.
        self.catalog.set_journal_cursor(batch.next_cursor).await?;
        Ok(changed)
    }

    /// Joins rename pairs and collapses repeated entries per path
    async fn coalesce(&self, entries: &[JournalEntry]) -> anyhow::Result<Vec<ChangeRecord>> {
        let mut records: Vec<ChangeRecord> = Vec::new();
        let mut by_path: HashMap<(String, String), usize> = HashMap::new();
        let mut pending_old: HashMap<u64, (String, String)> = HashMap::new();

        for entry in entries {
            let Some(parent) = self.resolve_parent(entry).await? else {
                continue;
            };
            if self.skip(&entry.name, &parent) {
                continue;
            }

            if entry.has_reason(reason::RENAME_OLD_NAME) {
                pending_old.insert(entry.file_ref, (parent, entry.name.clone()));
                continue;
            }

            let kind = if entry.has_reason(reason::RENAME_NEW_NAME) {
                match pending_old.remove(&entry.file_ref) {
                    Some((old_parent, old_name)) => ChangeKind::Rename {
                        old_parent,
                        old_name,
                    },
                    // The old half predates this batch; the new path is all
                    // we know, so treat it as a create/update.
                    None => ChangeKind::Touch,
                }
            } else if entry.has_reason(reason::FILE_DELETE) {
                ChangeKind::Delete
            } else if entry.reason & !reason::CLOSE == 0 {
                continue;
            } else {
                ChangeKind::Touch
            };

            let key = (parent.clone(), entry.name.clone());
            match by_path.get(&key).copied() {
                Some(i) => {
                    // A delete after an unapplied rename must target the old
                    // path; the catalog still holds the item under its old
                    // name.
                    if kind == ChangeKind::Delete {
                        if let ChangeKind::Rename {
                            old_parent,
                            old_name,
                        } = records[i].kind.clone()
                        {
                            by_path.remove(&key);
                            by_path.insert((old_parent.clone(), old_name.clone()), i);
                            records[i] = ChangeRecord {
                                parent: old_parent,
                                name: old_name,
                                is_directory: entry.is_directory,
                                kind: ChangeKind::Delete,
                            };
                            continue;
                        }
                    }
                    records[i].kind = merge(&records[i].kind, kind);
                    records[i].is_directory = entry.is_directory;
                }
                None => {
                    by_path.insert(key, records.len());
                    records.push(ChangeRecord {
                        parent,
                        name: entry.name.clone(),
                        is_directory: entry.is_directory,
                        kind,
                    });
                }
            }
        }

        Ok(records)
    }

    /// Applies one coalesced record to the catalog
    async fn apply(&self, record: &ChangeRecord) -> anyhow::Result<bool> {
        match &record.kind {
            ChangeKind::Delete => self.apply_delete(record).await,
            ChangeKind::Rename {
                old_parent,
                old_name,
            } => {
                if old_parent == &record.parent {
                    self.apply_rename(record, old_name).await
                } else {
                    // A cross-folder move surfaces as delete-at-old plus
                    // create-at-new; the remote side has no move operation
                    // either.
                    let deleted = self
                        .apply_delete(&ChangeRecord {
                            parent: old_parent.clone(),
                            name: old_name.clone(),
                            is_directory: record.is_directory,
                            kind: ChangeKind::Delete,
                        })
                        .await?;
                    let created = self.apply_touch(record).await?;
                    Ok(deleted || created)
                }
            }
            ChangeKind::Touch => self.apply_touch(record).await,
        }
    }

    async fn apply_delete(&self, record: &ChangeRecord) -> anyhow::Result<bool> {
        let Some(mut item) = self.catalog.get_by_path(&record.parent, &record.name).await? else {
            return Ok(false);
        };
        item.mark_deleted(ItemState::DeletedLocal);
        self.catalog.update(&item).await?;
        debug!(path = %record.relative_path(), "Local deletion recorded");
        Ok(true)
    }

    async fn apply_rename(&self, record: &ChangeRecord, old_name: &str) -> anyhow::Result<bool> {
        let Some(mut item) = self.catalog.get_by_path(&record.parent, old_name).await? else {
            // Unknown at the old path: whatever exists at the new path is
            // new to us.
            return self.apply_touch(record).await;
        };

        if item.is_folder() {
            let old_prefix = join_rel(&record.parent, old_name);
            let new_prefix = record.relative_path();
            self.catalog
                .rewrite_parent_prefix(&old_prefix, &new_prefix, false)
                .await?;
        }

        item.mark_renamed(record.name.clone(), ItemState::RenamedLocal);
        self.catalog.update(&item).await?;
        debug!(
            from = %join_rel(&record.parent, old_name),
            to = %record.relative_path(),
            "Local rename recorded"
        );
        Ok(true)
    }

    async fn apply_touch(&self, record: &ChangeRecord) -> anyhow::Result<bool> {
        let local = self.root.join(record.relative_path());
        let state = self.filesystem.get_state(&local).await?;
        if !state.exists {
            // Deleted later in the journal; the delete record handles it.
            return Ok(false);
        }
        let observed = state.modified.unwrap_or_else(chrono::Utc::now);

        match self.catalog.get_by_path(&record.parent, &record.name).await? {
            Some(mut item) => {
                let before = (item.state(), item.last_modified());
                item.reconcile_with_local(observed, self.policy);
                self.arbitrate(&mut item).await;
                if (item.state(), item.last_modified()) == before {
                    return Ok(false);
                }
                self.catalog.update(&item).await?;
                Ok(true)
            }
            None => {
                let kind = if record.is_directory || !state.is_file {
                    ItemKind::Folder
                } else {
                    ItemKind::File
                };
                let item = Item::new_local(record.parent.clone(), record.name.clone(), kind, observed);
                self.catalog.insert(&item).await?;
                debug!(path = %record.relative_path(), "New local item recorded");
                Ok(true)
            }
        }
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

    /// Resolves an entry's parent reference to a root-relative folder path
    async fn resolve_parent(&self, entry: &JournalEntry) -> anyhow::Result<Option<String>> {
        let Some(abs) = self.journal.resolve_parent_path(entry.parent_ref).await? else {
            return Ok(None);
        };
        let Ok(rel) = abs.strip_prefix(&self.root) else {
            warn!(path = %abs.display(), "Journal entry outside the root, skipping");
            return Ok(None);
        };
        Ok(Some(rel.to_string_lossy().into_owned()))
    }

    fn skip(&self, name: &str, parent: &str) -> bool {
        parent == STORE_FOLDER
            || parent.starts_with(&format!("{STORE_FOLDER}/"))
            || name == STORE_FOLDER
            || is_placeholder_path(Path::new(name))
            || self.ignore.matches(name)
            || self.ignore.matches(&join_rel(parent, name))
    }
}

/// Later facts win, but a rename is never demoted by a plain touch and a
/// delete beats everything.
fn merge(existing: &ChangeKind, incoming: ChangeKind) -> ChangeKind {
    match (existing, &incoming) {
        (_, ChangeKind::Delete) => ChangeKind::Delete,
        (ChangeKind::Rename { .. }, ChangeKind::Touch) => existing.clone(),
        _ => incoming,
    }
}

fn join_rel(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}
