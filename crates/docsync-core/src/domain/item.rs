//! Item domain entity
//!
//! This module defines the Item entity which represents one file or folder
//! tracked by the bidirectional synchronization engine, together with the
//! reconciliation logic that decides the next synchronization state from
//! freshly observed local or remote facts.
//!
//! ## State Machine
//!
//! ```text
//!                    local facts                     remote facts
//!                         │                               │
//!                         ▼                               ▼
//!  ┌───────────┐   ┌──────────────┐               ┌───────────────┐
//!  │ Unchanged │──►│ UpdatedLocal │               │ UpdatedRemote │
//!  └───────────┘   └──────────────┘               └───────────────┘
//!        │                 │        both changed          │
//!        │                 └──────────┐ (Manual) ┌────────┘
//!        │                            ▼          ▼
//!        │                          ┌──────────────┐
//!        ├── journal delete ──►     │   Conflict   │
//!        │   DeletedLocal           └──────────────┘
//!        ├── remote delete  ──►  DeletedRemote
//!        ├── journal rename ──►  RenamedLocal
//!        └── remote rename  ──►  RenamedRemote
//!
//!  Every state except Unchanged is drained by the orchestrator, which
//!  resets the item to Unchanged (or removes it) on success.
//! ```
//!
//! Reconciliation never performs I/O; the caller supplies observed
//! timestamps, version tokens, and the placeholder probe result.

use std::cmp::Ordering;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::{Etag, ItemId, RemoteId};

// ============================================================================
// ItemKind
// ============================================================================

/// Whether an item is a file or a folder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    File,
    Folder,
}

impl ItemKind {
    /// Returns the kind name as a string
    pub fn name(&self) -> &'static str {
        match self {
            ItemKind::File => "File",
            ItemKind::Folder => "Folder",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemKind::File => write!(f, "file"),
            ItemKind::Folder => write!(f, "folder"),
        }
    }
}

// ============================================================================
// ItemState enum
// ============================================================================

/// Synchronization state of an item
///
/// `Unchanged` is the only terminal state; every other state marks a pending
/// operation the orchestrator still has to execute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    /// Both sides agree; nothing to do
    #[default]
    Unchanged,
    /// Local content is newer, upload pending
    UpdatedLocal,
    /// Remote content is newer, download pending
    UpdatedRemote,
    /// Deleted locally, remote delete pending
    DeletedLocal,
    /// Deleted remotely, local trash pending
    DeletedRemote,
    /// Renamed locally, remote rename pending
    RenamedLocal,
    /// Renamed remotely, local rename pending
    RenamedRemote,
    /// Both sides changed; awaiting resolution
    Conflict,
}

impl ItemState {
    /// Returns true if the item has a pending operation
    pub fn is_pending(&self) -> bool {
        !matches!(self, ItemState::Unchanged)
    }

    /// Returns true if the state marks a deletion on either side
    pub fn is_deletion(&self) -> bool {
        matches!(self, ItemState::DeletedLocal | ItemState::DeletedRemote)
    }

    /// Returns true if the state marks a rename on either side
    pub fn is_rename(&self) -> bool {
        matches!(self, ItemState::RenamedLocal | ItemState::RenamedRemote)
    }

    /// Returns the state name as a string
    pub fn name(&self) -> &'static str {
        match self {
            ItemState::Unchanged => "Unchanged",
            ItemState::UpdatedLocal => "UpdatedLocal",
            ItemState::UpdatedRemote => "UpdatedRemote",
            ItemState::DeletedLocal => "DeletedLocal",
            ItemState::DeletedRemote => "DeletedRemote",
            ItemState::RenamedLocal => "RenamedLocal",
            ItemState::RenamedRemote => "RenamedRemote",
            ItemState::Conflict => "Conflict",
        }
    }
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemState::Unchanged => write!(f, "unchanged"),
            ItemState::UpdatedLocal => write!(f, "updated_local"),
            ItemState::UpdatedRemote => write!(f, "updated_remote"),
            ItemState::DeletedLocal => write!(f, "deleted_local"),
            ItemState::DeletedRemote => write!(f, "deleted_remote"),
            ItemState::RenamedLocal => write!(f, "renamed_local"),
            ItemState::RenamedRemote => write!(f, "renamed_remote"),
            ItemState::Conflict => write!(f, "conflict"),
        }
    }
}

// ============================================================================
// ConflictPolicy
// ============================================================================

/// Governs automatic resolution when both sides changed since the last
/// reconciliation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Surface the conflict to an external arbiter
    #[default]
    Manual,
    /// The remote side wins; local edits are discarded
    OverwriteLocal,
    /// The local side wins; remote edits are discarded
    OverwriteRemote,
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictPolicy::Manual => write!(f, "manual"),
            ConflictPolicy::OverwriteLocal => write!(f, "overwrite_local"),
            ConflictPolicy::OverwriteRemote => write!(f, "overwrite_remote"),
        }
    }
}

// ============================================================================
// PassTag
// ============================================================================

/// Per-pass processing tag
///
/// The drain loop tags every item it touches as `InFlight` so the
/// pop-next query cannot re-select it within the same pass; a pass-end
/// reset returns all tagged items to `Pending`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassTag {
    /// Eligible for processing
    #[default]
    Pending,
    /// Already handled (or deliberately skipped) in the current drain pass
    InFlight,
}

impl PassTag {
    /// Returns the tag name as a string
    pub fn name(&self) -> &'static str {
        match self {
            PassTag::Pending => "Pending",
            PassTag::InFlight => "InFlight",
        }
    }
}

// ============================================================================
// ConflictSnapshot
// ============================================================================

/// Value-type copy of the facts an arbiter needs to resolve a conflict
///
/// Captured at the moment a reconciliation lands in `Conflict`; never
/// persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConflictSnapshot {
    /// Modification time observed on the local side
    pub local_modified: DateTime<Utc>,
    /// Modification time claimed by the remote side
    pub remote_modified: DateTime<Utc>,
}

// ============================================================================
// Item struct
// ============================================================================

/// One file or folder tracked by the synchronization engine
///
/// Location is stored as a root-relative parent path plus a name; the pair
/// is unique across the catalog. All state changes flow through the two
/// `reconcile_with_*` entry points or the orchestrator's terminal
/// `reset_to_unchanged`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Unique identifier, stable across renames and reloads
    id: ItemId,
    /// Identifier on the remote document store (None until first upload)
    remote_id: Option<RemoteId>,
    /// Remote version token (None before first remote contact)
    etag: Option<Etag>,
    /// Root-relative parent folder path; empty string for the root itself
    parent: String,
    /// Item name within the parent folder
    name: String,
    /// Last known modification time
    last_modified: DateTime<Utc>,
    /// File or folder
    kind: ItemKind,
    /// Current synchronization state
    state: ItemState,
    /// Per-pass postpone tag
    pass_tag: PassTag,
    /// Sticky error flag; excludes the item from automatic processing
    has_error: bool,
    /// Message of the last processing error
    last_error: Option<String>,
    /// Pending rename target, consumed when the rename is executed
    new_name: Option<String>,
    /// Pending conflict snapshot, never persisted
    #[serde(skip)]
    conflict: Option<ConflictSnapshot>,
}

impl Item {
    /// Creates an Item first observed on the local side
    ///
    /// The item starts in `UpdatedLocal`: it has never been uploaded, so the
    /// pending operation is the initial upload.
    pub fn new_local(
        parent: impl Into<String>,
        name: impl Into<String>,
        kind: ItemKind,
        last_modified: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ItemId::new(),
            remote_id: None,
            etag: None,
            parent: parent.into(),
            name: name.into(),
            last_modified,
            kind,
            state: ItemState::UpdatedLocal,
            pass_tag: PassTag::Pending,
            has_error: false,
            last_error: None,
            new_name: None,
            conflict: None,
        }
    }

    /// Creates an Item first observed on the remote side
    ///
    /// The item starts in `UpdatedRemote`: the pending operation is the
    /// initial materialization (download or placeholder).
    pub fn new_remote(
        parent: impl Into<String>,
        name: impl Into<String>,
        kind: ItemKind,
        remote_id: RemoteId,
        etag: Etag,
        last_modified: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ItemId::new(),
            remote_id: Some(remote_id),
            etag: Some(etag),
            parent: parent.into(),
            name: name.into(),
            last_modified,
            kind,
            state: ItemState::UpdatedRemote,
            pass_tag: PassTag::Pending,
            has_error: false,
            last_error: None,
            new_name: None,
            conflict: None,
        }
    }

    /// Reconstructs an Item from persisted fields (catalog row mapping)
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: ItemId,
        remote_id: Option<RemoteId>,
        etag: Option<Etag>,
        parent: String,
        name: String,
        last_modified: DateTime<Utc>,
        kind: ItemKind,
        state: ItemState,
        pass_tag: PassTag,
        has_error: bool,
        last_error: Option<String>,
        new_name: Option<String>,
    ) -> Self {
        Self {
            id,
            remote_id,
            etag,
            parent,
            name,
            last_modified,
            kind,
            state,
            pass_tag,
            has_error,
            last_error,
            new_name,
            conflict: None,
        }
    }

    // --- Getters ---

    /// Returns the item's unique identifier
    pub fn id(&self) -> ItemId {
        self.id
    }

    /// Returns the remote identifier if assigned
    pub fn remote_id(&self) -> Option<RemoteId> {
        self.remote_id
    }

    /// Returns the remote version token if assigned
    pub fn etag(&self) -> Option<Etag> {
        self.etag
    }

    /// Returns the root-relative parent folder path
    pub fn parent(&self) -> &str {
        &self.parent
    }

    /// Returns the item name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the last known modification time
    pub fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }

    /// Returns the item kind
    pub fn kind(&self) -> ItemKind {
        self.kind
    }

    /// Returns the current synchronization state
    pub fn state(&self) -> ItemState {
        self.state
    }

    /// Returns the per-pass tag
    pub fn pass_tag(&self) -> PassTag {
        self.pass_tag
    }

    /// Returns true if the sticky error flag is set
    pub fn has_error(&self) -> bool {
        self.has_error
    }

    /// Returns the last error message if any
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Returns the pending rename target if any
    pub fn new_name(&self) -> Option<&str> {
        self.new_name.as_deref()
    }

    /// Returns the pending conflict snapshot if any
    pub fn conflict(&self) -> Option<ConflictSnapshot> {
        self.conflict
    }

    /// Returns true if this item is a folder
    pub fn is_folder(&self) -> bool {
        matches!(self.kind, ItemKind::Folder)
    }

    /// Root-relative path of the item: `parent/name`, or just `name` at
    /// the root
    pub fn relative_path(&self) -> String {
        if self.parent.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", self.parent, self.name)
        }
    }

    /// Absolute local path under the given synchronization root
    pub fn local_path(&self, root: &Path) -> PathBuf {
        if self.parent.is_empty() {
            root.join(&self.name)
        } else {
            root.join(&self.parent).join(&self.name)
        }
    }

    // --- Setters used by collectors and the orchestrator ---

    /// Sets the remote identifier after a successful upload
    pub fn set_remote_id(&mut self, remote_id: RemoteId) {
        self.remote_id = Some(remote_id);
    }

    /// Sets the remote version token
    pub fn set_etag(&mut self, etag: Etag) {
        self.etag = Some(etag);
    }

    /// Clears the remote version token, forcing a future reconciliation
    pub fn clear_etag(&mut self) {
        self.etag = None;
    }

    /// Sets the last known modification time
    pub fn set_last_modified(&mut self, time: DateTime<Utc>) {
        self.last_modified = time;
    }

    /// Rewrites the parent folder path (folder rename propagation)
    pub fn set_parent(&mut self, parent: impl Into<String>) {
        self.parent = parent.into();
    }

    /// Records a pending rename and moves the item into the given rename
    /// state
    pub fn mark_renamed(&mut self, new_name: impl Into<String>, state: ItemState) {
        debug_assert!(state.is_rename());
        self.new_name = Some(new_name.into());
        self.state = state;
    }

    /// Marks the item deleted on the given side
    pub fn mark_deleted(&mut self, state: ItemState) {
        debug_assert!(state.is_deletion());
        self.state = state;
    }

    /// Applies the pending rename: adopts the new name and clears it
    ///
    /// Returns the old name. The caller is responsible for having performed
    /// the physical rename first.
    pub fn apply_rename(&mut self) -> Option<String> {
        let new_name = self.new_name.take()?;
        let old = std::mem::replace(&mut self.name, new_name);
        Some(old)
    }

    /// Sets the sticky error flag with a message
    pub fn mark_error(&mut self, message: impl Into<String>) {
        self.has_error = true;
        self.last_error = Some(message.into());
    }

    /// Clears the sticky error flag and message
    pub fn clear_error(&mut self) {
        self.has_error = false;
        self.last_error = None;
    }

    /// Tags the item as handled for the current drain pass
    pub fn tag_in_flight(&mut self) {
        self.pass_tag = PassTag::InFlight;
    }

    /// Returns the item to the pending tag for the next pass
    pub fn tag_pending(&mut self) {
        self.pass_tag = PassTag::Pending;
    }

    /// Terminal reset after the orchestrator completed the pending
    /// operation
    pub fn reset_to_unchanged(&mut self) {
        self.state = ItemState::Unchanged;
        self.new_name = None;
        self.conflict = None;
    }

    /// Forces a state, used by arbiters returning a resolved state and by
    /// collectors for deterministic outcomes (remote rename with an
    /// unchanged name, placeholder short-circuit)
    pub fn set_state(&mut self, state: ItemState) {
        self.state = state;
        if !matches!(state, ItemState::Conflict) {
            self.conflict = None;
        }
    }
}

// ============================================================================
// Reconciliation entry points
// ============================================================================

impl Item {
    /// Reconciles the item with a freshly observed local modification time
    ///
    /// Folders carry no content version, so reconciliation applies to files
    /// only. Idempotent: applying the same observation twice yields the same
    /// state as applying it once.
    pub fn reconcile_with_local(&mut self, observed: DateTime<Utc>, policy: ConflictPolicy) {
        if self.is_folder() {
            return;
        }

        match observed.cmp(&self.last_modified) {
            Ordering::Equal => {
                // Same mtime but never uploaded: a previous initial upload
                // failed before the remote id was recorded.
                if self.remote_id.is_none() {
                    self.state = ItemState::UpdatedLocal;
                }
            }
            Ordering::Greater => {
                if matches!(self.state, ItemState::UpdatedRemote | ItemState::Conflict) {
                    match policy {
                        ConflictPolicy::Manual => {
                            self.conflict = Some(ConflictSnapshot {
                                local_modified: observed,
                                remote_modified: self.last_modified,
                            });
                            self.state = ItemState::Conflict;
                            return;
                        }
                        ConflictPolicy::OverwriteLocal => {
                            self.state = ItemState::UpdatedRemote;
                            return;
                        }
                        ConflictPolicy::OverwriteRemote => {}
                    }
                }
                self.last_modified = observed;
                self.state = ItemState::UpdatedLocal;
            }
            Ordering::Less => {
                self.state = ItemState::UpdatedRemote;
            }
        }
    }

    /// Reconciles the item with facts from a remote delta or listing
    ///
    /// Always adopts `remote_id`. On first remote contact the comparison
    /// falls back to modification times; afterwards the numeric version
    /// token decides. `placeholder_present` short-circuits to `Unchanged`
    /// when only metadata has been materialized locally: the placeholder is
    /// refreshed lazily, not treated as a stale copy.
    pub fn reconcile_with_remote(
        &mut self,
        remote_id: RemoteId,
        etag: Etag,
        remote_modified: DateTime<Utc>,
        policy: ConflictPolicy,
        placeholder_present: bool,
    ) {
        self.remote_id = Some(remote_id);
        if self.is_folder() {
            if self.etag.is_none() {
                self.etag = Some(etag);
            }
            return;
        }

        let Some(current) = self.etag else {
            // First contact: no version token to compare, fall back to
            // modification times.
            self.etag = Some(etag);
            match remote_modified.cmp(&self.last_modified) {
                Ordering::Greater => {
                    if matches!(self.state, ItemState::UpdatedLocal | ItemState::Conflict) {
                        match policy {
                            ConflictPolicy::Manual => {
                                self.conflict = Some(ConflictSnapshot {
                                    local_modified: self.last_modified,
                                    remote_modified,
                                });
                                self.state = ItemState::Conflict;
                                return;
                            }
                            ConflictPolicy::OverwriteRemote => {
                                self.state = ItemState::UpdatedLocal;
                                return;
                            }
                            ConflictPolicy::OverwriteLocal => {}
                        }
                    }
                    self.last_modified = remote_modified;
                    self.state = ItemState::UpdatedRemote;
                }
                Ordering::Less => {
                    self.state = ItemState::UpdatedLocal;
                }
                Ordering::Equal => {
                    // Equal mtimes on first contact are taken as "already in
                    // sync"; timestamps stand in for a shared version here.
                    self.state = ItemState::Unchanged;
                }
            }
            return;
        };

        if placeholder_present {
            self.state = ItemState::Unchanged;
            return;
        }

        match etag.cmp(&current) {
            Ordering::Greater => {
                if matches!(self.state, ItemState::UpdatedLocal | ItemState::Conflict) {
                    match policy {
                        ConflictPolicy::Manual => {
                            self.conflict = Some(ConflictSnapshot {
                                local_modified: self.last_modified,
                                remote_modified,
                            });
                            self.state = ItemState::Conflict;
                            return;
                        }
                        ConflictPolicy::OverwriteRemote => {
                            self.state = ItemState::UpdatedLocal;
                            return;
                        }
                        ConflictPolicy::OverwriteLocal => {}
                    }
                }
                self.etag = Some(etag);
                self.state = ItemState::UpdatedRemote;
            }
            Ordering::Less => {
                self.state = ItemState::UpdatedLocal;
            }
            Ordering::Equal => {}
        }
    }
}
