//! Change journal port (driven/secondary port)
//!
//! This module defines the interface for the local filesystem change
//! journal: an ordered, monotonically-sequenced log of file events the
//! collector consumes incrementally. The physical reader (USN journal,
//! fanotify bridge, test double) lives in an adapter.

use std::path::PathBuf;

use crate::domain::JournalCursor;

/// Reason flags carried by journal entries
///
/// A subset of the underlying journal's reason bits, limited to what the
/// collector reacts to. Flags combine with `|` into the read mask.
pub mod reason {
    /// Existing file content was overwritten
    pub const DATA_OVERWRITE: u32 = 0x0000_0001;
    /// File content was appended
    pub const DATA_EXTEND: u32 = 0x0000_0002;
    /// File or folder was created
    pub const FILE_CREATE: u32 = 0x0000_0100;
    /// File or folder was deleted
    pub const FILE_DELETE: u32 = 0x0000_0200;
    /// Security descriptor changed
    pub const SECURITY_CHANGE: u32 = 0x0000_0800;
    /// Entry carries the old name of a rename
    pub const RENAME_OLD_NAME: u32 = 0x0000_1000;
    /// Entry carries the new name of a rename
    pub const RENAME_NEW_NAME: u32 = 0x0000_2000;
    /// Basic attributes (timestamps, flags) changed
    pub const BASIC_INFO_CHANGE: u32 = 0x0000_8000;
    /// An alternate data stream changed
    pub const STREAM_CHANGE: u32 = 0x0020_0000;
    /// Handle closed after modification
    pub const CLOSE: u32 = 0x8000_0000;

    /// Mask of every reason the journal collector subscribes to
    pub const DEFAULT_MASK: u32 = DATA_OVERWRITE
        | DATA_EXTEND
        | FILE_CREATE
        | FILE_DELETE
        | SECURITY_CHANGE
        | RENAME_OLD_NAME
        | RENAME_NEW_NAME
        | BASIC_INFO_CHANGE
        | STREAM_CHANGE
        | CLOSE;
}

/// One raw journal entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    /// Stable reference of the file itself
    pub file_ref: u64,
    /// Reference of the containing folder, resolved via
    /// [`IChangeJournal::resolve_parent_path`]
    pub parent_ref: u64,
    /// Name of the file within its parent
    pub name: String,
    /// Reason bit set (see [`reason`])
    pub reason: u32,
    /// Whether the entry refers to a directory
    pub is_directory: bool,
}

impl JournalEntry {
    /// Returns true if any of the given reason bits are set
    pub fn has_reason(&self, mask: u32) -> bool {
        self.reason & mask != 0
    }
}

/// Result of a journal read: entries plus the cursor to resume from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalBatch {
    /// Entries since the requested cursor, in journal order
    pub entries: Vec<JournalEntry>,
    /// Cursor to store once the batch is fully processed
    pub next_cursor: JournalCursor,
}

/// Port trait for the local change-journal reader
#[async_trait::async_trait]
pub trait IChangeJournal: Send + Sync {
    /// Current end-of-journal cursor (starting point for fresh catalogs)
    async fn cursor_state(&self) -> anyhow::Result<JournalCursor>;

    /// Entries recorded after `cursor` whose reason intersects `mask`
    async fn read_entries_since(
        &self,
        cursor: JournalCursor,
        mask: u32,
    ) -> anyhow::Result<JournalBatch>;

    /// Resolves a parent folder reference to an absolute path
    ///
    /// Returns `None` when the folder no longer exists (entry refers to a
    /// path deleted later in the journal).
    async fn resolve_parent_path(&self, parent_ref: u64) -> anyhow::Result<Option<PathBuf>>;
}
