//! docsync Core - Domain logic and business rules
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `Item` and its synchronization state machine
//! - **Port definitions** - Traits for adapters: `IItemCatalog`, `IDocumentStore`,
//!   `IChangeJournal`, `ILocalFileSystem`, `IConflictArbiter`
//! - **Configuration** - Per-root synchronization settings
//!
//! # Architecture
//!
//! This crate follows the hexagonal (ports & adapters) architecture pattern.
//! The domain module contains pure business logic with no external dependencies.
//! Ports define trait interfaces that adapter crates implement.
//! The engine crate orchestrates domain entities through port interfaces.

use std::path::{Path, PathBuf};

pub mod config;
pub mod domain;
pub mod ports;

/// Name of the hidden per-root metadata folder holding the catalog, the
/// cursor files, and the build flag.
pub const STORE_FOLDER: &str = ".docsync";

/// Extra extension appended to a file name to mark a metadata-only
/// placeholder (`report.txt` -> `report.txt.docsync`).
pub const PLACEHOLDER_EXTENSION: &str = "docsync";

/// Placeholder sibling path for a local file path.
pub fn placeholder_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(PLACEHOLDER_EXTENSION);
    PathBuf::from(name)
}

/// Returns true if the path names a placeholder file.
pub fn is_placeholder_path(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case(PLACEHOLDER_EXTENSION))
        .unwrap_or(false)
}
