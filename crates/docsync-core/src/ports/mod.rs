//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. Ports are interfaces that the domain core
//! depends on, but whose implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IItemCatalog`] - Durable per-root catalog of tracked items and cursors
//! - [`IDocumentStore`] - Remote document-store operations
//! - [`IChangeJournal`] - Local filesystem change-journal reader
//! - [`ILocalFileSystem`] - Local filesystem operations
//! - [`IConflictArbiter`] - Out-of-band resolution of manual conflicts

pub mod change_journal;
pub mod conflict_arbiter;
pub mod document_store;
pub mod item_catalog;
pub mod local_filesystem;

pub use change_journal::{reason, IChangeJournal, JournalBatch, JournalEntry};
pub use conflict_arbiter::IConflictArbiter;
pub use document_store::{
    DeltaBatch, IDocumentStore, RemoteDelta, RemoteDeltaKind, RemoteItem,
};
pub use item_catalog::IItemCatalog;
pub use local_filesystem::{FileSystemState, ILocalFileSystem};
