//! docsync Engine - Change collectors, executor, and orchestrator
//!
//! Provides:
//! - The local filesystem adapter (lock probing, trash, placeholders)
//! - The three change collectors (full rescan, journal watch, remote delta)
//! - The per-item operation executor
//! - The [`SyncEngine`](engine::SyncEngine) orchestrating build, watch, and
//!   drain loops
//!
//! ## Modules
//!
//! - [`engine`] - Orchestrator: build / watch / drain loops on a shared
//!   cancellation token
//! - [`executor`] - Executes the pending operation of one popped item
//! - [`scan`] - Full local rescan collector (initial build, verification)
//! - [`journal`] - Incremental local change collector over the change journal
//! - [`remote`] - Remote delta collector and full-listing reconciliation
//! - [`filesystem`] - Local filesystem adapter

pub mod engine;
pub mod executor;
pub mod filesystem;
pub mod journal;
pub mod remote;
pub mod scan;

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the operation executor
///
/// Transient obstacles (locked files, direction gates) are postponed rather
/// than raised; these cover the cases that become an item's sticky error.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A pending upload found no file at the tracked local path
    #[error("Local file missing: {0}")]
    LocalFileMissing(PathBuf),

    /// A rename-state item carries no pending name
    #[error("Rename without a pending name: {0}")]
    RenameWithoutName(String),
}
