//! Conflict arbiter port (driving/primary port)
//!
//! The only user-interactive point in the core: when a reconciliation under
//! the `Manual` policy lands in `Conflict`, the collector offers a copy of
//! the item to an external arbiter and blocks until it returns a resolved
//! state. Everything else runs unattended.

use crate::domain::{ConflictSnapshot, Item, ItemState};

/// Port trait for out-of-band conflict resolution
///
/// Implementations typically prompt the user or apply a rule engine.
/// Returning [`ItemState::Conflict`] keeps the conflict pending; the drain
/// loop will then preserve both versions.
#[async_trait::async_trait]
pub trait IConflictArbiter: Send + Sync {
    /// Decides the resolved state for a conflicting item
    ///
    /// `item` is a copy; mutations to it are not observed by the engine.
    /// Typical return values are `UpdatedLocal` (local wins), `UpdatedRemote`
    /// (remote wins), or `Conflict` (keep both).
    async fn resolve(&self, item: Item, snapshot: ConflictSnapshot) -> ItemState;
}
