//! Domain entities and value types
//!
//! Pure business logic with no I/O: the `Item` entity and its state machine,
//! strongly-typed identifiers, and domain error types.

pub mod errors;
pub mod item;
pub mod newtypes;

pub use errors::DomainError;
pub use item::{ConflictPolicy, ConflictSnapshot, Item, ItemKind, ItemState, PassTag};
pub use newtypes::{ChangeCursor, Etag, ItemId, JournalCursor, RemoteId};
