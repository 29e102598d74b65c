//! Collaborator interfaces for the Lodestone reconciliation protocol.
//!
//! The protocol core is pure coordination logic; everything that touches
//! the outside world goes through the traits defined here. A production
//! deployment supplies wire clients for a shared log service and a
//! metadata store; tests and simulations supply the in-memory
//! implementations from [`memory`], which support fault injection.
//!
//! This design enables:
//! - **Production**: remote log/metadata/transport clients, [`SystemClock`]
//! - **Testing**: [`memory::MemoryLogStore`], [`memory::MemorySnapshotStore`],
//!   [`memory::MemoryBus`], [`memory::SimClock`]
//!
//! # Contracts
//!
//! The protocol's correctness leans on two store-side guarantees:
//!
//! - [`LogStore::append`] returns [`LogStoreError::VersionConflict`] only
//!   when the request definitively did not apply, and
//!   [`LogStoreError::Unavailable`] only when it was not durably applied.
//! - [`SnapshotStore::write_state`] is at-least-once: a write reported
//!   [`SnapshotStoreError::Unavailable`] may nevertheless have persisted.
//!   The protocol's write-vector reconciliation exists to resolve exactly
//!   that ambiguity.

pub mod memory;
mod traits;

pub use traits::{
    BusError, Clock, LogStore, LogStoreError, NotificationBus, SnapshotStore, SnapshotStoreError,
    SystemClock, VersionedState,
};
