//! Primary-based log-view reconciliation protocol.
//!
//! This crate implements the consistency core for an entity whose durable
//! state is derived by folding an ordered, append-only log. Multiple
//! independent replicas (one per cluster or region) append concurrently
//! and converge on the same folded view without losing or double-applying
//! entries.
//!
//! # Architecture
//!
//! ```text
//! caller queue ──► Adaptor::write ──► shared log store   (expected-version append)
//!                       │
//!                       ├──────────► metadata store      (snapshot + write vector, ETag)
//!                       │
//!                       └──────────► notification bus ──► peer adaptors
//!
//! peer adaptors ──► Adaptor::on_notification ──► apply / buffer / discard
//!                     │ (gap)
//!                     └──► Adaptor::read ──► shared stores
//! ```
//!
//! All I/O goes through the collaborator traits in `lodestone-store`;
//! the adaptor itself is single-threaded per entity, spawns nothing, and
//! blocks only through the injected clock.
//!
//! # Key Types
//!
//! - [`Adaptor`]: the protocol state machine binding one entity to its stores
//! - [`ViewHost`]: caller-supplied fold hooks
//! - [`NotificationQueue`]: buffering and coalescing of peer notifications
//! - [`IssueTracker`]: failure memory driving retry backoff

mod adaptor;
mod config;
mod error;
mod host;
mod issue;
mod notification;
mod stats;


pub use adaptor::{Adaptor, NotificationSummary, OperationPhase, write_landed};
pub use config::{AdaptorConfig, BackoffPolicy};
pub use error::ProtocolError;
pub use host::{ApplyError, ViewHost};
pub use issue::{Issue, IssueKind, IssueTracker};
pub use notification::{InsertOutcome, MERGE_CAP, NotificationQueue};
pub use stats::ProtocolStats;

// Re-export the types the public API surface is written in terms of.
pub use lodestone_types::{
    ETag, EntityRef, ReplicaIdx, ReplicaRegistry, SnapshotRecord, UpdateNotification, Version,
    WriteVector,
};
