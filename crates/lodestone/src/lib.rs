//! # Lodestone
//!
//! Consistency for entities whose durable state is the fold of a shared,
//! append-only log, replicated across independent clusters or regions.
//!
//! Each replica keeps an in-memory *confirmed view* of the folded log,
//! appends its locally queued updates under optimistic concurrency,
//! checkpoints the view (plus a per-replica write marker) to a small
//! metadata store, and gossips notifications so peers advance without
//! re-reading shared storage. Replicas converge on the same view without
//! losing or double-applying entries, including when a store fails
//! ambiguously mid-write.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         one replica                          │
//! │  caller queue ──► Adaptor ──► LogStore      (shared, append) │
//! │                     │   └───► SnapshotStore (shared, ETag)   │
//! │                     └───────► NotificationBus ──► peers      │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```ignore
//! use lodestone::{Adaptor, AdaptorConfig, EntityRef, ReplicaRegistry, ViewHost};
//!
//! let registry = ReplicaRegistry::new(vec!["us-east".into(), "eu-west".into()])?;
//! let mut adaptor = Adaptor::new(
//!     host, log_client, metadata_client, bus, clock,
//!     AdaptorConfig::default(), registry, "us-east",
//!     EntityRef::new("account", "alice"),
//! )?;
//!
//! adaptor.read()?;                       // catch up with the shared log
//! let accepted = adaptor.write(&queued)?; // 0 or the whole batch
//! queued.drain(..accepted);
//! ```
//!
//! # Crates
//!
//! - `lodestone-protocol`: the reconciliation protocol (the core)
//! - `lodestone-store`: collaborator traits + in-memory reference impls
//! - `lodestone-types`: shared newtypes and persisted records

// Protocol core
pub use lodestone_protocol::{
    Adaptor, AdaptorConfig, ApplyError, BackoffPolicy, Issue, IssueKind, IssueTracker, MERGE_CAP,
    NotificationQueue, NotificationSummary, OperationPhase, ProtocolError, ProtocolStats,
    ViewHost, write_landed,
};

// Collaborator interfaces
pub use lodestone_store::{
    BusError, Clock, LogStore, LogStoreError, NotificationBus, SnapshotStore, SnapshotStoreError,
    SystemClock, VersionedState,
};

// In-memory reference implementations (tests, simulations, examples)
pub use lodestone_store::memory;

// Core types
pub use lodestone_types::{
    ETag, EntityRef, ReplicaIdx, ReplicaRegistry, RegistryError, SnapshotRecord,
    UpdateNotification, Version, WRITE_VECTOR_CAPACITY, WriteVector, WriteVectorError,
};
