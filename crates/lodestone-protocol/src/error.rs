//! Fatal protocol errors.
//!
//! Transient storage failures never appear here; they are recorded as
//! issues and retried. Everything in [`ProtocolError`] signals a bug or
//! corrupted persisted data and is surfaced immediately.

use lodestone_types::{ReplicaIdx, Version};
use thiserror::Error;

use crate::adaptor::OperationPhase;

#[derive(Debug, Error)]
pub enum ProtocolError {
    /// An operation was started while another was in flight. The hosting
    /// runtime must serialize operations per entity.
    #[error("operation started while adaptor is {current}")]
    Reentrant { current: OperationPhase },

    /// The persisted snapshot record could not be decoded.
    #[error("malformed snapshot record at {key:?}: {reason}")]
    MalformedSnapshotRecord { key: String, reason: String },

    /// The confirmed view could not be serialized for persistence.
    #[error("snapshot record for {key:?} failed to encode: {reason}")]
    SnapshotEncoding { key: String, reason: String },

    /// A notification claims more updates than its version allows.
    #[error("notification claims {updates} updates at version {version}")]
    MalformedNotification { version: Version, updates: usize },

    /// The local replica name is not in the registry.
    #[error("replica {0:?} is not in the registry")]
    UnknownReplica(String),

    /// A notification names an origin index outside the registry.
    #[error("notification origin {origin} outside registry of {registered} replicas")]
    UnknownOrigin { origin: ReplicaIdx, registered: usize },

    /// The metadata store holds a snapshot ahead of the log it summarizes.
    #[error("snapshot at version {snapshot} is ahead of log at {log}")]
    SnapshotAheadOfLog { snapshot: Version, log: Version },
}
