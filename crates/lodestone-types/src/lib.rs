//! # lodestone-types: Core types for Lodestone
//!
//! This crate contains shared types used across the Lodestone system:
//! - Log positions ([`Version`])
//! - Entity addressing ([`EntityRef`])
//! - Replica addressing ([`ReplicaIdx`], [`ReplicaRegistry`])
//! - Optimistic-concurrency tokens ([`ETag`])
//! - Persisted records ([`SnapshotRecord`], [`UpdateNotification`])
//! - Write-attempt markers ([`WriteVector`])

use std::fmt::{self, Debug, Display};
use std::ops::{Add, AddAssign, Sub};

use serde::{Deserialize, Serialize};

mod write_vector;

pub use write_vector::{
    ReplicaRegistry, RegistryError, WRITE_VECTOR_CAPACITY, WriteVector, WriteVectorError,
};

// ============================================================================
// Version - Copy (cheap 8-byte value)
// ============================================================================

/// Position in the shared log, counted as the number of entries before it.
///
/// A replica whose confirmed version is `n` has folded exactly the first
/// `n` entries of the log. Versions are zero-based and gap-free per entity.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Version(u64);

impl Version {
    pub const ZERO: Version = Version(0);

    pub fn new(version: u64) -> Self {
        Self(version)
    }

    /// Returns the version as a `u64`.
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Returns the version as a `usize` for indexing.
    ///
    /// # Panics
    ///
    /// Panics on 32-bit platforms if the version exceeds `usize::MAX`.
    pub fn as_usize(&self) -> usize {
        self.0 as usize
    }

    /// Returns the version `n` entries back, or `None` if that would
    /// precede the start of the log.
    pub fn checked_sub(self, n: u64) -> Option<Version> {
        self.0.checked_sub(n).map(Version)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add<u64> for Version {
    type Output = Self;
    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl AddAssign<u64> for Version {
    fn add_assign(&mut self, rhs: u64) {
        self.0 += rhs;
    }
}

impl Sub for Version {
    type Output = u64;
    fn sub(self, rhs: Self) -> u64 {
        self.0 - rhs.0
    }
}

impl From<u64> for Version {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Version> for u64 {
    fn from(version: Version) -> Self {
        version.0
    }
}

// ============================================================================
// Replica Index - Copy (cheap 1-byte value)
// ============================================================================

/// Bit position of a replica in the [`WriteVector`], assigned by the
/// [`ReplicaRegistry`].
///
/// Indices are stable for the lifetime of a registry; they carry no
/// ordering or causality meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReplicaIdx(u8);

impl ReplicaIdx {
    /// Creates a replica index.
    ///
    /// Callers outside the registry should prefer
    /// [`ReplicaRegistry::index_of`]; this constructor does not check
    /// against any registry.
    pub fn new(idx: u8) -> Self {
        debug_assert!(
            (idx as usize) < WRITE_VECTOR_CAPACITY,
            "replica index {idx} out of write-vector capacity"
        );
        Self(idx)
    }

    pub fn as_u8(&self) -> u8 {
        self.0
    }

    pub fn as_usize(&self) -> usize {
        self.0 as usize
    }
}

impl Display for ReplicaIdx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Entity Addressing
// ============================================================================

/// Address of one replicated entity: a kind (entity type) plus an id.
///
/// The pair doubles as the metadata-store key for the entity's snapshot
/// record and as the log-store addressing tuple.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: String,
    pub id: String,
}

impl EntityRef {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// Key under which this entity's snapshot record is stored.
    pub fn metadata_key(&self) -> String {
        format!("{}/{}", self.kind, self.id)
    }
}

impl Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

// ============================================================================
// ETag
// ============================================================================

/// Opaque version token for optimistic-concurrency writes to the
/// metadata store.
///
/// ETags are compared only for equality; their contents are owned by the
/// store implementation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ETag(String);

impl ETag {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ETag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ETag {
    fn from(tag: String) -> Self {
        Self(tag)
    }
}

// ============================================================================
// Snapshot Record
// ============================================================================

/// Periodic persisted copy of the confirmed view, used to bound log
/// replay and to carry the per-replica write markers.
///
/// Invariant: `snapshot_version` never exceeds the log's last version at
/// any time the record is read. The store-side ETag travels beside the
/// record in the store API, not inside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord<V> {
    /// The folded application state at `snapshot_version`.
    pub snapshot: V,
    /// Number of log entries folded into `snapshot`.
    pub snapshot_version: Version,
    /// One write-attempt parity bit per registered replica.
    pub write_vector: WriteVector,
}

// ============================================================================
// Update Notification
// ============================================================================

/// Gossip message a replica sends after a successful write so peers can
/// advance without reading shared storage directly.
///
/// `version` is the global version *after* applying `updates`, so the
/// starting version is `version - updates.len()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateNotification<E> {
    /// Replica that performed the write.
    pub origin: ReplicaIdx,
    /// Global log version after `updates`.
    pub version: Version,
    /// The appended entries, in log order.
    pub updates: Vec<E>,
    /// Metadata-store ETag after the writer's snapshot persisted, if known.
    pub etag: Option<ETag>,
}

impl<E> UpdateNotification<E> {
    /// Global version immediately before `updates`, or `None` when the
    /// notification is malformed (`updates.len() > version`).
    pub fn start_version(&self) -> Option<Version> {
        self.version.checked_sub(self.updates.len() as u64)
    }

    /// Ending version; alias for the `version` field, for symmetry with
    /// [`Self::start_version`].
    pub fn end_version(&self) -> Version {
        self.version
    }
}
