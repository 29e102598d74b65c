//! Trait abstractions for the protocol's external collaborators.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use lodestone_types::{ETag, EntityRef, UpdateNotification, Version};

// ============================================================================
// Clock Trait
// ============================================================================

/// Abstraction for time-based operations.
///
/// Production uses system time; tests use a simulated clock so backoff
/// delays are observable without real waiting.
pub trait Clock {
    /// Returns the current time in milliseconds since epoch.
    fn now_ms(&self) -> u64;

    /// Sleeps for the specified duration.
    ///
    /// In simulation this advances virtual time rather than blocking.
    fn sleep(&mut self, duration: Duration);
}

/// Wall-clock implementation of [`Clock`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }

    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

// ============================================================================
// Log Store Trait
// ============================================================================

/// Client interface to the shared append-only log.
///
/// The log is strictly ordered and gap-free per entity; entries are
/// immutable once appended. Concurrency control is optimistic: an append
/// names the version it expects the log to be at.
pub trait LogStore {
    /// Application-defined log entry payload.
    type Entry;

    /// Appends a batch of entries, expecting the log to currently be at
    /// `expected_version`. Returns the new last version on success.
    ///
    /// # Contract
    ///
    /// - [`LogStoreError::VersionConflict`] is definitive: nothing was
    ///   appended.
    /// - [`LogStoreError::Unavailable`] is returned only when the request
    ///   was not durably applied. A client that cannot guarantee this must
    ///   make appends idempotent before surfacing them through this trait.
    fn append(
        &mut self,
        entity: &EntityRef,
        entries: &[Self::Entry],
        expected_version: Version,
    ) -> Result<Version, LogStoreError>;

    /// Reads up to `max_count` entries starting at `from_version`
    /// (zero-based, inclusive), in log order.
    fn read(
        &self,
        entity: &EntityRef,
        from_version: Version,
        max_count: usize,
    ) -> Result<Vec<Self::Entry>, LogStoreError>;

    /// Returns the log's last version, or `None` if the entity has no
    /// log yet.
    fn last_version(&self, entity: &EntityRef) -> Result<Option<Version>, LogStoreError>;
}

/// Errors from the shared log store.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LogStoreError {
    #[error("version conflict: expected {expected}, log is at {actual}")]
    VersionConflict { expected: Version, actual: Version },

    #[error("log store unavailable: {0}")]
    Unavailable(String),
}

// ============================================================================
// Snapshot Store Trait
// ============================================================================

/// A value read from the metadata store together with its ETag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedState {
    /// Serialized record bytes.
    pub value: Bytes,
    /// Optimistic-concurrency token for the next write.
    pub etag: ETag,
}

/// Client interface to the small metadata/snapshot key-value store.
///
/// Writes are conditional on the caller's last observed ETag. The store
/// is at-least-once: a write that errors may still have persisted.
pub trait SnapshotStore {
    /// Reads the current value and ETag for a key, or `None` if the key
    /// has never been written.
    fn read_state(&self, key: &str) -> Result<Option<VersionedState>, SnapshotStoreError>;

    /// Writes a value conditionally on `expected` matching the stored
    /// ETag (`None` = the key must not exist yet). Returns the new ETag.
    fn write_state(
        &mut self,
        key: &str,
        value: Bytes,
        expected: Option<&ETag>,
    ) -> Result<ETag, SnapshotStoreError>;
}

/// Errors from the metadata/snapshot store.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SnapshotStoreError {
    #[error("etag conflict on key {key:?}")]
    ETagConflict { key: String },

    #[error("snapshot store unavailable: {0}")]
    Unavailable(String),
}

// ============================================================================
// Notification Bus Trait
// ============================================================================

/// Transport for cross-replica update notifications.
///
/// Delivery is at-least-once and unordered across senders; receivers must
/// tolerate duplicates and gaps. Broadcast failures are advisory; peers
/// converge through the shared stores regardless.
pub trait NotificationBus {
    /// Log entry payload carried inside notifications.
    type Entry;

    /// Broadcasts a notification about `entity` to all peer replicas.
    fn broadcast(
        &mut self,
        entity: &EntityRef,
        notification: &UpdateNotification<Self::Entry>,
    ) -> Result<(), BusError>;
}

/// Errors from the notification transport.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    #[error("notification bus unavailable: {0}")]
    Unavailable(String),
}
