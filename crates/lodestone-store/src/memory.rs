//! In-memory reference implementations with fault injection.
//!
//! All stores here are cheaply cloneable handles over shared state, the
//! way a wire client handle would be, so several adaptors (one per
//! replica) can share one "deployment" in tests.
//!
//! Fault injection is counter-based: arm a number of failures and the
//! next N operations of that kind fail. The snapshot store additionally
//! supports [`WriteFault::ReportFailureButApply`], which persists the
//! write and still reports failure, the ambiguous outcome the protocol's
//! write-vector reconciliation exists to classify.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use lodestone_types::{ETag, EntityRef, UpdateNotification, Version};

use crate::traits::{
    BusError, Clock, LogStore, LogStoreError, NotificationBus, SnapshotStore, SnapshotStoreError,
    VersionedState,
};

// ============================================================================
// Memory Log Store
// ============================================================================

#[derive(Debug)]
struct LogInner<E> {
    logs: HashMap<EntityRef, Vec<E>>,
    unavailable_appends: u32,
    unavailable_reads: u32,
}

/// Shared in-memory [`LogStore`].
#[derive(Debug)]
pub struct MemoryLogStore<E> {
    inner: Arc<Mutex<LogInner<E>>>,
}

impl<E> Clone for MemoryLogStore<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E> Default for MemoryLogStore<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> MemoryLogStore<E> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(LogInner {
                logs: HashMap::new(),
                unavailable_appends: 0,
                unavailable_reads: 0,
            })),
        }
    }

    /// Arms the next `n` appends to fail with `Unavailable` (nothing is
    /// applied).
    pub fn fail_appends(&self, n: u32) {
        self.inner.lock().expect("log store lock").unavailable_appends = n;
    }

    /// Arms the next `n` reads (including `last_version`) to fail.
    pub fn fail_reads(&self, n: u32) {
        self.inner.lock().expect("log store lock").unavailable_reads = n;
    }
}

impl<E: Clone> MemoryLogStore<E> {
    /// Test helper: the full log for an entity.
    pub fn entries(&self, entity: &EntityRef) -> Vec<E> {
        self.inner
            .lock()
            .expect("log store lock")
            .logs
            .get(entity)
            .cloned()
            .unwrap_or_default()
    }
}

impl<E: Clone> LogStore for MemoryLogStore<E> {
    type Entry = E;

    fn append(
        &mut self,
        entity: &EntityRef,
        entries: &[E],
        expected_version: Version,
    ) -> Result<Version, LogStoreError> {
        let mut inner = self.inner.lock().expect("log store lock");
        if inner.unavailable_appends > 0 {
            inner.unavailable_appends -= 1;
            tracing::debug!(%entity, "injected log append fault");
            return Err(LogStoreError::Unavailable("injected fault".to_string()));
        }
        let log = inner.logs.entry(entity.clone()).or_default();
        let actual = Version::new(log.len() as u64);
        if actual != expected_version {
            return Err(LogStoreError::VersionConflict {
                expected: expected_version,
                actual,
            });
        }
        log.extend_from_slice(entries);
        Ok(Version::new(log.len() as u64))
    }

    fn read(
        &self,
        entity: &EntityRef,
        from_version: Version,
        max_count: usize,
    ) -> Result<Vec<E>, LogStoreError> {
        let mut inner = self.inner.lock().expect("log store lock");
        if inner.unavailable_reads > 0 {
            inner.unavailable_reads -= 1;
            return Err(LogStoreError::Unavailable("injected fault".to_string()));
        }
        let log = inner.logs.get(entity).map(Vec::as_slice).unwrap_or(&[]);
        let start = from_version.as_usize().min(log.len());
        let end = start.saturating_add(max_count).min(log.len());
        Ok(log[start..end].to_vec())
    }

    fn last_version(&self, entity: &EntityRef) -> Result<Option<Version>, LogStoreError> {
        let mut inner = self.inner.lock().expect("log store lock");
        if inner.unavailable_reads > 0 {
            inner.unavailable_reads -= 1;
            return Err(LogStoreError::Unavailable("injected fault".to_string()));
        }
        Ok(inner
            .logs
            .get(entity)
            .map(|log| Version::new(log.len() as u64)))
    }
}

// ============================================================================
// Memory Snapshot Store
// ============================================================================

/// Outcome to inject for one snapshot-store write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteFault {
    /// Report `Unavailable`; the write is not applied.
    Reject,
    /// Report `Unavailable`, but apply the write anyway (ambiguous
    /// outcome under at-least-once delivery).
    ReportFailureButApply,
}

#[derive(Debug)]
struct SnapshotInner {
    records: HashMap<String, (Bytes, ETag)>,
    etag_seq: u64,
    unavailable_reads: u32,
    write_faults: VecDeque<WriteFault>,
}

/// Shared in-memory [`SnapshotStore`].
#[derive(Debug, Clone)]
pub struct MemorySnapshotStore {
    inner: Arc<Mutex<SnapshotInner>>,
}

impl Default for MemorySnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(SnapshotInner {
                records: HashMap::new(),
                etag_seq: 0,
                unavailable_reads: 0,
                write_faults: VecDeque::new(),
            })),
        }
    }

    /// Arms the next `n` reads to fail with `Unavailable`.
    pub fn fail_reads(&self, n: u32) {
        self.inner
            .lock()
            .expect("snapshot store lock")
            .unavailable_reads = n;
    }

    /// Queues a fault for an upcoming write; faults are consumed in order.
    pub fn inject_write_fault(&self, fault: WriteFault) {
        self.inner
            .lock()
            .expect("snapshot store lock")
            .write_faults
            .push_back(fault);
    }

    /// Test helper: the raw stored record, if any.
    pub fn raw_record(&self, key: &str) -> Option<(Bytes, ETag)> {
        self.inner
            .lock()
            .expect("snapshot store lock")
            .records
            .get(key)
            .cloned()
    }
}

impl SnapshotInner {
    fn apply_write(
        &mut self,
        key: &str,
        value: Bytes,
        expected: Option<&ETag>,
    ) -> Result<ETag, SnapshotStoreError> {
        let current = self.records.get(key).map(|(_, etag)| etag);
        if current != expected {
            return Err(SnapshotStoreError::ETagConflict {
                key: key.to_string(),
            });
        }
        self.etag_seq += 1;
        let etag = ETag::new(format!("mem-{}", self.etag_seq));
        self.records.insert(key.to_string(), (value, etag.clone()));
        Ok(etag)
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn read_state(&self, key: &str) -> Result<Option<VersionedState>, SnapshotStoreError> {
        let mut inner = self.inner.lock().expect("snapshot store lock");
        if inner.unavailable_reads > 0 {
            inner.unavailable_reads -= 1;
            return Err(SnapshotStoreError::Unavailable(
                "injected fault".to_string(),
            ));
        }
        Ok(inner.records.get(key).map(|(value, etag)| VersionedState {
            value: value.clone(),
            etag: etag.clone(),
        }))
    }

    fn write_state(
        &mut self,
        key: &str,
        value: Bytes,
        expected: Option<&ETag>,
    ) -> Result<ETag, SnapshotStoreError> {
        let mut inner = self.inner.lock().expect("snapshot store lock");
        match inner.write_faults.pop_front() {
            Some(WriteFault::Reject) => {
                tracing::debug!(key, "injected snapshot write fault (rejected)");
                Err(SnapshotStoreError::Unavailable(
                    "injected fault".to_string(),
                ))
            }
            Some(WriteFault::ReportFailureButApply) => {
                // Persist first, then lie about the outcome.
                let _ = inner.apply_write(key, value, expected)?;
                tracing::debug!(key, "injected snapshot write fault (applied)");
                Err(SnapshotStoreError::Unavailable(
                    "injected fault after apply".to_string(),
                ))
            }
            None => inner.apply_write(key, value, expected),
        }
    }
}

// ============================================================================
// Memory Notification Bus
// ============================================================================

#[derive(Debug)]
struct BusInner<E> {
    inboxes: HashMap<String, VecDeque<(EntityRef, UpdateNotification<E>)>>,
    unavailable: u32,
}

/// Shared in-memory [`NotificationBus`].
///
/// Broadcasts fan out to every registered inbox, including the sender's;
/// receivers discard their own (stale) notifications, which doubles as a
/// duplicate-tolerance check.
#[derive(Debug)]
pub struct MemoryBus<E> {
    inner: Arc<Mutex<BusInner<E>>>,
}

impl<E> Clone for MemoryBus<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E> Default for MemoryBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> MemoryBus<E> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(BusInner {
                inboxes: HashMap::new(),
                unavailable: 0,
            })),
        }
    }

    /// Registers an inbox for a replica name.
    pub fn register(&self, replica: impl Into<String>) {
        self.inner
            .lock()
            .expect("bus lock")
            .inboxes
            .entry(replica.into())
            .or_default();
    }

    /// Drains all pending notifications for a replica.
    pub fn drain(&self, replica: &str) -> Vec<(EntityRef, UpdateNotification<E>)> {
        self.inner
            .lock()
            .expect("bus lock")
            .inboxes
            .get_mut(replica)
            .map(|q| q.drain(..).collect())
            .unwrap_or_default()
    }

    /// Arms the next `n` broadcasts to fail.
    pub fn fail_broadcasts(&self, n: u32) {
        self.inner.lock().expect("bus lock").unavailable = n;
    }
}

impl<E: Clone> NotificationBus for MemoryBus<E> {
    type Entry = E;

    fn broadcast(
        &mut self,
        entity: &EntityRef,
        notification: &UpdateNotification<E>,
    ) -> Result<(), BusError> {
        let mut inner = self.inner.lock().expect("bus lock");
        if inner.unavailable > 0 {
            inner.unavailable -= 1;
            return Err(BusError::Unavailable("injected fault".to_string()));
        }
        for queue in inner.inboxes.values_mut() {
            queue.push_back((entity.clone(), notification.clone()));
        }
        Ok(())
    }
}

// ============================================================================
// Sim Clock
// ============================================================================

#[derive(Debug, Default)]
struct SimClockInner {
    now_ms: u64,
    sleeps: Vec<Duration>,
}

/// Virtual-time [`Clock`]: `sleep` advances time instantly and records
/// the requested delay for inspection.
#[derive(Debug, Clone, Default)]
pub struct SimClock {
    inner: Arc<Mutex<SimClockInner>>,
}

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts the clock at a given epoch-milliseconds value.
    pub fn at(now_ms: u64) -> Self {
        let clock = Self::default();
        clock.inner.lock().expect("clock lock").now_ms = now_ms;
        clock
    }

    /// All delays requested via `sleep`, in order.
    pub fn recorded_sleeps(&self) -> Vec<Duration> {
        self.inner.lock().expect("clock lock").sleeps.clone()
    }
}

impl Clock for SimClock {
    fn now_ms(&self) -> u64 {
        self.inner.lock().expect("clock lock").now_ms
    }

    fn sleep(&mut self, duration: Duration) {
        let mut inner = self.inner.lock().expect("clock lock");
        inner.now_ms += duration.as_millis() as u64;
        inner.sleeps.push(duration);
    }
}
