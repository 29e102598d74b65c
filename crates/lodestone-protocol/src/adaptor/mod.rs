//! The reconciliation adaptor.
//!
//! One adaptor instance owns the folded state of one entity on one
//! replica. It exposes three operations to the hosting runtime:
//!
//! - [`Adaptor::read`]: bring the confirmed view up to date with the
//!   shared log, using the snapshot to avoid full replay.
//! - [`Adaptor::write`]: append the caller's queued updates under
//!   optimistic concurrency and publish the result.
//! - [`Adaptor::on_notification`]: ingest a peer's gossip so this
//!   replica advances without a remote read.
//!
//! The hosting runtime guarantees one logical operation in flight at a
//! time; the [`OperationPhase`] guard turns a violated assumption into a
//! fatal error instead of corrupted state. Retries against unavailable
//! stores are transparent and indefinite, paced by the issue tracker.

mod read;
mod write;

pub use write::write_landed;

use std::fmt::{self, Display};

use lodestone_store::{Clock, LogStore, NotificationBus, SnapshotStore};
use lodestone_types::{
    ETag, EntityRef, ReplicaIdx, ReplicaRegistry, UpdateNotification, Version, WriteVector,
};

use crate::config::AdaptorConfig;
use crate::error::ProtocolError;
use crate::host::ViewHost;
use crate::issue::{Issue, IssueTracker};
use crate::notification::{InsertOutcome, NotificationQueue};
use crate::stats::ProtocolStats;

// ============================================================================
// Re-entrancy Guard
// ============================================================================

/// What the adaptor is currently doing.
///
/// The hosting runtime's turn model makes overlap impossible; this guard
/// exists to fail loudly if that assumption is ever broken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OperationPhase {
    #[default]
    Idle,
    ReadInProgress,
    WriteInProgress,
}

impl Display for OperationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::ReadInProgress => "reading",
            Self::WriteInProgress => "writing",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Notification Summary
// ============================================================================

/// Result of processing one incoming notification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotificationSummary {
    /// Notifications folded into the view (the incoming one may have
    /// unblocked buffered ones).
    pub applied: usize,
    /// Stale notifications dropped.
    pub discarded: usize,
    /// Notifications still buffered awaiting a missing range.
    pub buffered: usize,
    /// True when a gap remains; the host should schedule a read.
    pub needs_read: bool,
}

// ============================================================================
// Adaptor
// ============================================================================

/// Protocol state machine binding one entity to its stores.
pub struct Adaptor<H, L, S, N, C>
where
    H: ViewHost,
    L: LogStore<Entry = H::Entry>,
    S: SnapshotStore,
    N: NotificationBus<Entry = H::Entry>,
    C: Clock,
{
    // ========================================================================
    // Collaborators
    // ========================================================================
    pub(crate) host: H,
    pub(crate) log: L,
    pub(crate) snapshots: S,
    pub(crate) bus: N,
    pub(crate) clock: C,

    // ========================================================================
    // Identity
    // ========================================================================
    pub(crate) config: AdaptorConfig,
    pub(crate) registry: ReplicaRegistry,
    /// This replica's bit index.
    pub(crate) replica: ReplicaIdx,
    pub(crate) entity: EntityRef,

    // ========================================================================
    // Confirmed State
    // ========================================================================
    /// The folded application state.
    pub(crate) confirmed_view: H::View,
    /// Number of log entries folded into `confirmed_view`.
    pub(crate) confirmed_version: Version,
    /// Highest log version observed from the stores or from peers.
    ///
    /// Invariant: `confirmed_version <= global_version`.
    pub(crate) global_version: Version,

    // ========================================================================
    // Metadata Cache
    // ========================================================================
    /// Last observed per-replica write markers.
    pub(crate) write_vector: WriteVector,
    /// Last observed snapshot-store ETag, if any record exists.
    pub(crate) etag: Option<ETag>,

    // ========================================================================
    // Operational State
    // ========================================================================
    pub(crate) phase: OperationPhase,
    pub(crate) queue: NotificationQueue<H::Entry>,
    pub(crate) issue: IssueTracker,
    pub(crate) stats: ProtocolStats,
}

impl<H, L, S, N, C> Adaptor<H, L, S, N, C>
where
    H: ViewHost,
    L: LogStore<Entry = H::Entry>,
    S: SnapshotStore,
    N: NotificationBus<Entry = H::Entry>,
    C: Clock,
{
    /// Creates an adaptor for one entity.
    ///
    /// `replica_name` must be registered; the resulting instance starts
    /// with an empty view at version zero and learns everything else from
    /// the stores.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        host: H,
        log: L,
        snapshots: S,
        bus: N,
        clock: C,
        config: AdaptorConfig,
        registry: ReplicaRegistry,
        replica_name: &str,
        entity: EntityRef,
    ) -> Result<Self, ProtocolError> {
        let replica = registry
            .index_of(replica_name)
            .ok_or_else(|| ProtocolError::UnknownReplica(replica_name.to_string()))?;
        let confirmed_view = host.initial_view();
        let queue = NotificationQueue::new(config.max_buffered_notifications);
        Ok(Self {
            host,
            log,
            snapshots,
            bus,
            clock,
            config,
            registry,
            replica,
            entity,
            confirmed_view,
            confirmed_version: Version::ZERO,
            global_version: Version::ZERO,
            write_vector: WriteVector::EMPTY,
            etag: None,
            phase: OperationPhase::default(),
            queue,
            issue: IssueTracker::new(),
            stats: ProtocolStats::default(),
        })
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// The folded application state.
    pub fn confirmed_view(&self) -> &H::View {
        &self.confirmed_view
    }

    /// Number of log entries folded into the confirmed view.
    pub fn confirmed_version(&self) -> Version {
        self.confirmed_version
    }

    /// Highest log version this adaptor has observed.
    pub fn global_version(&self) -> Version {
        self.global_version
    }

    /// This replica's bit index.
    pub fn replica(&self) -> ReplicaIdx {
        self.replica
    }

    /// The entity this adaptor maintains.
    pub fn entity(&self) -> &EntityRef {
        &self.entity
    }

    /// Last observed write vector.
    pub fn write_vector(&self) -> WriteVector {
        self.write_vector
    }

    /// Last observed snapshot-store ETag.
    pub fn etag(&self) -> Option<&ETag> {
        self.etag.as_ref()
    }

    /// Operational counters.
    pub fn stats(&self) -> ProtocolStats {
        self.stats
    }

    /// The unresolved storage issue, if any.
    pub fn last_issue(&self) -> Option<&Issue> {
        self.issue.last()
    }

    /// Delay the caller should wait before retrying a rejected write.
    /// Zero when no issue is outstanding.
    pub fn retry_delay(&self) -> std::time::Duration {
        self.issue.delay_before_retry(&self.config.backoff)
    }

    // ========================================================================
    // Re-entrancy Guard
    // ========================================================================

    pub(crate) fn begin(&mut self, next: OperationPhase) -> Result<(), ProtocolError> {
        if self.phase != OperationPhase::Idle {
            return Err(ProtocolError::Reentrant {
                current: self.phase,
            });
        }
        self.phase = next;
        Ok(())
    }

    pub(crate) fn finish(&mut self) {
        self.phase = OperationPhase::Idle;
    }

    // ========================================================================
    // Folding
    // ========================================================================

    /// Folds a contiguous batch of entries into the confirmed view.
    ///
    /// Apply failures are isolated per entry: the entry still counts as
    /// folded so the view keeps converging with its peers.
    pub(crate) fn fold_batch(&mut self, entries: &[H::Entry]) {
        for entry in entries {
            if let Err(error) = self.host.apply(&mut self.confirmed_view, entry) {
                self.stats.apply_failures += 1;
                tracing::warn!(
                    replica = %self.replica,
                    entity = %self.entity,
                    version = %self.confirmed_version,
                    %error,
                    "apply hook rejected entry, skipping"
                );
            }
            self.confirmed_version += 1;
        }
        debug_assert!(
            self.confirmed_version <= self.global_version,
            "confirmed {} ahead of global {}",
            self.confirmed_version,
            self.global_version
        );
    }

    // ========================================================================
    // Notification Processing
    // ========================================================================

    /// Ingests one peer notification: buffers or coalesces it, then
    /// applies every notification that has become contiguous with the
    /// observed log.
    pub fn on_notification(
        &mut self,
        notification: UpdateNotification<H::Entry>,
    ) -> Result<NotificationSummary, ProtocolError> {
        if self.phase != OperationPhase::Idle {
            return Err(ProtocolError::Reentrant {
                current: self.phase,
            });
        }
        if notification.origin.as_usize() >= self.registry.len() {
            return Err(ProtocolError::UnknownOrigin {
                origin: notification.origin,
                registered: self.registry.len(),
            });
        }
        if notification.start_version().is_none() {
            return Err(ProtocolError::MalformedNotification {
                version: notification.version,
                updates: notification.updates.len(),
            });
        }

        match self.queue.insert(notification) {
            InsertOutcome::Merged => self.stats.notifications_merged += 1,
            InsertOutcome::Buffered { evicted: true }
            | InsertOutcome::ReplacedEarlier
            | InsertOutcome::DroppedOverflow => self.stats.notifications_evicted += 1,
            InsertOutcome::Buffered { evicted: false } | InsertOutcome::Duplicate => {}
        }

        let mut summary = NotificationSummary::default();
        loop {
            let (discarded, next) = self.queue.pop_applicable(self.global_version);
            summary.discarded += discarded;
            self.stats.notifications_discarded += discarded as u64;
            match next {
                Some(applicable) => {
                    self.apply_notification(applicable);
                    summary.applied += 1;
                }
                None => break,
            }
        }
        summary.buffered = self.queue.len();
        summary.needs_read = !self.queue.is_empty();
        Ok(summary)
    }

    /// Applies one contiguous notification: adopt the origin's marker and
    /// ETag, advance the observed log version, fold the updates.
    fn apply_notification(&mut self, notification: UpdateNotification<H::Entry>) {
        let start = notification
            .start_version()
            .expect("validated on receipt");
        debug_assert_eq!(start, self.global_version, "notification not contiguous");
        debug_assert_eq!(
            self.confirmed_version, self.global_version,
            "view lags the observed log at rest"
        );

        self.write_vector.flip(notification.origin);
        if let Some(etag) = notification.etag {
            self.etag = Some(etag);
        }
        self.global_version = notification.version;
        tracing::debug!(
            replica = %self.replica,
            entity = %self.entity,
            origin = %notification.origin,
            from = %start,
            to = %notification.version,
            "applying peer notification"
        );
        self.fold_batch(&notification.updates);
        self.stats.notifications_applied += 1;
    }
}
