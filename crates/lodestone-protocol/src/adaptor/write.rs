//! Write protocol: append the caller's queued updates to the shared log
//! under optimistic concurrency, persist the snapshot record, and resolve
//! ambiguous snapshot-write outcomes through the write vector.

use bytes::Bytes;
use lodestone_store::{Clock, LogStore, LogStoreError, NotificationBus, SnapshotStore};
use lodestone_types::{SnapshotRecord, UpdateNotification, Version, WriteVector};

use crate::error::ProtocolError;
use crate::host::ViewHost;
use crate::issue::IssueKind;

use super::{Adaptor, OperationPhase};

/// Classifies an ambiguous write outcome from write-vector parity: the
/// attempt landed iff the bit observed after a reconciliation read equals
/// the parity the attempt tried to persist.
pub fn write_landed(attempted: bool, observed: bool) -> bool {
    attempted == observed
}

/// Why a snapshot write did not confirm.
pub(crate) enum PersistFailure {
    /// The store erred; under at-least-once semantics the write may or
    /// may not have landed.
    Unconfirmed,
    /// Encoding failed; a bug, surfaced immediately.
    Fatal(ProtocolError),
}

impl<H, L, S, N, C> Adaptor<H, L, S, N, C>
where
    H: ViewHost,
    L: LogStore<Entry = H::Entry>,
    S: SnapshotStore,
    N: NotificationBus<Entry = H::Entry>,
    C: Clock,
{
    /// Appends the caller's queued updates to the shared log.
    ///
    /// Returns how many entries the caller may drop from its local queue:
    /// the full batch once the append and the snapshot write are
    /// confirmed (directly or through reconciliation), or 0 when the
    /// batch must be retried later. Partial acceptance does not happen.
    pub fn write(&mut self, updates: &[H::Update]) -> Result<usize, ProtocolError> {
        self.begin(OperationPhase::WriteInProgress)?;
        let result = self.write_inner(updates);
        self.finish();
        result
    }

    fn write_inner(&mut self, updates: &[H::Update]) -> Result<usize, ProtocolError> {
        if updates.is_empty() {
            return Ok(0);
        }
        let entries: Vec<H::Entry> = updates
            .iter()
            .map(|update| self.host.make_entry(update))
            .collect();

        // Flip our marker on a scratch copy before the append; the
        // attempted parity is what reconciliation compares against.
        let mut scratch = self.write_vector;
        let attempt_bit = scratch.flip(self.replica);

        match self.log.append(&self.entity, &entries, self.global_version) {
            Ok(new_version) => {
                debug_assert_eq!(
                    new_version.as_u64(),
                    self.global_version.as_u64() + entries.len() as u64,
                    "append advanced the log by a different amount than the batch"
                );
                self.global_version = new_version;
                self.fold_batch(&entries);
            }
            Err(LogStoreError::VersionConflict { expected, actual }) => {
                self.stats.version_conflicts += 1;
                let now = self.clock.now_ms();
                self.issue.record(IssueKind::LogAppendFailed, now);
                tracing::debug!(
                    replica = %self.replica,
                    entity = %self.entity,
                    %expected,
                    %actual,
                    "append lost the race, reconciling before caller retry"
                );
                // A conflict is definitive: nothing was appended. Catch up
                // so the caller's retry starts from fresh state instead of
                // re-conflicting forever.
                self.read_to_convergence()?;
                return Ok(0);
            }
            Err(LogStoreError::Unavailable(reason)) => {
                self.stats.transient_failures += 1;
                let now = self.clock.now_ms();
                self.issue.record(IssueKind::LogAppendFailed, now);
                tracing::warn!(
                    replica = %self.replica,
                    entity = %self.entity,
                    %reason,
                    "append failed, batch stays queued"
                );
                return Ok(0);
            }
        }

        let version_after_append = self.global_version;

        match self.persist_snapshot(scratch) {
            Ok(()) => {}
            Err(PersistFailure::Fatal(error)) => return Err(error),
            Err(PersistFailure::Unconfirmed) => {
                self.stats.ambiguous_writes += 1;
                self.reconcile_unconfirmed_snapshot(scratch, attempt_bit)?;
            }
        }

        self.issue.resolve();
        self.stats.batches_accepted += 1;
        self.stats.entries_appended += entries.len() as u64;
        let accepted = entries.len();
        self.broadcast_batch(entries, version_after_append);
        Ok(accepted)
    }

    /// Resolves an unconfirmed snapshot write.
    ///
    /// The batch is already in the log; only the snapshot record's fate
    /// is unknown. Loop: back off, re-run the read protocol to
    /// convergence, then compare the attempted parity against the bit
    /// now observed. A match means the write landed (directly, or a
    /// peer's write persisted our marker); a mismatch means it
    /// definitively did not, so the snapshot write is retried against
    /// the freshly observed record. Entries are never re-appended.
    fn reconcile_unconfirmed_snapshot(
        &mut self,
        mut scratch: WriteVector,
        mut attempt_bit: bool,
    ) -> Result<(), ProtocolError> {
        tracing::debug!(
            replica = %self.replica,
            entity = %self.entity,
            "snapshot write unconfirmed, reconciling"
        );
        loop {
            let delay = self.issue.delay_before_retry(&self.config.backoff);
            self.clock.sleep(delay);
            self.read_to_convergence()?;

            let observed = self.write_vector.get(self.replica);
            if write_landed(attempt_bit, observed) {
                self.stats.ambiguous_writes_landed += 1;
                tracing::debug!(
                    replica = %self.replica,
                    entity = %self.entity,
                    "unconfirmed snapshot write had landed"
                );
                return Ok(());
            }

            scratch = self.write_vector;
            attempt_bit = scratch.flip(self.replica);
            match self.persist_snapshot(scratch) {
                Ok(()) => return Ok(()),
                Err(PersistFailure::Fatal(error)) => return Err(error),
                Err(PersistFailure::Unconfirmed) => {}
            }
        }
    }

    /// Persists the current confirmed view plus the given write vector
    /// under the last observed ETag. Adopts the store's new ETag and the
    /// vector on success.
    fn persist_snapshot(&mut self, scratch: WriteVector) -> Result<(), PersistFailure> {
        let key = self.entity.metadata_key();
        let record = SnapshotRecord {
            snapshot: self.confirmed_view.clone(),
            snapshot_version: self.confirmed_version,
            write_vector: scratch,
        };
        let encoded = serde_json::to_vec(&record).map_err(|error| {
            PersistFailure::Fatal(ProtocolError::SnapshotEncoding {
                key: key.clone(),
                reason: error.to_string(),
            })
        })?;
        match self
            .snapshots
            .write_state(&key, Bytes::from(encoded), self.etag.as_ref())
        {
            Ok(etag) => {
                self.etag = Some(etag);
                self.write_vector = scratch;
                tracing::debug!(
                    replica = %self.replica,
                    entity = %self.entity,
                    version = %self.confirmed_version,
                    "snapshot persisted"
                );
                Ok(())
            }
            Err(error) => {
                self.stats.transient_failures += 1;
                let now = self.clock.now_ms();
                self.issue.record(IssueKind::SnapshotWriteFailed, now);
                tracing::warn!(
                    replica = %self.replica,
                    entity = %self.entity,
                    %error,
                    "snapshot write unconfirmed"
                );
                Err(PersistFailure::Unconfirmed)
            }
        }
    }

    /// Tells peers about an accepted batch. Failures are advisory: peers
    /// converge through the shared stores regardless.
    fn broadcast_batch(&mut self, entries: Vec<H::Entry>, version: Version) {
        let notification = UpdateNotification {
            origin: self.replica,
            version,
            updates: entries,
            etag: self.etag.clone(),
        };
        if let Err(error) = self.bus.broadcast(&self.entity, &notification) {
            tracing::warn!(
                replica = %self.replica,
                entity = %self.entity,
                %error,
                "notification broadcast failed, peers will converge via read"
            );
        }
    }
}
