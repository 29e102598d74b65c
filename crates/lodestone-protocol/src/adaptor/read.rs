//! Read protocol: bring the confirmed view up to date with the shared
//! log, using the snapshot record to avoid full replay.

use lodestone_store::{Clock, LogStore, NotificationBus, SnapshotStore};
use lodestone_types::{SnapshotRecord, Version, WriteVector};

use crate::error::ProtocolError;
use crate::host::ViewHost;
use crate::issue::IssueKind;

use super::{Adaptor, OperationPhase};

/// Why one refresh pass did not complete.
pub(crate) enum RefreshFailure {
    /// Environmental; retried with backoff.
    Transient(IssueKind),
    /// A bug or corrupted persisted data; surfaced immediately.
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
    /// Brings the confirmed view up to date with the shared log.
    ///
    /// Retries transparently until the stores respond; only invariant
    /// violations surface as errors.
    pub fn read(&mut self) -> Result<(), ProtocolError> {
        self.begin(OperationPhase::ReadInProgress)?;
        let result = self.read_to_convergence();
        self.finish();
        if result.is_ok() {
            self.issue.resolve();
            self.stats.reads += 1;
        }
        result
    }

    /// Runs refresh passes until one completes, backing off between
    /// attempts. Does not resolve the issue tracker; callers decide
    /// what counts as an unconditional success.
    pub(crate) fn read_to_convergence(&mut self) -> Result<(), ProtocolError> {
        loop {
            match self.try_refresh() {
                Ok(()) => return Ok(()),
                Err(RefreshFailure::Fatal(error)) => return Err(error),
                Err(RefreshFailure::Transient(kind)) => {
                    let now = self.clock.now_ms();
                    self.issue.record(kind, now);
                    self.stats.transient_failures += 1;
                    let delay = self.issue.delay_before_retry(&self.config.backoff);
                    tracing::warn!(
                        replica = %self.replica,
                        entity = %self.entity,
                        issue = %kind,
                        delay_ms = delay.as_millis() as u64,
                        "refresh failed, backing off"
                    );
                    self.clock.sleep(delay);
                }
            }
        }
    }

    /// One pass of the read protocol: adopt the snapshot record, observe
    /// the log's last version, fold the missing segment.
    fn try_refresh(&mut self) -> Result<(), RefreshFailure> {
        let key = self.entity.metadata_key();

        // Snapshot first: the log only grows between the two reads, so a
        // record read here can never legitimately be ahead of the log
        // version read after it.
        match self.snapshots.read_state(&key) {
            Ok(Some(state)) => {
                let record: SnapshotRecord<H::View> = serde_json::from_slice(&state.value)
                    .map_err(|error| {
                        RefreshFailure::Fatal(ProtocolError::MalformedSnapshotRecord {
                            key: key.clone(),
                            reason: error.to_string(),
                        })
                    })?;
                if record.snapshot_version > self.confirmed_version {
                    tracing::debug!(
                        replica = %self.replica,
                        entity = %self.entity,
                        from = %self.confirmed_version,
                        to = %record.snapshot_version,
                        "adopting newer snapshot"
                    );
                    self.confirmed_view = record.snapshot;
                    self.confirmed_version = record.snapshot_version;
                }
                self.write_vector = record.write_vector;
                self.etag = Some(state.etag);
            }
            Ok(None) => {
                self.write_vector = WriteVector::EMPTY;
                self.etag = None;
            }
            Err(error) => {
                tracing::debug!(
                    replica = %self.replica,
                    entity = %self.entity,
                    %error,
                    "snapshot read failed"
                );
                return Err(RefreshFailure::Transient(IssueKind::SnapshotReadFailed));
            }
        }

        let last = match self.log.last_version(&self.entity) {
            Ok(last) => last.unwrap_or(Version::ZERO),
            Err(error) => {
                tracing::debug!(
                    replica = %self.replica,
                    entity = %self.entity,
                    %error,
                    "log version query failed"
                );
                return Err(RefreshFailure::Transient(IssueKind::LogReadFailed));
            }
        };
        if last > self.global_version {
            self.global_version = last;
        }
        if self.confirmed_version > self.global_version {
            return Err(RefreshFailure::Fatal(ProtocolError::SnapshotAheadOfLog {
                snapshot: self.confirmed_version,
                log: self.global_version,
            }));
        }

        while self.confirmed_version < self.global_version {
            let remaining = (self.global_version - self.confirmed_version) as usize;
            let page = remaining.min(self.config.max_read_batch);
            let entries = match self.log.read(&self.entity, self.confirmed_version, page) {
                Ok(entries) => entries,
                Err(error) => {
                    tracing::debug!(
                        replica = %self.replica,
                        entity = %self.entity,
                        from = %self.confirmed_version,
                        %error,
                        "log segment read failed"
                    );
                    return Err(RefreshFailure::Transient(IssueKind::LogReadFailed));
                }
            };
            if entries.is_empty() {
                // The log reported a length it will not serve yet.
                return Err(RefreshFailure::Transient(IssueKind::LogReadFailed));
            }
            self.fold_batch(&entries);
        }
        Ok(())
    }
}
