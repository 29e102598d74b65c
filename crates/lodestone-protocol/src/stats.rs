//! Protocol counters.

/// Operational counters for one adaptor instance.
///
/// Plain values surfaced through [`crate::Adaptor::stats`]; the adaptor is
/// single-threaded per entity, so no atomics are needed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProtocolStats {
    /// Completed read protocols.
    pub reads: u64,
    /// Write batches reported accepted.
    pub batches_accepted: u64,
    /// Entries appended by accepted batches.
    pub entries_appended: u64,
    /// Appends rejected because a peer raced ahead.
    pub version_conflicts: u64,
    /// Transient store failures observed (all kinds).
    pub transient_failures: u64,
    /// Write reconciliations entered after an unconfirmed snapshot write.
    pub ambiguous_writes: u64,
    /// Reconciliations classified as "write landed" via the write vector.
    pub ambiguous_writes_landed: u64,
    /// Peer notifications folded into the view.
    pub notifications_applied: u64,
    /// Notifications coalesced into an adjacent buffered one.
    pub notifications_merged: u64,
    /// Stale notifications dropped.
    pub notifications_discarded: u64,
    /// Buffered notifications evicted by the capacity bound.
    pub notifications_evicted: u64,
    /// Apply-hook failures isolated during folding.
    pub apply_failures: u64,
}
