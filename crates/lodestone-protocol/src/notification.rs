//! Buffering and coalescing of peer notifications.
//!
//! Notifications arrive at-least-once and unordered. The queue keys them
//! by starting version, coalesces adjacent ranges from the same origin to
//! bound memory without redundant network reads, drops stale ranges, and
//! hands back exactly the notification that applies next.

use std::collections::BTreeMap;

use lodestone_types::{UpdateNotification, Version};

/// Maximum combined update count for a coalesced notification. Merging
/// beyond this falls back to keeping only the later notification; the
/// dropped range is recovered through the read protocol.
pub const MERGE_CAP: usize = 200;

/// What happened to an inserted notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Stored as a new buffered notification. `evicted` is set when the
    /// capacity bound pushed out the furthest-future notification.
    Buffered { evicted: bool },
    /// Coalesced into an adjacent buffered notification from the same
    /// origin.
    Merged,
    /// Merging would exceed [`MERGE_CAP`]; only the later of the two
    /// notifications was kept.
    ReplacedEarlier,
    /// A notification covering this starting version is already buffered.
    Duplicate,
    /// The buffer is full and this notification was the furthest future.
    DroppedOverflow,
}

/// Version-ordered buffer of pending peer notifications.
#[derive(Debug)]
pub struct NotificationQueue<E> {
    buffer: BTreeMap<Version, UpdateNotification<E>>,
    max_buffered: usize,
}

impl<E> NotificationQueue<E> {
    pub fn new(max_buffered: usize) -> Self {
        Self {
            buffer: BTreeMap::new(),
            max_buffered: max_buffered.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Inserts a notification, coalescing with adjacent buffered ranges
    /// from the same origin where possible.
    ///
    /// The caller has already validated the notification, so
    /// `start_version` is known to exist.
    pub fn insert(&mut self, notification: UpdateNotification<E>) -> InsertOutcome {
        let start = notification
            .start_version()
            .expect("caller validates notifications before insert");

        if let Some(existing) = self.buffer.get(&start) {
            // Same starting version: keep whichever covers more.
            if notification.version <= existing.version {
                return InsertOutcome::Duplicate;
            }
            self.buffer.insert(start, notification);
            return InsertOutcome::Duplicate;
        }

        // Coalesce with the range ending exactly where this one starts.
        let pred = self
            .buffer
            .range(..start)
            .next_back()
            .filter(|(_, p)| p.origin == notification.origin && p.end_version() == start)
            .map(|(&pred_start, p)| (pred_start, p.updates.len()));
        if let Some((pred_start, pred_len)) = pred {
            if pred_len + notification.updates.len() <= MERGE_CAP {
                let pred = self.buffer.get_mut(&pred_start).expect("just found");
                pred.updates.extend(notification.updates);
                pred.version = notification.version;
                pred.etag = notification.etag;
                self.merge_forward(pred_start);
                return InsertOutcome::Merged;
            }
            // Cap exceeded: keep only the later notification.
            self.buffer.remove(&pred_start);
            self.buffer.insert(start, notification);
            return InsertOutcome::ReplacedEarlier;
        }

        // Coalesce with the range starting exactly where this one ends.
        let end = notification.end_version();
        let succ = self
            .buffer
            .get(&end)
            .filter(|s| s.origin == notification.origin)
            .map(|s| s.updates.len());
        if let Some(succ_len) = succ {
            if succ_len + notification.updates.len() <= MERGE_CAP {
                let mut merged = notification;
                let succ = self.buffer.remove(&end).expect("just found");
                merged.updates.extend(succ.updates);
                merged.version = succ.version;
                merged.etag = succ.etag;
                self.buffer.insert(start, merged);
                return InsertOutcome::Merged;
            }
            // Cap exceeded: the buffered successor is the later one.
            return InsertOutcome::ReplacedEarlier;
        }

        self.buffer.insert(start, notification);
        match self.enforce_capacity() {
            Some(evicted) if evicted == start => InsertOutcome::DroppedOverflow,
            Some(_) => InsertOutcome::Buffered { evicted: true },
            None => InsertOutcome::Buffered { evicted: false },
        }
    }

    /// Re-checks whether the entry at `start` now abuts its successor.
    fn merge_forward(&mut self, start: Version) {
        let Some(entry) = self.buffer.get(&start) else {
            return;
        };
        let end = entry.end_version();
        let origin = entry.origin;
        let len = entry.updates.len();
        let mergeable = self
            .buffer
            .get(&end)
            .is_some_and(|succ| succ.origin == origin && len + succ.updates.len() <= MERGE_CAP);
        if mergeable {
            let succ = self.buffer.remove(&end).expect("checked above");
            let entry = self.buffer.get_mut(&start).expect("still buffered");
            entry.updates.extend(succ.updates);
            entry.version = succ.version;
            entry.etag = succ.etag;
        }
    }

    /// Drops the furthest-future notification when over capacity; that
    /// range is recoverable through the read protocol. Returns the
    /// evicted starting version.
    fn enforce_capacity(&mut self) -> Option<Version> {
        if self.buffer.len() <= self.max_buffered {
            return None;
        }
        let last = *self.buffer.last_key_value()?.0;
        self.buffer.remove(&last);
        tracing::debug!(start = %last, "notification buffer full, evicted furthest range");
        Some(last)
    }

    /// Drops stale notifications and pops the one starting exactly at
    /// `global`, if buffered. Returns the number discarded alongside it.
    pub fn pop_applicable(
        &mut self,
        global: Version,
    ) -> (usize, Option<UpdateNotification<E>>) {
        let mut discarded = 0;
        while let Some((&start, _)) = self.buffer.first_key_value() {
            if start < global {
                self.buffer.remove(&start);
                discarded += 1;
                tracing::debug!(%start, %global, "discarded stale notification");
            } else if start == global {
                let n = self.buffer.remove(&start);
                return (discarded, n);
            } else {
                break;
            }
        }
        (discarded, None)
    }
}

#[cfg(test)]
mod tests {
    use lodestone_types::{ETag, ReplicaIdx};

    use super::*;

    fn notification(
        origin: u8,
        version: u64,
        updates: Vec<u32>,
    ) -> UpdateNotification<u32> {
        UpdateNotification {
            origin: ReplicaIdx::new(origin),
            version: Version::new(version),
            updates,
            etag: Some(ETag::new(format!("e{version}"))),
        }
    }

    #[test]
    fn merge_law_adjacent_same_origin() {
        let mut queue = NotificationQueue::new(32);
        assert_eq!(
            queue.insert(notification(0, 7, vec![10, 11])),
            InsertOutcome::Buffered { evicted: false }
        );
        assert_eq!(queue.insert(notification(0, 8, vec![12])), InsertOutcome::Merged);
        assert_eq!(queue.len(), 1);

        let (discarded, merged) = queue.pop_applicable(Version::new(5));
        assert_eq!(discarded, 0);
        let merged = merged.expect("applicable at start 5");
        assert_eq!(merged.start_version(), Some(Version::new(5)));
        assert_eq!(merged.version, Version::new(8));
        assert_eq!(merged.updates, vec![10, 11, 12]);
        assert_eq!(merged.etag, Some(ETag::new("e8")));
    }

    #[test]
    fn merge_works_in_arrival_order_reversed() {
        let mut queue = NotificationQueue::new(32);
        queue.insert(notification(0, 8, vec![12]));
        assert_eq!(queue.insert(notification(0, 7, vec![10, 11])), InsertOutcome::Merged);
        assert_eq!(queue.len(), 1);
        let (_, merged) = queue.pop_applicable(Version::new(5));
        assert_eq!(merged.expect("merged").updates, vec![10, 11, 12]);
    }

    #[test]
    fn merge_rejected_across_origins() {
        let mut queue = NotificationQueue::new(32);
        queue.insert(notification(0, 7, vec![10, 11]));
        assert_eq!(
            queue.insert(notification(1, 8, vec![12])),
            InsertOutcome::Buffered { evicted: false }
        );
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn merge_over_cap_keeps_only_the_later() {
        let mut queue = NotificationQueue::new(32);
        queue.insert(notification(0, 150, (0..150).collect()));
        assert_eq!(
            queue.insert(notification(0, 250, (150..250).collect())),
            InsertOutcome::ReplacedEarlier
        );
        assert_eq!(queue.len(), 1);

        // Only the later half survived; version 0 is now a gap.
        let (discarded, n) = queue.pop_applicable(Version::new(0));
        assert_eq!((discarded, n.is_none()), (0, true));
        let (_, n) = queue.pop_applicable(Version::new(150));
        assert_eq!(n.expect("later kept").updates.len(), 100);
    }

    #[test]
    fn exactly_at_cap_still_merges() {
        let mut queue = NotificationQueue::new(32);
        queue.insert(notification(0, 150, (0..150).collect()));
        assert_eq!(
            queue.insert(notification(0, 200, (150..200).collect())),
            InsertOutcome::Merged
        );
        let (_, n) = queue.pop_applicable(Version::ZERO);
        assert_eq!(n.expect("merged").updates.len(), MERGE_CAP);
    }

    #[test]
    fn duplicate_start_keeps_wider_coverage() {
        let mut queue = NotificationQueue::new(32);
        queue.insert(notification(0, 7, vec![10, 11]));
        assert_eq!(
            queue.insert(notification(0, 6, vec![10])),
            InsertOutcome::Duplicate
        );
        assert_eq!(
            queue.insert(notification(0, 8, vec![10, 11, 12])),
            InsertOutcome::Duplicate
        );
        let (_, n) = queue.pop_applicable(Version::new(5));
        assert_eq!(n.expect("widest").version, Version::new(8));
    }

    #[test]
    fn pop_discards_stale_then_returns_applicable() {
        let mut queue = NotificationQueue::new(32);
        queue.insert(notification(0, 2, vec![1, 2])); // start 0, stale
        queue.insert(notification(1, 4, vec![3])); // start 3, applicable
        queue.insert(notification(0, 6, vec![4, 5])); // start 4, future

        let (discarded, n) = queue.pop_applicable(Version::new(3));
        assert_eq!(discarded, 1);
        assert_eq!(n.expect("applicable").updates, vec![3]);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn future_notifications_stay_buffered() {
        let mut queue = NotificationQueue::new(32);
        queue.insert(notification(0, 9, vec![7]));
        let (discarded, n) = queue.pop_applicable(Version::new(3));
        assert_eq!((discarded, n.is_none()), (0, true));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn capacity_evicts_furthest_future() {
        let mut queue = NotificationQueue::new(2);
        queue.insert(notification(0, 11, vec![1])); // start 10
        queue.insert(notification(1, 21, vec![2])); // start 20
        let outcome = queue.insert(notification(0, 16, vec![3])); // start 15
        assert_eq!(outcome, InsertOutcome::Buffered { evicted: true });
        assert_eq!(queue.len(), 2);

        // start 20 was evicted.
        let (_, n) = queue.pop_applicable(Version::new(20));
        assert!(n.is_none());
    }

    #[test]
    fn overflowing_with_the_furthest_drops_it() {
        let mut queue = NotificationQueue::new(2);
        queue.insert(notification(0, 11, vec![1]));
        queue.insert(notification(1, 21, vec![2]));
        assert_eq!(
            queue.insert(notification(0, 31, vec![3])),
            InsertOutcome::DroppedOverflow
        );
        assert_eq!(queue.len(), 2);
    }
}
