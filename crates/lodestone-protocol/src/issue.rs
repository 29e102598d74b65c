//! Failure memory and retry pacing.
//!
//! The tracker remembers the most recent storage failure and how many
//! have occurred consecutively; every retry loop in the adaptor asks it
//! how long to wait before the next attempt. A resolved tracker imposes
//! no delay.

use std::fmt::{self, Display};
use std::time::Duration;

use crate::config::BackoffPolicy;

/// Exponent cap; beyond this the delay has long since hit any sane ceiling.
const MAX_EXPONENT: u32 = 16;

/// Classification of the last storage failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueKind {
    SnapshotReadFailed,
    LogReadFailed,
    LogAppendFailed,
    SnapshotWriteFailed,
}

impl Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SnapshotReadFailed => "snapshot-read-failed",
            Self::LogReadFailed => "log-read-failed",
            Self::LogAppendFailed => "log-append-failed",
            Self::SnapshotWriteFailed => "snapshot-write-failed",
        };
        f.write_str(name)
    }
}

/// The most recent recorded failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Issue {
    pub kind: IssueKind,
    /// Clock reading (epoch milliseconds) when the failure was recorded.
    pub recorded_at_ms: u64,
}

/// Tracks the last failure and computes retry delays.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssueTracker {
    last: Option<Issue>,
    consecutive: u32,
}

impl IssueTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a failure at the given clock reading.
    pub fn record(&mut self, kind: IssueKind, now_ms: u64) {
        self.last = Some(Issue {
            kind,
            recorded_at_ms: now_ms,
        });
        self.consecutive = self.consecutive.saturating_add(1);
    }

    /// Clears the tracker after an unconditional success.
    pub fn resolve(&mut self) {
        self.last = None;
        self.consecutive = 0;
    }

    /// The most recent failure, if unresolved.
    pub fn last(&self) -> Option<&Issue> {
        self.last.as_ref()
    }

    /// Number of failures since the last resolution.
    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    /// Delay to wait before the next attempt: `initial * 2^(n-1)` for the
    /// n-th consecutive failure, clamped to the policy ceiling. Zero when
    /// resolved.
    pub fn delay_before_retry(&self, policy: &BackoffPolicy) -> Duration {
        if self.consecutive == 0 {
            return Duration::ZERO;
        }
        let exponent = (self.consecutive - 1).min(MAX_EXPONENT);
        let delay = policy.initial.saturating_mul(1 << exponent);
        delay.min(policy.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> BackoffPolicy {
        BackoffPolicy {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(2),
        }
    }

    #[test]
    fn resolved_tracker_imposes_no_delay() {
        let tracker = IssueTracker::new();
        assert_eq!(tracker.delay_before_retry(&policy()), Duration::ZERO);
        assert_eq!(tracker.last(), None);
    }

    #[test]
    fn delay_doubles_until_ceiling() {
        let mut tracker = IssueTracker::new();
        let expected = [100u64, 200, 400, 800, 1600, 2000, 2000];
        for (i, ms) in expected.into_iter().enumerate() {
            tracker.record(IssueKind::LogReadFailed, i as u64);
            assert_eq!(
                tracker.delay_before_retry(&policy()),
                Duration::from_millis(ms),
                "after {} failures",
                i + 1
            );
        }
    }

    #[test]
    fn resolve_resets_delay_growth() {
        let mut tracker = IssueTracker::new();
        tracker.record(IssueKind::SnapshotWriteFailed, 1);
        tracker.record(IssueKind::SnapshotWriteFailed, 2);
        assert_eq!(
            tracker.delay_before_retry(&policy()),
            Duration::from_millis(200)
        );

        tracker.resolve();
        assert_eq!(tracker.delay_before_retry(&policy()), Duration::ZERO);

        tracker.record(IssueKind::SnapshotReadFailed, 3);
        assert_eq!(
            tracker.delay_before_retry(&policy()),
            Duration::from_millis(100)
        );
        assert_eq!(
            tracker.last().map(|i| i.kind),
            Some(IssueKind::SnapshotReadFailed)
        );
    }

    #[test]
    fn record_keeps_latest_kind_and_time() {
        let mut tracker = IssueTracker::new();
        tracker.record(IssueKind::LogAppendFailed, 10);
        tracker.record(IssueKind::SnapshotWriteFailed, 20);
        let issue = tracker.last().expect("recorded");
        assert_eq!(issue.kind, IssueKind::SnapshotWriteFailed);
        assert_eq!(issue.recorded_at_ms, 20);
        assert_eq!(tracker.consecutive(), 2);
    }

    #[test]
    fn huge_failure_counts_do_not_overflow() {
        let mut tracker = IssueTracker::new();
        for i in 0..10_000 {
            tracker.record(IssueKind::LogReadFailed, i);
        }
        assert_eq!(tracker.delay_before_retry(&policy()), Duration::from_secs(2));
    }
}
