//! Adaptor configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Retry pacing for storage failures.
///
/// Delays grow exponentially with consecutive failures and are clamped to
/// `max`. Deterministic (no jitter) so simulated runs are reproducible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    /// Delay after the first failure.
    pub initial: Duration,
    /// Ceiling for the computed delay.
    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(30),
        }
    }
}

/// Tunables for one adaptor instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptorConfig {
    /// Retry pacing for all storage retry loops.
    pub backoff: BackoffPolicy,
    /// Upper bound on buffered out-of-order notifications. Overflow
    /// evicts the furthest-future notification; its range is recovered
    /// through the read protocol.
    pub max_buffered_notifications: usize,
    /// Page size for log catch-up reads.
    pub max_read_batch: usize,
}

impl Default for AdaptorConfig {
    fn default() -> Self {
        Self {
            backoff: BackoffPolicy::default(),
            max_buffered_notifications: 32,
            max_read_batch: 512,
        }
    }
}
