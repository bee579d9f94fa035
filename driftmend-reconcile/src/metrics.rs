//! Reconciler metrics.
//!
//! Counters track healing activity across the orchestrator's lifetime and
//! can be scraped or logged by the embedding process.

use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics for reconciliation operations.
#[derive(Debug, Default)]
pub struct ReconcilerMetrics {
    /// Detection cycles started (timer ticks plus explicit triggers)
    pub cycles: AtomicU64,

    /// Capture attempts that exhausted their retries
    pub captures_failed: AtomicU64,

    /// Drifts confirmed by hash mismatch
    pub drifts_detected: AtomicU64,

    /// Mapping updates applied successfully
    pub healings_applied: AtomicU64,

    /// Attempts that ended in a terminal failure or rejection
    pub attempts_failed: AtomicU64,

    /// Proposals discarded because a newer drift superseded them
    pub stale_discards: AtomicU64,

    /// Reload signals that failed after a successful apply
    pub reload_failures: AtomicU64,
}

impl ReconcilerMetrics {
    /// Create a new metrics instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment a counter by one.
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a current snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            captures_failed: self.captures_failed.load(Ordering::Relaxed),
            drifts_detected: self.drifts_detected.load(Ordering::Relaxed),
            healings_applied: self.healings_applied.load(Ordering::Relaxed),
            attempts_failed: self.attempts_failed.load(Ordering::Relaxed),
            stale_discards: self.stale_discards.load(Ordering::Relaxed),
            reload_failures: self.reload_failures.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of reconciler metrics at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub cycles: u64,
    pub captures_failed: u64,
    pub drifts_detected: u64,
    pub healings_applied: u64,
    pub attempts_failed: u64,
    pub stale_discards: u64,
    pub reload_failures: u64,
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_bumps() {
        let metrics = ReconcilerMetrics::new();
        ReconcilerMetrics::bump(&metrics.drifts_detected);
        ReconcilerMetrics::bump(&metrics.drifts_detected);
        ReconcilerMetrics::bump(&metrics.healings_applied);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.drifts_detected, 2);
        assert_eq!(snapshot.healings_applied, 1);
        assert_eq!(snapshot.attempts_failed, 0);
    }
}
