//! Run statistics with atomic counters.
//!
//! This module provides [`RewriteStats`] for tracking progress across rayon
//! workers and [`StatsSnapshot`] for point-in-time statistics views.
//!
//! # Thread Safety
//!
//! All counters use [`AtomicU64`] with [`Relaxed`](std::sync::atomic::Ordering::Relaxed)
//! ordering. Statistics are for reporting only and don't require strict
//! ordering guarantees.
//!
//! # Examples
//!
//! ```
//! use refix_engine::RewriteStats;
//!
//! let stats = RewriteStats::new();
//! stats.record_rewritten(3);
//! stats.record_unchanged();
//!
//! let snapshot = stats.snapshot();
//! assert_eq!(snapshot.total, 2);
//! assert_eq!(snapshot.lines_changed, 3);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Atomic counters for a run.
///
/// Every document is recorded exactly once, through one of the `record_*`
/// methods, so `total` is always the sum of the three outcome counters.
#[derive(Debug, Default)]
pub struct RewriteStats {
    /// Documents processed, whatever the outcome.
    total: AtomicU64,
    /// Documents with at least one changed line.
    rewritten: AtomicU64,
    /// Documents left byte-for-byte as they were.
    unchanged: AtomicU64,
    /// Documents that failed (read, resolution, or swap errors).
    failed: AtomicU64,
    /// Changed lines across all rewritten documents.
    lines_changed: AtomicU64,
}

impl RewriteStats {
    /// Creates a new [`RewriteStats`] with all counters at zero.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a document in which `lines` lines changed.
    #[inline]
    pub fn record_rewritten(&self, lines: u64) {
        self.total.fetch_add(1, Ordering::Relaxed);
        self.rewritten.fetch_add(1, Ordering::Relaxed);
        self.lines_changed.fetch_add(lines, Ordering::Relaxed);
    }

    /// Records a document that needed no change.
    #[inline]
    pub fn record_unchanged(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
        self.unchanged.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a document that failed.
    #[inline]
    pub fn record_failed(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a point-in-time snapshot of all statistics.
    ///
    /// Values are read one at a time with relaxed ordering; a snapshot taken
    /// while workers are running may be slightly inconsistent.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total: self.total.load(Ordering::Relaxed),
            rewritten: self.rewritten.load(Ordering::Relaxed),
            unchanged: self.unchanged.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            lines_changed: self.lines_changed.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of run statistics.
///
/// This struct contains copied values from [`RewriteStats`] and is safe to
/// store, serialize, and send between threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Documents processed.
    pub total: u64,
    /// Documents with at least one changed line.
    pub rewritten: u64,
    /// Documents that needed no change.
    pub unchanged: u64,
    /// Documents that failed.
    pub failed: u64,
    /// Changed lines across all rewritten documents.
    pub lines_changed: u64,
}

impl StatsSnapshot {
    /// Returns the number of documents that completed without error.
    ///
    /// # Examples
    ///
    /// ```
    /// use refix_engine::StatsSnapshot;
    ///
    /// let snap = StatsSnapshot {
    ///     total: 10,
    ///     rewritten: 6,
    ///     unchanged: 3,
    ///     failed: 1,
    ///     lines_changed: 14,
    /// };
    ///
    /// assert_eq!(snap.succeeded(), 9);
    /// ```
    #[inline]
    #[must_use]
    pub const fn succeeded(&self) -> u64 {
        self.rewritten + self.unchanged
    }

    /// Returns the success rate as a percentage.
    ///
    /// Calculated as: `(total - failed) / total * 100`
    /// Returns 100.0 if total is 0.
    #[must_use]
    #[allow(clippy::cast_precision_loss)] // Acceptable for statistics display
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }

        ((self.total - self.failed) as f64 / self.total as f64) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_rewrite_stats_new() {
        let snap = RewriteStats::new().snapshot();
        assert_eq!(snap, StatsSnapshot::default());
    }

    #[test]
    fn test_rewrite_stats_record() {
        let stats = RewriteStats::new();
        stats.record_rewritten(2);
        stats.record_rewritten(5);
        stats.record_unchanged();
        stats.record_failed();

        let snap = stats.snapshot();
        assert_eq!(snap.total, 4);
        assert_eq!(snap.rewritten, 2);
        assert_eq!(snap.unchanged, 1);
        assert_eq!(snap.failed, 1);
        assert_eq!(snap.lines_changed, 7);
        assert_eq!(snap.succeeded(), 3);
    }

    #[test]
    fn test_rewrite_stats_concurrent() {
        let stats = Arc::new(RewriteStats::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let stats = Arc::clone(&stats);
                thread::spawn(move || {
                    for _ in 0..100 {
                        stats.record_rewritten(1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("worker panicked");
        }

        let snap = stats.snapshot();
        assert_eq!(snap.total, 800);
        assert_eq!(snap.lines_changed, 800);
    }

    #[test]
    fn test_stats_snapshot_success_rate() {
        let snap = StatsSnapshot::default();
        assert!((snap.success_rate() - 100.0).abs() < f64::EPSILON);

        let snap = StatsSnapshot {
            total: 20,
            unchanged: 19,
            failed: 1,
            ..Default::default()
        };
        assert!((snap.success_rate() - 95.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_stats_snapshot_serialization() {
        let snap = StatsSnapshot {
            total: 3,
            rewritten: 2,
            unchanged: 1,
            failed: 0,
            lines_changed: 4,
        };

        insta::assert_snapshot!(
            serde_json::to_string(&snap).expect("Serialization failed"),
            @r#"{"total":3,"rewritten":2,"unchanged":1,"failed":0,"lines_changed":4}"#
        );
    }
}
