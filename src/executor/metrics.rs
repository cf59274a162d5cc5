//! Execution metrics for the external scanner engine.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use serde::Serialize;

/// Point-in-time snapshot of engine execution counters.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MetricsSnapshot {
    pub running: usize,
    pub queued: usize,
    pub max_concurrent: usize,
    pub total_executions: u64,
    pub failed_executions: u64,
    pub avg_duration_ms: u64,
    pub failure_rate: f64,
    pub last_rss_kb: u64,
    pub peak_rss_kb: u64,
}

/// Lock-free counters updated by every engine run.
#[derive(Debug, Default)]
pub struct ExecutionMetrics {
    total: AtomicU64,
    failed: AtomicU64,
    total_duration_ms: AtomicU64,
    last_rss_kb: AtomicU64,
    peak_rss_kb: AtomicU64,
    running: AtomicUsize,
}

impl ExecutionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run_started(&self) {
        self.running.fetch_add(1, Ordering::Relaxed);
    }

    pub fn run_finished(&self, duration: Duration, failed: bool) {
        self.running.fetch_sub(1, Ordering::Relaxed);
        self.total.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        self.total_duration_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_rss(&self, rss_kb: u64) {
        self.last_rss_kb.store(rss_kb, Ordering::Relaxed);
        self.peak_rss_kb.fetch_max(rss_kb, Ordering::Relaxed);
    }

    pub fn snapshot(&self, queued: usize, max_concurrent: usize) -> MetricsSnapshot {
        let total = self.total.load(Ordering::Relaxed);
        let failed = self.failed.load(Ordering::Relaxed);
        let total_duration = self.total_duration_ms.load(Ordering::Relaxed);
        MetricsSnapshot {
            running: self.running.load(Ordering::Relaxed),
            queued,
            max_concurrent,
            total_executions: total,
            failed_executions: failed,
            avg_duration_ms: if total == 0 { 0 } else { total_duration / total },
            failure_rate: if total == 0 {
                0.0
            } else {
                failed as f64 / total as f64
            },
            last_rss_kb: self.last_rss_kb.load(Ordering::Relaxed),
            peak_rss_kb: self.peak_rss_kb.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn averages_and_failure_rate() {
        let metrics = ExecutionMetrics::new();
        metrics.run_started();
        metrics.run_finished(Duration::from_millis(100), false);
        metrics.run_started();
        metrics.run_finished(Duration::from_millis(300), true);

        let snap = metrics.snapshot(0, 2);
        assert_eq!(snap.total_executions, 2);
        assert_eq!(snap.failed_executions, 1);
        assert_eq!(snap.avg_duration_ms, 200);
        assert!((snap.failure_rate - 0.5).abs() < f64::EPSILON);
        assert_eq!(snap.running, 0);
    }

    #[test]
    fn empty_metrics_avoid_division_by_zero() {
        let snap = ExecutionMetrics::new().snapshot(3, 2);
        assert_eq!(snap.avg_duration_ms, 0);
        assert_eq!(snap.failure_rate, 0.0);
        assert_eq!(snap.queued, 3);
    }

    #[test]
    fn peak_rss_is_monotonic() {
        let metrics = ExecutionMetrics::new();
        metrics.record_rss(500);
        metrics.record_rss(1200);
        metrics.record_rss(800);

        let snap = metrics.snapshot(0, 2);
        assert_eq!(snap.last_rss_kb, 800);
        assert_eq!(snap.peak_rss_kb, 1200);
    }
}
