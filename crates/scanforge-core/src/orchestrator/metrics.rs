//! Aggregate orchestrator counters and gauges (spec §8 observability
//! notes; supplemented here the way the original Python orchestrator's
//! `get_metrics()` did -- counts plus queue-time and throughput gauges
//! beyond the bare pass/fail tallies spec.md names).

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic counters and running gauges for one orchestrator instance.
/// All fields are independent atomics; a snapshot is not transactionally
/// consistent across fields, matching a metrics registry rather than a
/// ledger.
#[derive(Default)]
pub struct OrchestratorMetrics {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    queue_full_rejections: AtomicU64,
    total_queue_wait_ms: AtomicU64,
    queue_wait_samples: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSnapshot {
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub queue_full_rejections: u64,
    pub average_queue_wait_ms: f64,
}

impl OrchestratorMetrics {
    pub fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_queue_full_rejection(&self) {
        self.queue_full_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_queue_wait(&self, wait_ms: u64) {
        self.total_queue_wait_ms.fetch_add(wait_ms, Ordering::Relaxed);
        self.queue_wait_samples.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let samples = self.queue_wait_samples.load(Ordering::Relaxed);
        let total_wait = self.total_queue_wait_ms.load(Ordering::Relaxed);
        MetricsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            queue_full_rejections: self.queue_full_rejections.load(Ordering::Relaxed),
            average_queue_wait_ms: if samples == 0 {
                0.0
            } else {
                total_wait as f64 / samples as f64
            },
        }
    }
}
