//! The resource pool: a set of numeric counters (CPU%, memory MB,
//! storage MB, network Mbps, dbConnections, apiRate) protected by a
//! single critical section, with a companion min-heap on `expires_at`
//! for the periodic sweeper (spec §5 "Shared-resource policy"; Design
//! Notes: "Allocation with expiry: model as a map from executionId to
//! allocation record with a companion min-heap on `expiresAt` for
//! O(log n) sweeps").
//!
//! This is deliberately its own critical section, separate from the
//! execution table and the priority queue -- the three are never held
//! together, to avoid deadlock (spec §5).

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use scanforge_types::ids::ExecutionId;
use scanforge_types::model::{ResourceAllocation, ResourceRequirement};

struct Inner {
    capacity: ResourceRequirement,
    safety_margin: f64,
    allocated_total: ResourceRequirement,
    allocations: HashMap<ExecutionId, ResourceAllocation>,
    expiry_heap: BinaryHeap<Reverse<(DateTime<Utc>, ExecutionId)>>,
}

impl Inner {
    /// Capacity available for allocation: `pool * (1 - safetyMargin)`
    /// (spec §5 "Safety margin").
    fn effective_capacity(&self) -> ResourceRequirement {
        self.capacity.scaled(1.0 - self.safety_margin)
    }
}

/// The orchestrator's sole resource pool.
pub struct ResourcePool {
    inner: Mutex<Inner>,
}

impl ResourcePool {
    pub fn new(capacity: ResourceRequirement, safety_margin: f64) -> Self {
        Self {
            inner: Mutex::new(Inner {
                capacity,
                safety_margin,
                allocated_total: ResourceRequirement::ZERO,
                allocations: HashMap::new(),
                expiry_heap: BinaryHeap::new(),
            }),
        }
    }

    /// Attempt to reserve `requirement` for `execution_id`. Succeeds
    /// (atomically recording the allocation and bumping gauges) only if
    /// `requirement + current allocated <= capacity * (1 - safetyMargin)`
    /// on every resource dimension (spec §4.1 step 3, invariant 1 in
    /// §8). Returns `false` without side effects otherwise.
    pub async fn try_allocate(
        &self,
        execution_id: ExecutionId,
        requirement: ResourceRequirement,
        priority_value: u8,
        now: DateTime<Utc>,
        grace: chrono::Duration,
    ) -> bool {
        let mut inner = self.inner.lock().await;
        let projected = inner.allocated_total.saturating_add(requirement);
        if !projected.fits_within(inner.effective_capacity()) {
            return false;
        }

        let expires_at =
            now + chrono::Duration::minutes(requirement.estimated_duration_minutes as i64) + grace;
        inner.allocated_total = projected;
        inner.allocations.insert(
            execution_id,
            ResourceAllocation {
                execution_id,
                requirement,
                priority_value,
                allocated_at: now,
                expires_at,
            },
        );
        inner.expiry_heap.push(Reverse((expires_at, execution_id)));
        true
    }

    /// Release the allocation held for `execution_id`, if any. Idempotent:
    /// releasing an execution with no allocation is a no-op, matching the
    /// orchestrator calling this unconditionally on every terminal
    /// transition.
    pub async fn release(&self, execution_id: ExecutionId) {
        let mut inner = self.inner.lock().await;
        if let Some(allocation) = inner.allocations.remove(&execution_id) {
            inner.allocated_total = inner.allocated_total.saturating_sub(allocation.requirement);
        }
    }

    /// Pop every allocation whose `expires_at < now`, releasing each one.
    /// Called by the periodic sweeper (spec §5, default interval 30 s).
    /// Stale heap entries (for allocations already released through the
    /// normal completion path) are discarded without effect.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Vec<ExecutionId> {
        let mut inner = self.inner.lock().await;
        let mut expired = Vec::new();

        while let Some(Reverse((expires_at, execution_id))) = inner.expiry_heap.peek().copied() {
            if expires_at >= now {
                break;
            }
            inner.expiry_heap.pop();
            if let Some(allocation) = inner.allocations.remove(&execution_id) {
                inner.allocated_total =
                    inner.allocated_total.saturating_sub(allocation.requirement);
                expired.push(execution_id);
            }
        }

        expired
    }

    /// A consistent snapshot of current allocation for decision-making
    /// (spec §4.1 step 3: "compute current allocation sum").
    pub async fn snapshot(&self) -> ResourceRequirement {
        self.inner.lock().await.allocated_total
    }

    /// Per-resource-type utilization ratio (`allocated / capacity`),
    /// keyed by resource name. Supplements the raw counters in §8 with
    /// the gauges the original Python orchestrator exposed
    /// (`resource_utilization`).
    pub async fn utilization(&self) -> HashMap<&'static str, f64> {
        let inner = self.inner.lock().await;
        let cap = inner.capacity;
        let used = inner.allocated_total;
        let ratio = |num: f64, den: f64| if den > 0.0 { num / den } else { 0.0 };

        HashMap::from([
            ("cpu_pct", ratio(used.cpu_pct, cap.cpu_pct)),
            (
                "memory_mb",
                ratio(used.memory_mb as f64, cap.memory_mb as f64),
            ),
            (
                "storage_mb",
                ratio(used.storage_mb as f64, cap.storage_mb as f64),
            ),
            (
                "network_mbps",
                ratio(used.network_mbps as f64, cap.network_mbps as f64),
            ),
            (
                "db_connections",
                ratio(used.db_connections as f64, cap.db_connections as f64),
            ),
            ("api_rate", ratio(used.api_rate as f64, cap.api_rate as f64)),
        ])
    }

    pub async fn active_count(&self) -> usize {
        self.inner.lock().await.allocations.len()
    }
}
