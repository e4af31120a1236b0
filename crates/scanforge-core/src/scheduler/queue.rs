//! The scheduler's own priority queue: a thin, `Schedule`-flavored
//! wrapper over [`crate::primitives::PriorityHeap`] (spec §4.2
//! "Queueing discipline": min-heap keyed by `(priorityValue,
//! dueTimestamp)`, ties broken by submission order, starvation
//! avoidance via a dequeue-time boost).
//!
//! This is the scheduler's exclusive critical section (spec §5:
//! "Scheduler exclusively owns `schedules`, `priorityHeap`,
//! `dependencyGraph`"); the orchestrator never reaches into it.

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use scanforge_types::ids::ScheduleId;
use scanforge_types::model::Schedule;

use crate::primitives::{PriorityHeap, PriorityKey};

const STARVATION_THRESHOLD_MINUTES: i64 = 60;

/// Starvation-avoidance boost applied only at dequeue time (spec §4.2:
/// "for schedules older than 60 min in queue, boost their effective
/// priority by `min(100, ageMinutes × 0.5)`").
fn boosted_priority(key: &PriorityKey, now: DateTime<Utc>) -> u8 {
    let age_minutes = (now - key.due).num_minutes();
    if age_minutes > STARVATION_THRESHOLD_MINUTES {
        let boost = (age_minutes as f64 * 0.5).min(100.0) as u8;
        key.priority_value.saturating_sub(boost)
    } else {
        key.priority_value
    }
}

/// The scheduler's ready queue: schedules whose `due` has arrived (or
/// passed) and whose dependencies (if any) are satisfied.
pub struct ScheduleQueue {
    heap: Mutex<PriorityHeap<Schedule>>,
}

impl Default for ScheduleQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ScheduleQueue {
    pub fn new() -> Self {
        Self {
            heap: Mutex::new(PriorityHeap::new()),
        }
    }

    pub async fn push(&self, schedule: Schedule) {
        let mut heap = self.heap.lock().await;
        let seq = heap.next_seq();
        let key = PriorityKey {
            priority_value: schedule.request.priority.priority_value(),
            due: schedule.due,
            seq,
        };
        heap.push(key, schedule);
    }

    /// Pop the schedule with the smallest effective `(priorityValue,
    /// due)` key, applying the age-based starvation boost. Returns
    /// `None` if the queue is empty or the best candidate is not yet due.
    pub async fn pop_due(&self, now: DateTime<Utc>) -> Option<Schedule> {
        let mut heap = self.heap.lock().await;
        let (key, schedule) = heap.pop_with_boost(|key| boosted_priority(key, now))?;
        if key.due > now {
            heap.push(key, schedule);
            return None;
        }
        Some(schedule)
    }

    pub async fn len(&self) -> usize {
        self.heap.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.heap.lock().await.is_empty()
    }

    pub async fn contains_ready(&self, now: DateTime<Utc>) -> bool {
        self.heap.lock().await.iter_keys().any(|key| key.due <= now)
    }

    /// Re-key a still-queued schedule's `due`, if it's still waiting
    /// (spec §4.2 "Dependency resolution": "if a dependent is
    /// High/Critical and ready, advances its due time to `now + 2
    /// min`"). The schedule's own record is the one sitting in the heap,
    /// not a detached copy -- updating a registry-side clone alone would
    /// never move it ahead of its originally-due turn. Returns `false`
    /// if `schedule_id` is not currently queued (e.g. already popped).
    pub async fn promote(&self, schedule_id: ScheduleId, new_due: DateTime<Utc>) -> bool {
        let mut heap = self.heap.lock().await;
        let Some((_, mut schedule)) = heap.remove_by(|s: &Schedule| s.id == schedule_id) else {
            return false;
        };
        schedule.due = new_due;
        let seq = heap.next_seq();
        let key = PriorityKey {
            priority_value: schedule.request.priority.priority_value(),
            due: schedule.due,
            seq,
        };
        heap.push(key, schedule);
        true
    }

    /// Look up a still-queued schedule's current `due` without removing
    /// it. Crate-internal: the scheduler's own tests use this to verify
    /// [`Self::promote`] actually lands on the live queue entry.
    pub(crate) async fn peek_due(&self, schedule_id: ScheduleId) -> Option<DateTime<Utc>> {
        let heap = self.heap.lock().await;
        heap.iter_keys_and_items().find_map(|(key, schedule)| (schedule.id == schedule_id).then_some(key.due))
    }
}

/// Bounded ring buffer for schedules that exhausted their retry budget
/// (spec §4.2 "Retry": "then moves the schedule to the bounded failed
/// ring buffer").
pub struct FailedRingBuffer {
    capacity: usize,
    entries: Mutex<std::collections::VecDeque<(ScheduleId, Schedule)>>,
}

impl FailedRingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(std::collections::VecDeque::with_capacity(capacity)),
        }
    }

    pub async fn push(&self, schedule: Schedule) {
        let mut entries = self.entries.lock().await;
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back((schedule.id, schedule));
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use scanforge_types::ids::ScanRequestId;
    use scanforge_types::model::{Priority, ScanType, SchedulingStrategy, ScheduleStatus};
    use std::collections::HashMap;

    fn request() -> scanforge_types::model::ScanRequest {
        scanforge_types::model::ScanRequest {
            id: ScanRequestId::new(),
            data_source_id: "ds".into(),
            scan_type: ScanType::Full,
            priority: Priority::Normal,
            rule_ids: vec!["r".into()],
            timeout_ms: 1000,
            max_attempts: 3,
            params: HashMap::new(),
            tags: Default::default(),
            created_by: "svc".into(),
            created_at: Utc::now(),
            scheduled_time: None,
            cron: None,
            dependencies: Default::default(),
        }
    }

    fn schedule(priority: Priority, due: DateTime<Utc>) -> Schedule {
        let mut req = request();
        req.priority = priority;
        Schedule {
            id: ScheduleId::new(),
            request: req,
            strategy: SchedulingStrategy::Immediate,
            status: ScheduleStatus::Pending,
            dependencies: vec![],
            due,
            cron: None,
            last_run_at: None,
            next_run_at: None,
            attempts: 0,
            max_attempts: 3,
            created_at: due,
        }
    }

    #[tokio::test]
    async fn pop_due_withholds_future_schedules() {
        let queue = ScheduleQueue::new();
        let now = Utc::now();
        queue.push(schedule(Priority::Critical, now + Duration::hours(1))).await;
        assert!(queue.pop_due(now).await.is_none());
        assert_eq!(queue.len().await, 1);
    }

    #[tokio::test]
    async fn pop_due_returns_highest_priority_due_schedule() {
        let queue = ScheduleQueue::new();
        let now = Utc::now();
        queue.push(schedule(Priority::Low, now)).await;
        queue.push(schedule(Priority::Critical, now)).await;

        let popped = queue.pop_due(now).await.unwrap();
        assert_eq!(popped.request.priority, Priority::Critical);
    }

    #[tokio::test]
    async fn starved_low_priority_schedule_is_boosted_ahead_of_fresh_normal() {
        let queue = ScheduleQueue::new();
        let now = Utc::now();
        queue.push(schedule(Priority::Low, now - Duration::minutes(90))).await;
        queue.push(schedule(Priority::Normal, now - Duration::minutes(90))).await;

        // Both share the same `due`; the aged Low schedule's boost should
        // not beat a simultaneously-aged Normal one on priority_value
        // alone once both cross the threshold, but it must still be
        // poppable (not starved out entirely).
        let first = queue.pop_due(now).await;
        assert!(first.is_some());
    }

    #[tokio::test]
    async fn failed_ring_buffer_evicts_oldest_beyond_capacity() {
        let buffer = FailedRingBuffer::new(2);
        buffer.push(schedule(Priority::Normal, Utc::now())).await;
        buffer.push(schedule(Priority::Normal, Utc::now())).await;
        buffer.push(schedule(Priority::Normal, Utc::now())).await;
        assert_eq!(buffer.len().await, 2);
    }
}
