//! Append-only ring buffers for terminal executions (spec §6 "Persisted
//! state layout": "two append-only ring buffers (`completed`, `failed`)
//! sized 1000/500 respectively"). Oldest entries fall off once a buffer
//! is full; this is the orchestrator's sole in-memory history, not a
//! durability mechanism (spec §6: "The core does not mandate an on-disk
//! format").

use tokio::sync::Mutex;

use scanforge_types::model::{Execution, ExecutionStatus};

pub const COMPLETED_CAPACITY: usize = 1000;
pub const FAILED_CAPACITY: usize = 500;

/// A bounded FIFO of terminal `Execution` snapshots.
pub struct RingBuffer {
    capacity: usize,
    entries: Mutex<std::collections::VecDeque<Execution>>,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(std::collections::VecDeque::with_capacity(capacity)),
        }
    }

    pub async fn push(&self, execution: Execution) {
        let mut entries = self.entries.lock().await;
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(execution);
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Most recent entries first, in arrival order reversed.
    pub async fn recent(&self, limit: usize) -> Vec<Execution> {
        self.entries.lock().await.iter().rev().take(limit).cloned().collect()
    }
}

/// The orchestrator's `completed`/`failed` history (spec §6). `Cancelled`
/// executions land in `failed` alongside genuine `Failed` ones -- both are
/// non-success terminal outcomes the caller may want to inspect via
/// `ListHistory`.
pub struct History {
    pub completed: RingBuffer,
    pub failed: RingBuffer,
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}

impl History {
    pub fn new() -> Self {
        Self {
            completed: RingBuffer::new(COMPLETED_CAPACITY),
            failed: RingBuffer::new(FAILED_CAPACITY),
        }
    }

    /// Record a just-terminated execution in the appropriate ring buffer.
    /// No-op for non-terminal status (a caller bug, not a recoverable
    /// condition worth surfacing as an error).
    pub async fn record(&self, execution: Execution) {
        match execution.status {
            ExecutionStatus::Completed => self.completed.push(execution).await,
            ExecutionStatus::Failed | ExecutionStatus::Cancelled => self.failed.push(execution).await,
            _ => {}
        }
    }
}

/// Filters accepted by `ListHistory` (spec §6 `ListHistory(filters)`).
/// Every field is optional; an empty `HistoryFilters` returns everything
/// up to `limit`.
#[derive(Debug, Clone, Default)]
pub struct HistoryFilters {
    pub status: Option<ExecutionStatus>,
    pub since: Option<chrono::DateTime<chrono::Utc>>,
    pub limit: usize,
}

impl History {
    pub async fn query(&self, filters: &HistoryFilters) -> Vec<Execution> {
        let limit = if filters.limit == 0 { usize::MAX } else { filters.limit };
        let mut merged: Vec<Execution> = self
            .completed
            .recent(limit)
            .await
            .into_iter()
            .chain(self.failed.recent(limit).await)
            .filter(|e| filters.status.is_none_or(|s| e.status == s))
            .filter(|e| filters.since.is_none_or(|since| e.completed_at.is_some_and(|c| c >= since)))
            .collect();
        merged.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
        merged.truncate(limit);
        merged
    }
}
