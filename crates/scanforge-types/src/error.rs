//! The error taxonomy every component boundary translates internal
//! conditions into (spec §7).
//!
//! Loops (scheduler tick, workflow executor, resource sweeper) catch these
//! and continue, emitting metrics and logs; none of them exit the process
//! on a single failure. `InternalError` is the explicit catch-all for that
//! last case -- callers should never see a bare panic or an unmodeled error
//! type cross a component boundary.

use crate::ids::{ExecutionId, ScheduleId};

/// The taxonomy of errors the orchestrator, scheduler, and workflow engine
/// can report to callers or to each other.
#[derive(Debug, thiserror::Error)]
pub enum ErrorKind {
    /// Validation failed (missing fields, unknown data source, unknown
    /// rules). Not retried; reported directly to the caller.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Admission back-pressure: the queue is at `maxQueueSize`. Callers
    /// should retry with jitter.
    #[error("queue is full (max {max_queue_size} entries)")]
    QueueFull { max_queue_size: usize },

    /// Per-rule failure recorded in a stage result. Does not fail the
    /// stage unless the rule is marked critical.
    #[error("rule {rule_id} failed during execution {execution_id}: {message}")]
    RuleExecutionError {
        execution_id: ExecutionId,
        rule_id: String,
        message: String,
    },

    /// A stage failed and the one-shot sequential recovery also failed.
    #[error("execution {0} failed after stage recovery was exhausted")]
    ExecutionFailure(ExecutionId),

    /// Cooperative cancellation observed at a suspension point. Terminal
    /// and non-retryable by the orchestrator; the scheduler may re-enqueue
    /// if a retry budget remains.
    #[error("execution {0} was cancelled")]
    Cancelled(ExecutionId),

    /// `timeoutMs` elapsed before the execution reached a terminal state.
    #[error("execution {0} timed out")]
    Timeout(ExecutionId),

    /// The resource sweeper reclaimed an allocation whose `expiresAt` had
    /// passed. Terminal.
    #[error("allocation for execution {0} expired before completion")]
    AllocationExpired(ExecutionId),

    /// A schedule is waiting on dependencies that have not all completed.
    /// Not surfaced as an error unless the caller explicitly asks for
    /// status; the schedule simply remains `Pending`.
    #[error("schedule {schedule_id} is waiting on dependency {dependency_id}")]
    DependencyUnsatisfied {
        schedule_id: ScheduleId,
        dependency_id: ScheduleId,
    },

    /// An approval request in a workflow exceeded its timeout and no
    /// escalation target could be found.
    #[error("approval {0} timed out with no escalation target")]
    ApprovalTimeout(crate::ids::ApprovalId),

    /// Catch-all for conditions that do not fit the taxonomy above. Always
    /// logged with context; never crashes the orchestration loop.
    #[error("internal error: {0}")]
    InternalError(String),
}

impl ErrorKind {
    /// Whether this error represents transient back-pressure rather than a
    /// terminal failure (spec §7: `ResourceShortage` is internal and not
    /// surfaced as an error -- a request that hits it is queued, not
    /// failed, so it never becomes an `ErrorKind` at all).
    pub fn is_retryable_by_scheduler(&self) -> bool {
        matches!(
            self,
            ErrorKind::Cancelled(_) | ErrorKind::Timeout(_) | ErrorKind::AllocationExpired(_)
        )
    }
}
