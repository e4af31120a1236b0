//! Retry back-off policy for orchestrator-reported execution failures
//! (spec §4.2 "Retry": "re-enqueues with `due = now + 15 min` until
//! `attempts == maxAttempts`, then moves the schedule to the bounded
//! failed ring buffer").

use chrono::{DateTime, Duration, Utc};

use scanforge_types::model::Schedule;

const RETRY_BACKOFF: Duration = Duration::minutes(15);

/// What the scheduler should do with a `Schedule` after the orchestrator
/// reports its execution failed.
pub enum RetryDecision {
    /// Re-enqueue with `due` pushed out by the fixed back-off.
    Reenqueue(DateTime<Utc>),
    /// Retry budget exhausted; move to the failed ring buffer.
    Exhausted,
}

/// Decide the retry outcome for `schedule`, bumping its `attempts`
/// counter as a side effect of the decision (the caller owns persisting
/// the mutated schedule either back onto the queue or into the ring
/// buffer).
pub fn decide(schedule: &mut Schedule, now: DateTime<Utc>) -> RetryDecision {
    schedule.attempts += 1;
    if schedule.attempts >= schedule.max_attempts {
        return RetryDecision::Exhausted;
    }
    let due = now + RETRY_BACKOFF;
    schedule.due = due;
    schedule.status = scanforge_types::model::ScheduleStatus::Pending;
    RetryDecision::Reenqueue(due)
}
