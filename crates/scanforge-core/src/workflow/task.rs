//! Per-task execution: retry back-off policy and the pluggable handler
//! registry a `Custom`/`Processing` stage dispatches into (spec §4.3
//! "Retry strategy per task").

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use rand::Rng;
use serde_json::Value;

use scanforge_types::model::RetryStrategy;

const FIXED_DELAY: Duration = Duration::from_secs(5);
const EXPONENTIAL_BASE: Duration = Duration::from_secs(2);
const EXPONENTIAL_CAP: Duration = Duration::from_secs(60);
const JITTER_BASE: Duration = Duration::from_secs(2);

/// Delay before the `attempt`-th retry (0-indexed: the first retry is
/// `attempt == 0`) under `strategy`.
pub fn retry_delay(strategy: RetryStrategy, attempt: u32) -> Duration {
    match strategy {
        RetryStrategy::Immediate => Duration::ZERO,
        RetryStrategy::Fixed => FIXED_DELAY,
        RetryStrategy::ExponentialBackoff => {
            let factor = 2u32.saturating_pow(attempt.min(16));
            (EXPONENTIAL_BASE * factor).min(EXPONENTIAL_CAP)
        }
        RetryStrategy::Jittered => {
            let jitter_ms = rand::rng().random_range(0..1000);
            JITTER_BASE + Duration::from_millis(jitter_ms)
        }
    }
}

/// A pluggable unit of work a workflow task name resolves to. Registered
/// handlers let a `Custom`/`Processing`/`Notification` stage run
/// caller-supplied logic without the engine knowing its shape (Design
/// Notes: "pluggable advisors behind optional-hint interfaces"); a task
/// name with no registered handler falls through to the engine's own
/// built-in handling (e.g. `"submit_scan"`) or fails if neither applies.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn run(&self, ctx: &Value) -> Result<Value>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn immediate_has_no_delay() {
        assert_eq!(retry_delay(RetryStrategy::Immediate, 0), Duration::ZERO);
    }

    #[test]
    fn exponential_backoff_doubles_and_caps() {
        assert_eq!(retry_delay(RetryStrategy::ExponentialBackoff, 0), Duration::from_secs(2));
        assert_eq!(retry_delay(RetryStrategy::ExponentialBackoff, 1), Duration::from_secs(4));
        assert_eq!(retry_delay(RetryStrategy::ExponentialBackoff, 10), EXPONENTIAL_CAP);
    }

    #[test]
    fn jittered_delay_stays_within_expected_window() {
        for attempt in 0..5 {
            let delay = retry_delay(RetryStrategy::Jittered, attempt);
            assert!(delay >= JITTER_BASE);
            assert!(delay < JITTER_BASE + Duration::from_secs(1));
        }
    }
}
