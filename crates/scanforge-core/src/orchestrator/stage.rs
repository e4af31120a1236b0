//! Stage execution: running one `Stage`'s rules to a `StageResult`, with
//! the orchestrator's one-shot sequential recovery path (spec §4.1
//! "failure semantics": "a failed stage may be retried once, forced into
//! Sequential mode, after a fixed delay; a second failure fails the
//! execution").
//!
//! Grounded on the teacher's per-task lifecycle runner (`lifecycle.rs`):
//! a stage here plays the role a single task played there, fanned out
//! over its `rule_ids` instead of over attempts.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};

use scanforge_types::model::{Stage, StageMode};

use crate::capability::RuleSvc;

const RECOVERY_DELAY: Duration = Duration::from_secs(5);

/// Per-rule execution outcome within a stage, used to build the
/// `StageResult` the caller persists onto `Execution`.
pub struct StageRun {
    pub rule_errors: Vec<String>,
    pub succeeded: bool,
}

async fn run_sequential(stage: &Stage, request: &scanforge_types::model::ScanRequest, rules: &dyn RuleSvc) -> StageRun {
    let mut rule_errors = Vec::new();
    for rule_id in &stage.rule_ids {
        match rules.execute_rule(rule_id, request).await {
            Ok(outcome) if outcome.succeeded => {}
            Ok(outcome) => rule_errors.push(
                outcome
                    .error
                    .unwrap_or_else(|| format!("rule {rule_id} reported failure with no message")),
            ),
            Err(err) => rule_errors.push(format!("rule {rule_id} errored: {err}")),
        }
        if !rule_errors.is_empty() && stage.critical {
            break;
        }
    }
    StageRun {
        succeeded: rule_errors.is_empty(),
        rule_errors,
    }
}

async fn run_parallel(stage: &Stage, request: &scanforge_types::model::ScanRequest, rules: &(dyn RuleSvc)) -> StageRun {
    let limit = stage
        .max_concurrency
        .map(|n| n as usize)
        .unwrap_or(stage.rule_ids.len())
        .max(1);

    let mut rule_errors = Vec::new();
    let mut in_flight = FuturesUnordered::new();
    let mut remaining = stage.rule_ids.iter();

    for rule_id in remaining.by_ref().take(limit) {
        in_flight.push(execute_one(rules, rule_id.clone(), request));
    }

    while let Some(outcome) = in_flight.next().await {
        if let Some(err) = outcome {
            rule_errors.push(err);
        }
        if let Some(rule_id) = remaining.next() {
            in_flight.push(execute_one(rules, rule_id.clone(), request));
        }
    }

    StageRun {
        succeeded: rule_errors.is_empty(),
        rule_errors,
    }
}

async fn execute_one(
    rules: &(dyn RuleSvc),
    rule_id: String,
    request: &scanforge_types::model::ScanRequest,
) -> Option<String> {
    match rules.execute_rule(&rule_id, request).await {
        Ok(outcome) if outcome.succeeded => None,
        Ok(outcome) => Some(
            outcome
                .error
                .unwrap_or_else(|| format!("rule {rule_id} reported failure with no message")),
        ),
        Err(err) => Some(format!("rule {rule_id} errored: {err}")),
    }
}

/// Run `stage` to completion, then -- if it failed -- wait
/// [`RECOVERY_DELAY`] and retry it once forced into `Sequential` mode
/// (spec §4.1 step 3: "After a stage failure, attempt recovery once:
/// re-run the failed stage in Sequential mode... "). This applies to any
/// stage failure, not only ones that originally ran `Parallel` -- a
/// stage that was already `Sequential` still gets its one recovery pass
/// (spec.md states the rule unconditionally on "a stage failure", not on
/// the stage's original mode). Returns the final `StageRun`, which is
/// the recovery attempt's outcome when recovery was attempted.
pub async fn run_stage_with_recovery(
    stage: &Stage,
    request: &scanforge_types::model::ScanRequest,
    rules: Arc<dyn RuleSvc>,
    clock: Arc<dyn crate::capability::ClockSvc>,
) -> StageRun {
    let first = match stage.mode {
        StageMode::Sequential => run_sequential(stage, request, rules.as_ref()).await,
        StageMode::Parallel => run_parallel(stage, request, rules.as_ref()).await,
    };

    if first.succeeded {
        return first;
    }

    clock.sleep(RECOVERY_DELAY).await;
    let forced = Stage {
        mode: StageMode::Sequential,
        max_concurrency: None,
        ..stage.clone()
    };
    run_sequential(&forced, request, rules.as_ref()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use scanforge_types::ids::{ScanRequestId, StageId};
    use scanforge_types::model::{Priority, ResourceRequirement, ScanType};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration as StdDuration;

    use crate::capability::{ClockSvc, RuleOutcome};

    struct FlakyOnce {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RuleSvc for FlakyOnce {
        async fn validate(&self, rule_ids: &[String]) -> anyhow::Result<Vec<String>> {
            Ok(rule_ids.to_vec())
        }

        async fn execute_rule(
            &self,
            rule_id: &str,
            _request: &scanforge_types::model::ScanRequest,
        ) -> anyhow::Result<RuleOutcome> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            // Fails every rule on the very first pass only.
            let succeeded = call >= 3;
            Ok(RuleOutcome {
                rule_id: rule_id.to_string(),
                succeeded,
                error: (!succeeded).then(|| "boom".to_string()),
                output: serde_json::Value::Null,
            })
        }
    }

    struct InstantClock;

    #[async_trait]
    impl ClockSvc for InstantClock {
        fn now(&self) -> chrono::DateTime<chrono::Utc> {
            chrono::Utc::now()
        }

        async fn sleep(&self, _duration: StdDuration) {}
    }

    fn request() -> scanforge_types::model::ScanRequest {
        scanforge_types::model::ScanRequest {
            id: ScanRequestId::new(),
            data_source_id: "ds".into(),
            scan_type: ScanType::Full,
            priority: Priority::Normal,
            rule_ids: vec!["a".into(), "b".into(), "c".into()],
            timeout_ms: 1000,
            max_attempts: 1,
            params: HashMap::new(),
            tags: Default::default(),
            created_by: "svc".into(),
            created_at: chrono::Utc::now(),
            scheduled_time: None,
            cron: None,
            dependencies: Default::default(),
        }
    }

    #[tokio::test]
    async fn failed_parallel_stage_recovers_sequentially_and_succeeds() {
        let stage = Stage {
            id: StageId::new(),
            name: "batch".into(),
            mode: StageMode::Parallel,
            rule_ids: vec!["a".into(), "b".into(), "c".into()],
            depends_on: vec![],
            max_concurrency: Some(3),
            requirement: ResourceRequirement::ZERO,
            critical: true,
        };
        let rules: Arc<dyn RuleSvc> = Arc::new(FlakyOnce {
            calls: AtomicUsize::new(0),
        });
        let clock: Arc<dyn ClockSvc> = Arc::new(InstantClock);

        let result = run_stage_with_recovery(&stage, &request(), rules, clock).await;
        assert!(result.succeeded);
    }

    #[tokio::test]
    async fn sequential_stage_retries_once_and_still_fails_if_deterministic() {
        struct AlwaysFails;
        #[async_trait]
        impl RuleSvc for AlwaysFails {
            async fn validate(&self, rule_ids: &[String]) -> anyhow::Result<Vec<String>> {
                Ok(rule_ids.to_vec())
            }
            async fn execute_rule(
                &self,
                rule_id: &str,
                _request: &scanforge_types::model::ScanRequest,
            ) -> anyhow::Result<RuleOutcome> {
                Ok(RuleOutcome {
                    rule_id: rule_id.to_string(),
                    succeeded: false,
                    error: Some("nope".into()),
                    output: serde_json::Value::Null,
                })
            }
        }

        let stage = Stage {
            id: StageId::new(),
            name: "seq".into(),
            mode: StageMode::Sequential,
            rule_ids: vec!["a".into()],
            depends_on: vec![],
            max_concurrency: None,
            requirement: ResourceRequirement::ZERO,
            critical: true,
        };
        let rules: Arc<dyn RuleSvc> = Arc::new(AlwaysFails);
        let clock: Arc<dyn ClockSvc> = Arc::new(InstantClock);

        let result = run_stage_with_recovery(&stage, &request(), rules, clock).await;
        assert!(!result.succeeded);
    }

    #[tokio::test]
    async fn sequential_stage_recovers_from_a_transient_failure() {
        // `critical: false` so a failing rule doesn't short-circuit the
        // rest of the stage's rules -- all three rules run on each pass,
        // matching `FlakyOnce`'s "fails everything on the first three
        // calls, succeeds after" shape.
        let stage = Stage {
            id: StageId::new(),
            name: "seq".into(),
            mode: StageMode::Sequential,
            rule_ids: vec!["a".into(), "b".into(), "c".into()],
            depends_on: vec![],
            max_concurrency: None,
            requirement: ResourceRequirement::ZERO,
            critical: false,
        };
        let rules: Arc<dyn RuleSvc> = Arc::new(FlakyOnce {
            calls: AtomicUsize::new(0),
        });
        let clock: Arc<dyn ClockSvc> = Arc::new(InstantClock);

        let result = run_stage_with_recovery(&stage, &request(), rules, clock).await;
        assert!(result.succeeded);
    }
}
