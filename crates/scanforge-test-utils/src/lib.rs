//! Test doubles shared across the workspace: a manually-advanceable
//! clock and in-memory capability stubs, so unit and integration tests
//! can drive the orchestrator, scheduler, and workflow engine
//! deterministically instead of sleeping for real or standing up a
//! database (spec §6's collaborators are all dependency-injected for
//! exactly this reason).

use std::collections::HashMap;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use scanforge_core::capability::{
    ClockSvc, DataSourceMetadata, DataSourceSvc, EstimateHint, EstimatorSvc, LogLevel, LogSink,
    MetricsSink, Rbac, RuleOutcome, RuleSvc,
};
use scanforge_types::ids::ScanRequestId;
use scanforge_types::model::{Priority, ScanRequest, ScanType};

/// A clock that only moves when told to, so tests can fast-forward
/// through back-off windows, approval timeouts, and cron recurrence
/// without real wall-clock delay.
pub struct ManualClock {
    now: StdMutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { now: StdMutex::new(start) }
    }

    pub fn starting_now() -> Self {
        Self::new(Utc::now())
    }

    /// Move the clock forward without waiting (distinct from `sleep`,
    /// which also advances -- this lets a test jump the clock from
    /// outside an `await` point, e.g. before polling a status).
    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += chrono::Duration::from_std(duration).unwrap_or_default();
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock().unwrap() = at;
    }
}

#[async_trait]
impl ClockSvc for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }

    /// Advances the clock by `duration` immediately rather than
    /// suspending the task -- a sleeping test driver would otherwise
    /// never observe its own fast-forward.
    async fn sleep(&self, duration: Duration) {
        self.advance(duration);
        tokio::task::yield_now().await;
    }
}

/// A `DataSourceSvc` backed by an in-memory catalog; unknown ids fail
/// validation the same way a real catalog would reject them.
#[derive(Default)]
pub struct StubDataSourceSvc {
    catalog: HashMap<String, DataSourceMetadata>,
}

impl StubDataSourceSvc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, id: impl Into<String>, metadata: DataSourceMetadata) -> Self {
        self.catalog.insert(id.into(), metadata);
        self
    }
}

#[async_trait]
impl DataSourceSvc for StubDataSourceSvc {
    async fn validate(&self, data_source_id: &str) -> anyhow::Result<bool> {
        Ok(self.catalog.contains_key(data_source_id) || self.catalog.is_empty())
    }

    async fn metadata(&self, data_source_id: &str) -> anyhow::Result<DataSourceMetadata> {
        self.catalog.get(data_source_id).cloned().map(Ok).unwrap_or_else(|| {
            Ok(DataSourceMetadata { estimated_rows: 10_000, tables: vec![], columns: vec![] })
        })
    }
}

/// A `RuleSvc` that validates any rule id and succeeds every execution,
/// unless the id has been marked to always fail via `failing`.
#[derive(Default)]
pub struct StubRuleSvc {
    failing: std::collections::HashSet<String>,
}

impl StubRuleSvc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn always_fail(mut self, rule_id: impl Into<String>) -> Self {
        self.failing.insert(rule_id.into());
        self
    }
}

#[async_trait]
impl RuleSvc for StubRuleSvc {
    async fn validate(&self, rule_ids: &[String]) -> anyhow::Result<Vec<String>> {
        Ok(rule_ids.to_vec())
    }

    async fn execute_rule(&self, rule_id: &str, _request: &ScanRequest) -> anyhow::Result<RuleOutcome> {
        if self.failing.contains(rule_id) {
            return Ok(RuleOutcome {
                rule_id: rule_id.to_string(),
                succeeded: false,
                error: Some("stubbed failure".into()),
                output: serde_json::Value::Null,
            });
        }
        Ok(RuleOutcome {
            rule_id: rule_id.to_string(),
            succeeded: true,
            error: None,
            output: serde_json::json!({ "rows_scanned": 100 }),
        })
    }
}

/// An `EstimatorSvc` that always defers to the orchestrator's own
/// heuristic (spec §4.1: "returning `None` is not an error").
#[derive(Default)]
pub struct NoHintEstimatorSvc;

#[async_trait]
impl EstimatorSvc for NoHintEstimatorSvc {
    async fn estimate_resources(&self, _request: &ScanRequest) -> anyhow::Result<Option<EstimateHint>> {
        Ok(None)
    }

    async fn estimate_duration(&self, _request: &ScanRequest) -> anyhow::Result<Option<u32>> {
        Ok(None)
    }
}

/// An `Rbac` that resolves a fixed approver chain regardless of input,
/// or falls through to the engine's own default when empty.
#[derive(Default)]
pub struct StubRbac {
    pub approvers: Vec<String>,
}

impl StubRbac {
    pub fn new(approvers: Vec<String>) -> Self {
        Self { approvers }
    }
}

#[async_trait]
impl Rbac for StubRbac {
    async fn resolve_approvers(
        &self,
        _workflow_type: &str,
        _organization_id: &str,
        _current_approver_id: Option<&str>,
    ) -> anyhow::Result<Vec<String>> {
        Ok(self.approvers.clone())
    }
}

/// A `MetricsSink`/`LogSink` pair that records everything it receives,
/// so a test can assert on what was emitted instead of just that
/// nothing panicked.
#[derive(Default)]
pub struct RecordingSink {
    pub metrics: StdMutex<Vec<(String, f64)>>,
    pub logs: StdMutex<Vec<String>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetricsSink for RecordingSink {
    fn emit(&self, name: &str, _labels: &HashMap<String, String>, value: f64) {
        self.metrics.lock().unwrap().push((name.to_string(), value));
    }
}

impl LogSink for RecordingSink {
    fn log(&self, _level: LogLevel, message: &str, _fields: &HashMap<String, String>) {
        self.logs.lock().unwrap().push(message.to_string());
    }
}

/// A minimal, well-formed `ScanRequest`, overridable by the caller for
/// the field(s) a given test cares about.
pub fn sample_scan_request() -> ScanRequest {
    ScanRequest {
        id: ScanRequestId::new(),
        data_source_id: "warehouse-primary".into(),
        scan_type: ScanType::Full,
        priority: Priority::Normal,
        rule_ids: vec!["pii-detection".into()],
        timeout_ms: 60_000,
        max_attempts: 3,
        params: HashMap::new(),
        tags: Default::default(),
        created_by: "test-harness".into(),
        created_at: Utc::now(),
        scheduled_time: None,
        cron: None,
        dependencies: Default::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    #[tokio::test]
    async fn manual_clock_only_moves_on_advance_or_sleep() {
        let start = Utc::now();
        let clock = ManualClock::new(start);
        assert_eq!(clock.now(), start);
        clock.sleep(StdDuration::from_secs(5)).await;
        assert_eq!(clock.now(), start + chrono::Duration::seconds(5));
    }

    #[tokio::test]
    async fn stub_rule_svc_honors_always_fail_list() {
        let svc = StubRuleSvc::new().always_fail("bad-rule");
        let request = sample_scan_request();
        let outcome = svc.execute_rule("bad-rule", &request).await.unwrap();
        assert!(!outcome.succeeded);
        let ok = svc.execute_rule("good-rule", &request).await.unwrap();
        assert!(ok.succeeded);
    }

    #[tokio::test]
    async fn stub_data_source_rejects_unknown_id_once_catalog_is_populated() {
        let svc = StubDataSourceSvc::new().with_source(
            "known",
            DataSourceMetadata { estimated_rows: 1, tables: vec![], columns: vec![] },
        );
        assert!(svc.validate("known").await.unwrap());
        assert!(!svc.validate("unknown").await.unwrap());
    }
}
