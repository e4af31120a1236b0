//! The orchestrator: admits `ScanRequest`s, allocates resources, builds
//! an `ExecutionPlan`, and runs it to completion (spec §4.1).
//!
//! Grounded on the teacher's DAG runner (`run_orchestrator` in the
//! original `orchestrator/mod.rs`): a semaphore bounds concurrent
//! executions, an `mpsc` channel carries completion notices back to a
//! single coordinating loop, and `tokio_util::sync::CancellationToken`
//! drives cooperative shutdown with a bounded drain. Where the teacher
//! polled a Postgres-backed task table, this orchestrator polls its own
//! in-memory execution table and priority queue -- the same
//! admit-drain-retry shape, a different backing store (spec §5: no
//! persistence layer; the whole core is a single-process, in-memory
//! system).

pub mod estimate;
pub mod history;
pub mod metrics;
pub mod plan;
pub mod stage;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use scanforge_types::ids::ExecutionId;
use scanforge_types::model::{
    Execution, ExecutionPlan, ExecutionStatus, ExecutionStrategy, ProgressStep, ScanRequest,
};
use scanforge_types::ErrorKind;

use crate::capability::{ClockSvc, DataSourceSvc, EstimatorSvc, LogLevel, LogSink, MetricsSink, RuleSvc};
use crate::primitives::priority_heap::{PriorityHeap, PriorityKey};
use crate::primitives::resource_pool::ResourcePool;

pub use history::{History, HistoryFilters};
pub use metrics::{MetricsSnapshot, OrchestratorMetrics};

/// Outcome of one request within a `bulk_execute` call (spec §6
/// `BulkExecute`: "returns a bulk id and per-request outcomes").
#[derive(Debug, Clone)]
pub enum BulkOutcome {
    Submitted(ExecutionId),
    Rejected(ErrorKind),
}

/// Fan-out mode for `bulk_execute` (spec §6: `mode ∈ {Parallel≤N,
/// Sequential}`).
#[derive(Debug, Clone, Copy)]
pub enum BulkMode {
    Sequential,
    Parallel(usize),
}

/// Hard ceilings on one `bulk_execute` call (spec §6: "`N ≤ 20`, list
/// size ≤ 50").
pub const BULK_MAX_CONCURRENCY: usize = 20;
pub const BULK_MAX_REQUESTS: usize = 50;

/// Tunables for one orchestrator instance (spec §4.1, §5 "Defaults").
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub max_concurrent_executions: usize,
    pub max_queue_size: usize,
    pub safety_margin: f64,
    pub allocation_grace: chrono::Duration,
    pub resource_sweep_interval: Duration,
    pub admission_poll_interval: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_executions: 20,
            max_queue_size: 1000,
            safety_margin: 0.2,
            allocation_grace: chrono::Duration::minutes(5),
            resource_sweep_interval: Duration::from_secs(30),
            admission_poll_interval: Duration::from_millis(200),
        }
    }
}

struct QueuedRequest {
    request: ScanRequest,
    strategy: ExecutionStrategy,
    execution_id: ExecutionId,
    queued_at: chrono::DateTime<Utc>,
}

/// The orchestrator's three independent critical sections (spec §5:
/// never hold more than one of the execution table, the priority queue,
/// or the resource pool locks at the same time): `executions`, `queue`,
/// and `pool` (inside `ResourcePool`) are always locked one at a time.
pub struct Orchestrator {
    config: OrchestratorConfig,
    pool: ResourcePool,
    executions: Mutex<HashMap<ExecutionId, Execution>>,
    queue: Mutex<PriorityHeap<QueuedRequest>>,
    metrics: OrchestratorMetrics,
    history: History,

    data_source: Arc<dyn DataSourceSvc>,
    rules: Arc<dyn RuleSvc>,
    estimator: Option<Arc<dyn EstimatorSvc>>,
    clock: Arc<dyn ClockSvc>,
    metrics_sink: Arc<dyn MetricsSink>,
    log_sink: Arc<dyn LogSink>,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: OrchestratorConfig,
        capacity: scanforge_types::model::ResourceRequirement,
        data_source: Arc<dyn DataSourceSvc>,
        rules: Arc<dyn RuleSvc>,
        estimator: Option<Arc<dyn EstimatorSvc>>,
        clock: Arc<dyn ClockSvc>,
        metrics_sink: Arc<dyn MetricsSink>,
        log_sink: Arc<dyn LogSink>,
    ) -> Arc<Self> {
        let pool = ResourcePool::new(capacity, config.safety_margin);
        Arc::new(Self {
            pool,
            executions: Mutex::new(HashMap::new()),
            queue: Mutex::new(PriorityHeap::new()),
            metrics: OrchestratorMetrics::default(),
            history: History::new(),
            config,
            data_source,
            rules,
            estimator,
            clock,
            metrics_sink,
            log_sink,
        })
    }

    fn log(&self, level: LogLevel, message: &str, fields: HashMap<String, String>) {
        self.log_sink.log(level, message, &fields);
    }

    fn emit(&self, name: &str, labels: HashMap<String, String>, value: f64) {
        self.metrics_sink.emit(name, &labels, value);
    }

    /// Validate, estimate, and either admit `request` directly (resources
    /// available now) or place it on the priority queue for the
    /// background loop to pick up once capacity frees (spec §4.1 steps
    /// 1-3; `ResourceShortage` is not an error -- it queues).
    pub async fn submit(
        self: &Arc<Self>,
        request: ScanRequest,
        strategy: ExecutionStrategy,
    ) -> Result<ExecutionId, ErrorKind> {
        if !request.is_well_formed() {
            return Err(ErrorKind::InvalidRequest(
                "rule_ids must be non-empty, scheduled_time and cron are mutually exclusive, \
                 created_at must not be after scheduled_time"
                    .into(),
            ));
        }
        if !self.data_source.validate(&request.data_source_id).await.unwrap_or(false) {
            return Err(ErrorKind::InvalidRequest(format!(
                "unknown data source {}",
                request.data_source_id
            )));
        }
        let known_rules = self
            .rules
            .validate(&request.rule_ids)
            .await
            .map_err(|e| ErrorKind::InvalidRequest(e.to_string()))?;
        if known_rules.len() != request.rule_ids.len() {
            return Err(ErrorKind::InvalidRequest("one or more rule_ids are unknown".into()));
        }

        let metadata = self
            .data_source
            .metadata(&request.data_source_id)
            .await
            .map_err(|e| ErrorKind::InvalidRequest(e.to_string()))?;

        let hint = match &self.estimator {
            Some(estimator) => estimator.estimate_resources(&request).await.ok().flatten(),
            None => None,
        };
        let estimated = estimate::estimate_resources(&request, &metadata, hint);

        let execution_id = ExecutionId::new();
        let now = self.clock.now();

        // spec §8 invariant 2: `len(activeExecutions) <= maxConcurrentScans`.
        // Gating on the resource pool alone isn't enough -- a large pool
        // with many small requests would blow past the ceiling, so a full
        // slate of non-terminal executions queues the request same as a
        // resource shortage would.
        let at_concurrency_ceiling =
            self.admitted_non_terminal_count().await >= self.config.max_concurrent_executions;
        let allocated = !at_concurrency_ceiling
            && self
                .pool
                .try_allocate(
                    execution_id,
                    estimated,
                    request.priority.priority_value(),
                    now,
                    self.config.allocation_grace,
                )
                .await;

        self.metrics.record_submitted();

        if allocated {
            let built_plan = plan::build_plan(&request, strategy, estimated, hint);
            self.admit(execution_id, request, built_plan, now).await;
            return Ok(execution_id);
        }

        let mut queue = self.queue.lock().await;
        if queue.len() >= self.config.max_queue_size {
            drop(queue);
            self.pool.release(execution_id).await;
            self.metrics.record_queue_full_rejection();
            return Err(ErrorKind::QueueFull {
                max_queue_size: self.config.max_queue_size,
            });
        }
        let seq = queue.next_seq();
        queue.push(
            PriorityKey {
                priority_value: request.priority.priority_value(),
                due: request.scheduled_time.unwrap_or(now),
                seq,
            },
            QueuedRequest {
                request: request.clone(),
                strategy,
                execution_id,
                queued_at: now,
            },
        );
        drop(queue);

        // A still-queued request gets a `Pending` placeholder record so
        // `status`/`cancel` can observe and remove it before a worker ever
        // picks it up (spec §4.1 `Cancel`: "If the execution is still in
        // queue, it is removed"; §8 round-trip law: "no allocation ever
        // recorded").
        let placeholder = Execution {
            id: execution_id,
            request_id: request.id,
            status: ExecutionStatus::Pending,
            worker_id: None,
            allocated: scanforge_types::model::ResourceRequirement::ZERO,
            plan: ExecutionPlan {
                strategy,
                stages: vec![],
                total_requirement: scanforge_types::model::ResourceRequirement::ZERO,
            },
            progress: 0.0,
            current_step: "queued".into(),
            stage_results: vec![],
            attempts: 0,
            version: 0,
            created_at: now,
            started_at: None,
            completed_at: None,
            failure_reason: None,
            metrics: HashMap::new(),
            tags: HashMap::new(),
        };
        self.executions.lock().await.insert(execution_id, placeholder);
        Ok(execution_id)
    }

    async fn admit(
        self: &Arc<Self>,
        execution_id: ExecutionId,
        request: ScanRequest,
        built_plan: ExecutionPlan,
        now: chrono::DateTime<Utc>,
    ) {
        let execution = Execution {
            id: execution_id,
            request_id: request.id,
            status: ExecutionStatus::Pending,
            worker_id: None,
            allocated: built_plan.total_requirement,
            plan: built_plan,
            progress: 0.0,
            current_step: "admitted".into(),
            stage_results: vec![],
            attempts: 0,
            version: 0,
            created_at: now,
            started_at: None,
            completed_at: None,
            failure_reason: None,
            metrics: HashMap::new(),
            tags: HashMap::new(),
        };
        self.executions.lock().await.insert(execution_id, execution);

        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.run_execution(execution_id, request).await;
        });
    }

    /// Run one admitted execution's plan to completion, advancing
    /// progress checkpoints as stages clear and releasing its resource
    /// allocation on any terminal outcome (spec §4.1 "execution
    /// lifecycle").
    async fn run_execution(self: Arc<Self>, execution_id: ExecutionId, request: ScanRequest) {
        {
            let mut executions = self.executions.lock().await;
            if let Some(exec) = executions.get_mut(&execution_id) {
                exec.transition(ExecutionStatus::Initializing, self.clock.now());
                exec.advance_progress(ProgressStep::ConnectionValidated);
                exec.transition(ExecutionStatus::Running, self.clock.now());
                exec.advance_progress(ProgressStep::RulesPrepared);
            }
        }

        let plan = {
            let executions = self.executions.lock().await;
            executions.get(&execution_id).map(|e| e.plan.clone())
        };
        let Some(plan) = plan else { return };

        let mut completed_stages = Vec::new();
        let mut overall_ok = true;
        let mut failure_reason = None;
        let checkpoints = [
            ProgressStep::DiscoveryComplete,
            ProgressStep::AnalysisComplete,
            ProgressStep::RulesApplied,
        ];
        let mut checkpoint_idx = 0usize;

        loop {
            let ready: Vec<_> = plan.ready_stages(&completed_stages).into_iter().cloned().collect();
            if ready.is_empty() {
                break;
            }

            let mut handles = Vec::with_capacity(ready.len());
            for stage in ready {
                let rules = Arc::clone(&self.rules);
                let clock = Arc::clone(&self.clock);
                let request = request.clone();
                handles.push(tokio::spawn(async move {
                    let run = stage::run_stage_with_recovery(&stage, &request, rules, clock).await;
                    (stage, run)
                }));
            }

            for handle in handles {
                let Ok((stage, run)) = handle.await else {
                    overall_ok = false;
                    continue;
                };
                completed_stages.push(stage.id);
                if !run.succeeded {
                    overall_ok = false;
                    failure_reason = Some(format!(
                        "stage {} failed: {}",
                        stage.name,
                        run.rule_errors.join("; ")
                    ));
                }

                let mut executions = self.executions.lock().await;
                if let Some(exec) = executions.get_mut(&execution_id) {
                    exec.stage_results.push(scanforge_types::model::StageResult {
                        stage_id: stage.id,
                        succeeded: run.succeeded,
                        rule_errors: run.rule_errors,
                        started_at: self.clock.now(),
                        completed_at: self.clock.now(),
                    });
                    if checkpoint_idx < checkpoints.len() {
                        exec.advance_progress(checkpoints[checkpoint_idx]);
                        checkpoint_idx += 1;
                    }
                }
            }

            if !overall_ok {
                break;
            }
        }

        let now = self.clock.now();
        let mut executions = self.executions.lock().await;
        let terminal_snapshot = if let Some(exec) = executions.get_mut(&execution_id) {
            exec.advance_progress(ProgressStep::ResultsProcessed);
            if overall_ok {
                exec.transition(ExecutionStatus::Completed, now);
                exec.advance_progress(ProgressStep::Completed);
                self.metrics.record_completed();
            } else {
                exec.failure_reason = failure_reason;
                exec.transition(ExecutionStatus::Failed, now);
                self.metrics.record_failed();
            }
            Some(exec.clone())
        } else {
            None
        };
        drop(executions);
        if let Some(snapshot) = terminal_snapshot {
            self.history.record(snapshot).await;
        }
        self.pool.release(execution_id).await;
        self.emit(
            "scanforge.execution.terminal",
            HashMap::from([(
                "status".to_string(),
                if overall_ok { "completed" } else { "failed" }.to_string(),
            )]),
            1.0,
        );
    }

    /// Cancel a non-terminal execution (spec §4.1: cancellation observed
    /// at the next suspension point; here, before/after each stage
    /// batch). Releases the resource allocation immediately regardless
    /// of whether the running task has noticed yet.
    pub async fn cancel(&self, execution_id: ExecutionId) -> Result<(), ErrorKind> {
        let now = self.clock.now();
        let mut executions = self.executions.lock().await;
        let exec = executions
            .get_mut(&execution_id)
            .ok_or_else(|| ErrorKind::InternalError(format!("unknown execution {execution_id}")))?;
        if !exec.transition(ExecutionStatus::Cancelled, now) {
            return Err(ErrorKind::InternalError(format!(
                "execution {execution_id} is already terminal"
            )));
        }
        let snapshot = exec.clone();
        drop(executions);

        // Still sitting in the priority queue (never allocated) -- pull it
        // out so the background loop never admits it.
        let mut queue = self.queue.lock().await;
        queue.remove_by(|queued: &QueuedRequest| queued.execution_id == execution_id);
        drop(queue);

        self.pool.release(execution_id).await;
        self.history.record(snapshot).await;
        self.metrics.record_cancelled();
        self.log(
            LogLevel::Info,
            "execution cancelled",
            HashMap::from([("execution_id".to_string(), execution_id.to_string())]),
        );
        Ok(())
    }

    pub async fn status(&self, execution_id: ExecutionId) -> Option<Execution> {
        self.executions.lock().await.get(&execution_id).cloned()
    }

    pub async fn active_executions(&self, limit: usize) -> Vec<Execution> {
        self.executions
            .lock()
            .await
            .values()
            .filter(|e| !e.status.is_terminal())
            .take(limit)
            .cloned()
            .collect()
    }

    /// Count of non-terminal, *admitted* executions (spec §8 invariant
    /// 2's `activeExecutions`) -- i.e. excluding placeholders still
    /// sitting in the priority queue, which carry `current_step ==
    /// "queued"` until `admit` replaces them. Gates admission alongside
    /// the resource pool in `submit`/`try_admit_from_queue`.
    async fn admitted_non_terminal_count(&self) -> usize {
        self.executions
            .lock()
            .await
            .values()
            .filter(|e| !e.status.is_terminal() && e.current_step != "queued")
            .count()
    }

    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub async fn resource_utilization(&self) -> HashMap<&'static str, f64> {
        self.pool.utilization().await
    }

    /// Query the bounded completed/failed history (spec §6
    /// `ListHistory(filters)`).
    pub async fn list_history(&self, filters: &HistoryFilters) -> Vec<Execution> {
        self.history.query(filters).await
    }

    /// Lazily stream progress snapshots for `execution_id` until it
    /// reaches a terminal state (spec §4.1 `Stream`: "lazy sequence of
    /// progress events... until a terminal state is observed; infinite-
    /// by-time but terminates on completion; not restartable from
    /// history"). Polls `status` on `poll_interval` through the injected
    /// clock, so tests can drive it deterministically.
    pub fn stream(
        self: &Arc<Self>,
        execution_id: ExecutionId,
        poll_interval: Duration,
    ) -> impl futures::Stream<Item = Execution> + Send + 'static {
        let this = Arc::clone(self);
        async_stream::stream! {
            let mut last_version = None;
            loop {
                let Some(snapshot) = this.status(execution_id).await else {
                    return;
                };
                if last_version != Some(snapshot.version) {
                    last_version = Some(snapshot.version);
                    let terminal = snapshot.status.is_terminal();
                    yield snapshot;
                    if terminal {
                        return;
                    }
                } else if snapshot.status.is_terminal() {
                    return;
                }
                this.clock.sleep(poll_interval).await;
            }
        }
    }

    /// Submit a batch of requests under one strategy (spec §6
    /// `BulkExecute(requests[], mode)`). Caps at [`BULK_MAX_REQUESTS`]
    /// requests and, for `Parallel`, at [`BULK_MAX_CONCURRENCY`]
    /// concurrent submissions; a caller exceeding either is a validation
    /// error, not silent truncation.
    pub async fn bulk_execute(
        self: &Arc<Self>,
        requests: Vec<ScanRequest>,
        strategy: ExecutionStrategy,
        mode: BulkMode,
    ) -> Result<(scanforge_types::ids::BulkId, Vec<BulkOutcome>), ErrorKind> {
        if requests.len() > BULK_MAX_REQUESTS {
            return Err(ErrorKind::InvalidRequest(format!(
                "bulk_execute accepts at most {BULK_MAX_REQUESTS} requests, got {}",
                requests.len()
            )));
        }
        let bulk_id = scanforge_types::ids::BulkId::new();

        let outcomes = match mode {
            BulkMode::Sequential => {
                let mut outcomes = Vec::with_capacity(requests.len());
                for request in requests {
                    outcomes.push(match self.submit(request, strategy).await {
                        Ok(id) => BulkOutcome::Submitted(id),
                        Err(err) => BulkOutcome::Rejected(err),
                    });
                }
                outcomes
            }
            BulkMode::Parallel(n) => {
                let n = n.min(BULK_MAX_CONCURRENCY).max(1);
                let mut outcomes = vec![None; requests.len()];
                let mut in_flight = futures::stream::FuturesUnordered::new();
                let mut remaining = requests.into_iter().enumerate();

                for (index, request) in remaining.by_ref().take(n) {
                    let this = Arc::clone(self);
                    in_flight.push(async move { (index, this.submit(request, strategy).await) });
                }
                use futures::StreamExt;
                while let Some((index, result)) = in_flight.next().await {
                    outcomes[index] = Some(match result {
                        Ok(id) => BulkOutcome::Submitted(id),
                        Err(err) => BulkOutcome::Rejected(err),
                    });
                    if let Some((index, request)) = remaining.next() {
                        let this = Arc::clone(self);
                        in_flight.push(async move { (index, this.submit(request, strategy).await) });
                    }
                }
                outcomes.into_iter().map(|o| o.expect("every index filled")).collect()
            }
        };
        Ok((bulk_id, outcomes))
    }

    /// Background loop: periodically sweeps expired allocations and
    /// tries to admit queued requests as capacity frees up. Intended to
    /// be spawned once per orchestrator instance and driven until
    /// `cancel` fires (spec §5 "resourceMonitoringInterval", default
    /// 30s).
    pub async fn run_background_loop(self: Arc<Self>, cancel: CancellationToken) {
        let mut last_sweep = self.clock.now();
        loop {
            if cancel.is_cancelled() {
                return;
            }

            let now = self.clock.now();
            if (now - last_sweep).to_std().unwrap_or(Duration::ZERO) >= self.config.resource_sweep_interval {
                let expired = self.pool.sweep_expired(now).await;
                for execution_id in expired {
                    let mut executions = self.executions.lock().await;
                    let snapshot = if let Some(exec) = executions.get_mut(&execution_id) {
                        if !exec.status.is_terminal() {
                            exec.failure_reason = Some("resource allocation expired".into());
                            exec.transition(ExecutionStatus::Failed, now);
                            self.metrics.record_failed();
                            Some(exec.clone())
                        } else {
                            None
                        }
                    } else {
                        None
                    };
                    drop(executions);
                    if let Some(snapshot) = snapshot {
                        self.history.record(snapshot).await;
                    }
                }
                last_sweep = now;
            }

            self.try_admit_from_queue().await;

            tokio::select! {
                _ = self.clock.sleep(self.config.admission_poll_interval) => {}
                _ = cancel.cancelled() => return,
            }
        }
    }

    async fn try_admit_from_queue(self: &Arc<Self>) {
        loop {
            let mut queue = self.queue.lock().await;
            if queue.is_empty() {
                return;
            }
            let now = self.clock.now();
            let Some((key, queued)) = queue.pop_with_boost(|key| {
                let age_minutes = (now - key.due).num_minutes().max(0) as f64;
                if age_minutes > 60.0 {
                    key.priority_value
                        .saturating_sub((age_minutes * 0.5).min(100.0) as u8)
                } else {
                    key.priority_value
                }
            }) else {
                return;
            };
            drop(queue);

            let metadata = match self.data_source.metadata(&queued.request.data_source_id).await {
                Ok(m) => m,
                Err(_) => continue,
            };
            let hint = match &self.estimator {
                Some(estimator) => estimator.estimate_resources(&queued.request).await.ok().flatten(),
                None => None,
            };
            let estimated = estimate::estimate_resources(&queued.request, &metadata, hint);

            // spec §8 invariant 2: don't admit past `maxConcurrentScans`
            // even when the resource pool has room.
            if self.admitted_non_terminal_count().await >= self.config.max_concurrent_executions {
                let mut queue = self.queue.lock().await;
                queue.push(key, queued);
                return;
            }

            let allocated = self
                .pool
                .try_allocate(
                    queued.execution_id,
                    estimated,
                    key.priority_value,
                    now,
                    self.config.allocation_grace,
                )
                .await;

            if !allocated {
                // Put it back and stop for this tick -- capacity is exhausted.
                let mut queue = self.queue.lock().await;
                queue.push(key, queued);
                return;
            }

            self.metrics
                .record_queue_wait((now - queued.queued_at).num_milliseconds().max(0) as u64);
            let built_plan = plan::build_plan(&queued.request, queued.strategy, estimated, hint);
            self.admit(queued.execution_id, queued.request, built_plan, now).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{DataSourceMetadata, RuleOutcome, SystemClock};
    use crate::capability::NullMetricsSink;
    use async_trait::async_trait;
    use scanforge_types::ids::ScanRequestId;
    use scanforge_types::model::{Priority, ResourceRequirement, ScanType};
    use std::collections::HashMap as Map;

    struct StubDataSource;
    #[async_trait]
    impl DataSourceSvc for StubDataSource {
        async fn validate(&self, _id: &str) -> anyhow::Result<bool> {
            Ok(true)
        }
        async fn metadata(&self, _id: &str) -> anyhow::Result<DataSourceMetadata> {
            Ok(DataSourceMetadata {
                estimated_rows: 1_000,
                tables: vec!["t".into()],
                columns: vec!["c".into()],
            })
        }
    }

    struct StubRules;
    #[async_trait]
    impl RuleSvc for StubRules {
        async fn validate(&self, rule_ids: &[String]) -> anyhow::Result<Vec<String>> {
            Ok(rule_ids.to_vec())
        }
        async fn execute_rule(
            &self,
            rule_id: &str,
            _request: &ScanRequest,
        ) -> anyhow::Result<RuleOutcome> {
            Ok(RuleOutcome {
                rule_id: rule_id.to_string(),
                succeeded: true,
                error: None,
                output: serde_json::Value::Null,
            })
        }
    }

    fn request() -> ScanRequest {
        ScanRequest {
            id: ScanRequestId::new(),
            data_source_id: "ds".into(),
            scan_type: ScanType::Full,
            priority: Priority::Normal,
            rule_ids: vec!["r1".into(), "r2".into()],
            timeout_ms: 5_000,
            max_attempts: 1,
            params: Map::new(),
            tags: Default::default(),
            created_by: "svc".into(),
            created_at: Utc::now(),
            scheduled_time: None,
            cron: None,
            dependencies: Default::default(),
        }
    }

    fn test_orchestrator() -> Arc<Orchestrator> {
        Orchestrator::new(
            OrchestratorConfig::default(),
            ResourceRequirement {
                cpu_pct: 100.0,
                memory_mb: 8192,
                storage_mb: 10_240,
                network_mbps: 1000,
                db_connections: 10,
                api_rate: 1000,
                complexity: 1.0,
                estimated_duration_minutes: 1,
            },
            Arc::new(StubDataSource),
            Arc::new(StubRules),
            None,
            Arc::new(SystemClock),
            Arc::new(NullMetricsSink),
            Arc::new(crate::capability::TracingLogSink),
        )
    }

    struct SlowRules;
    #[async_trait]
    impl RuleSvc for SlowRules {
        async fn validate(&self, rule_ids: &[String]) -> anyhow::Result<Vec<String>> {
            Ok(rule_ids.to_vec())
        }
        async fn execute_rule(
            &self,
            rule_id: &str,
            _request: &ScanRequest,
        ) -> anyhow::Result<RuleOutcome> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(RuleOutcome {
                rule_id: rule_id.to_string(),
                succeeded: true,
                error: None,
                output: serde_json::Value::Null,
            })
        }
    }

    /// spec §8 invariant 2: `len(activeExecutions) <= maxConcurrentScans`
    /// even when the resource pool has ample room for more.
    #[tokio::test]
    async fn submit_queues_once_the_concurrency_ceiling_is_reached() {
        let orchestrator = Orchestrator::new(
            OrchestratorConfig {
                max_concurrent_executions: 1,
                ..OrchestratorConfig::default()
            },
            ResourceRequirement {
                cpu_pct: 100.0,
                memory_mb: 8192,
                storage_mb: 10_240,
                network_mbps: 1000,
                db_connections: 10,
                api_rate: 1000,
                complexity: 1.0,
                estimated_duration_minutes: 1,
            },
            Arc::new(StubDataSource),
            Arc::new(SlowRules),
            None,
            Arc::new(SystemClock),
            Arc::new(NullMetricsSink),
            Arc::new(crate::capability::TracingLogSink),
        );

        let first = orchestrator
            .submit(request(), ExecutionStrategy::Sequential)
            .await
            .expect("first submit should be admitted");
        let second = orchestrator
            .submit(request(), ExecutionStrategy::Sequential)
            .await
            .expect("second submit should queue rather than fail");

        let first_status = orchestrator.status(first).await.expect("first execution exists");
        assert_ne!(first_status.current_step, "queued");

        let second_status = orchestrator.status(second).await.expect("second execution exists");
        assert_eq!(second_status.current_step, "queued");
        assert!(second_status.plan.stages.is_empty());
    }

    #[tokio::test]
    async fn submit_admits_immediately_when_capacity_available() {
        let orchestrator = test_orchestrator();
        let execution_id = orchestrator
            .submit(request(), ExecutionStrategy::Sequential)
            .await
            .expect("submit should succeed");

        // Give the spawned execution task a moment to run to completion.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let status = orchestrator.status(execution_id).await.expect("execution exists");
        assert_eq!(status.status, ExecutionStatus::Completed);
        assert_eq!(status.progress, 1.0);
    }

    #[tokio::test]
    async fn submit_rejects_malformed_request() {
        let orchestrator = test_orchestrator();
        let mut bad = request();
        bad.rule_ids.clear();
        let result = orchestrator.submit(bad, ExecutionStrategy::Sequential).await;
        assert!(matches!(result, Err(ErrorKind::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn cancel_unknown_execution_is_an_error() {
        let orchestrator = test_orchestrator();
        let result = orchestrator.cancel(ExecutionId::new()).await;
        assert!(result.is_err());
    }
}
