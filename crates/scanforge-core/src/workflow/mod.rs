//! The workflow engine: runs a `Workflow` instance stage-by-stage after
//! it is instantiated from a template (spec §4.3). Owns `workflows`,
//! `pendingApprovals`, and template storage exclusively (spec §3
//! "Ownership"); the only other component it touches is the
//! orchestrator, and only through its public `submit`/`status`/`cancel`
//! surface -- this engine never reaches into `Orchestrator`'s internal
//! maps (Design Notes: "narrow interfaces and identifier references;
//! never embed one component inside another").

pub mod approval;
pub mod condition;
pub mod task;
pub mod template;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use scanforge_types::ids::{ApprovalId, WorkflowId, WorkflowStageId};
use scanforge_types::model::{
    ApprovalDecision, ApprovalRequest, Priority, ScanRequest, Workflow, WorkflowStageStatus,
    WorkflowStageType, WorkflowStatus,
};
use scanforge_types::ErrorKind;

use crate::capability::{ClockSvc, LogLevel, LogSink, MetricsSink, Rbac};
use crate::orchestrator::Orchestrator;
use task::TaskHandler;
use template::{validate_template, WorkflowTemplate};

/// Tunables for the engine's background behavior (spec §4.3 defaults).
#[derive(Debug, Clone)]
pub struct WorkflowEngineConfig {
    /// Hard ceiling on a workflow's total run time (spec §4.3: "default
    /// 24h"), from `ExecuteWorkflow` to terminal.
    pub default_workflow_timeout_hours: i64,
    /// How often a stage blocked on an `Approval` re-checks for a
    /// decision or a timeout.
    pub approval_poll_interval: Duration,
    /// How often a `Processing` stage's scan-submission task re-checks
    /// the orchestrator for a terminal execution status.
    pub scan_poll_interval: Duration,
    /// Hours before a fresh `Approval` stage's first escalation (spec
    /// §4.3 default 72h), passed to `approval::new_request`.
    pub approval_timeout_hours: i64,
    /// Auto-approval confidence threshold (spec §4.3: ">= 0.9 auto-approves").
    pub auto_approval_threshold: f64,
}

impl Default for WorkflowEngineConfig {
    fn default() -> Self {
        Self {
            default_workflow_timeout_hours: 24,
            approval_poll_interval: Duration::from_secs(30),
            scan_poll_interval: Duration::from_millis(200),
            approval_timeout_hours: approval::DEFAULT_TIMEOUT_HOURS,
            auto_approval_threshold: approval::AUTO_APPROVAL_THRESHOLD,
        }
    }
}

/// Where a stage (or the workflow overall) landed after one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StageOutcome {
    Completed,
    Skipped,
    Failed,
    TimedOut,
}

pub struct WorkflowEngine {
    config: WorkflowEngineConfig,
    templates: Mutex<HashMap<String, WorkflowTemplate>>,
    workflows: Mutex<HashMap<WorkflowId, Workflow>>,
    pending_approvals: Mutex<HashMap<ApprovalId, ApprovalRequest>>,
    orchestrator: Arc<Orchestrator>,
    task_handlers: HashMap<String, Arc<dyn TaskHandler>>,
    rbac: Arc<dyn Rbac>,
    clock: Arc<dyn ClockSvc>,
    metrics_sink: Arc<dyn MetricsSink>,
    log_sink: Arc<dyn LogSink>,
}

impl WorkflowEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: WorkflowEngineConfig,
        orchestrator: Arc<Orchestrator>,
        task_handlers: HashMap<String, Arc<dyn TaskHandler>>,
        rbac: Arc<dyn Rbac>,
        clock: Arc<dyn ClockSvc>,
        metrics_sink: Arc<dyn MetricsSink>,
        log_sink: Arc<dyn LogSink>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            templates: Mutex::new(HashMap::new()),
            workflows: Mutex::new(HashMap::new()),
            pending_approvals: Mutex::new(HashMap::new()),
            orchestrator,
            task_handlers,
            rbac,
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

    /// Register a reusable pipeline blueprint (spec §6 `CreateTemplate`).
    /// The template's own name doubles as the `templateId` `ExecuteWorkflow`
    /// is given back.
    pub async fn create_template(&self, template: WorkflowTemplate) -> Result<String, ErrorKind> {
        validate_template(&template)?;
        let name = template.name.clone();
        self.templates.lock().await.insert(name.clone(), template);
        Ok(name)
    }

    /// Instantiate `template_name` into a running `Workflow` and spawn its
    /// driver task (spec §6 `ExecuteWorkflow`). Returns as soon as the
    /// workflow is queued -- the caller polls `status` for progress.
    pub async fn execute_workflow(
        self: &Arc<Self>,
        template_name: &str,
        params: serde_json::Map<String, Value>,
        priority: Priority,
    ) -> Result<WorkflowId, ErrorKind> {
        let template = self
            .templates
            .lock()
            .await
            .get(template_name)
            .cloned()
            .ok_or_else(|| {
                ErrorKind::InvalidRequest(format!("unknown workflow template {template_name}"))
            })?;

        let workflow = template::instantiate(
            &template,
            params,
            priority,
            self.config.default_workflow_timeout_hours,
        );
        let id = workflow.id;
        self.workflows.lock().await.insert(id, workflow);
        self.emit(
            "workflows.executed",
            HashMap::from([("template".to_string(), template_name.to_string())]),
            1.0,
        );

        let engine = Arc::clone(self);
        tokio::spawn(async move { engine.run_workflow(id).await });
        Ok(id)
    }

    /// Cancel a queued or running workflow (spec §6 `CancelWorkflow`).
    /// If a stage has an in-flight scan execution, it's cancelled too.
    pub async fn cancel_workflow(&self, id: WorkflowId) -> Result<(), ErrorKind> {
        let execution_id = {
            let mut workflows = self.workflows.lock().await;
            let workflow = workflows
                .get_mut(&id)
                .ok_or_else(|| ErrorKind::InvalidRequest(format!("no such workflow {id}")))?;
            if !Workflow::is_valid_transition(workflow.status, WorkflowStatus::Cancelled) {
                return Err(ErrorKind::InvalidRequest(format!(
                    "workflow {id} cannot be cancelled from {:?}",
                    workflow.status
                )));
            }
            workflow.status = WorkflowStatus::Cancelled;
            workflow.completed_at = Some(self.clock.now());
            workflow.execution_id
        };
        if let Some(execution_id) = execution_id {
            let _ = self.orchestrator.cancel(execution_id).await;
        }
        Ok(())
    }

    /// Record a human decision against a pending `Approval` stage (spec
    /// §6 `Approve`). The blocked stage driver notices on its next poll.
    pub async fn approve(
        &self,
        approval_id: ApprovalId,
        decision: ApprovalDecision,
        actor: &str,
    ) -> Result<(), ErrorKind> {
        let mut pending = self.pending_approvals.lock().await;
        let request = pending.get_mut(&approval_id).ok_or_else(|| {
            ErrorKind::InvalidRequest(format!("no pending approval {approval_id}"))
        })?;
        request.decision = Some(decision);
        request.decided_by = Some(actor.to_string());
        request.decided_at = Some(self.clock.now());
        Ok(())
    }

    pub async fn status(&self, id: WorkflowId) -> Option<Workflow> {
        self.workflows.lock().await.get(&id).cloned()
    }

    pub async fn pending_approval(&self, id: ApprovalId) -> Option<ApprovalRequest> {
        self.pending_approvals.lock().await.get(&id).cloned()
    }

    pub async fn active_workflows(&self, limit: usize) -> Vec<Workflow> {
        self.workflows
            .lock()
            .await
            .values()
            .filter(|w| !matches!(w.status, WorkflowStatus::Completed | WorkflowStatus::Failed))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Periodically reaps workflows that outran their `timeout_at` while
    /// blocked on a stage that never makes progress on its own (e.g. an
    /// approval nobody ever answers takes itself to `Exhausted`, but a
    /// `Custom` stage awaiting an external signal has no other sweep).
    pub async fn run_timeout_sweeper(self: Arc<Self>, cancel: CancellationToken, interval: Duration) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = self.clock.sleep(interval) => {}
            }
            let now = self.clock.now();
            let expired: Vec<WorkflowId> = {
                let workflows = self.workflows.lock().await;
                workflows
                    .values()
                    .filter(|w| w.status == WorkflowStatus::Running && now > w.timeout_at)
                    .map(|w| w.id)
                    .collect()
            };
            for id in expired {
                self.finish_workflow(id, WorkflowStatus::TimedOut).await;
                self.log(
                    LogLevel::Warn,
                    "workflow timed out",
                    HashMap::from([("workflow_id".to_string(), id.to_string())]),
                );
            }
        }
    }

    /// Drive one workflow from `Queued` through its stages in order to a
    /// terminal status. Runs as its own spawned task (mirrors the
    /// orchestrator's one-task-per-execution shape).
    async fn run_workflow(self: Arc<Self>, id: WorkflowId) {
        {
            let mut workflows = self.workflows.lock().await;
            let Some(workflow) = workflows.get_mut(&id) else { return };
            if workflow.status != WorkflowStatus::Queued {
                return;
            }
            workflow.status = WorkflowStatus::Running;
            workflow.started_at = Some(self.clock.now());
        }

        let (stage_ids, workflow_type) = {
            let workflows = self.workflows.lock().await;
            match workflows.get(&id) {
                Some(w) => (w.stages.iter().map(|s| s.id).collect::<Vec<_>>(), w.template.clone()),
                None => return,
            }
        };

        for stage_id in stage_ids {
            if self.workflow_is_terminal(id).await {
                return;
            }
            if self.workflow_has_timed_out(id).await {
                self.finish_workflow(id, WorkflowStatus::TimedOut).await;
                return;
            }

            let outcome = self.run_stage(id, stage_id, &workflow_type).await;
            match outcome {
                StageOutcome::Completed | StageOutcome::Skipped => continue,
                StageOutcome::Failed | StageOutcome::TimedOut => {
                    let optional = {
                        let workflows = self.workflows.lock().await;
                        workflows
                            .get(&id)
                            .and_then(|w| w.stage(stage_id))
                            .map(|s| s.optional)
                            .unwrap_or(false)
                    };
                    if optional {
                        continue;
                    }
                    self.finish_workflow(id, WorkflowStatus::Failed).await;
                    return;
                }
            }
        }

        self.finish_workflow(id, WorkflowStatus::Completed).await;
    }

    async fn workflow_is_terminal(&self, id: WorkflowId) -> bool {
        let workflows = self.workflows.lock().await;
        workflows
            .get(&id)
            .map(|w| {
                matches!(
                    w.status,
                    WorkflowStatus::Cancelled
                        | WorkflowStatus::Failed
                        | WorkflowStatus::TimedOut
                        | WorkflowStatus::Completed
                )
            })
            .unwrap_or(true)
    }

    async fn workflow_has_timed_out(&self, id: WorkflowId) -> bool {
        let now = self.clock.now();
        let workflows = self.workflows.lock().await;
        workflows.get(&id).map(|w| now > w.timeout_at).unwrap_or(false)
    }

    async fn finish_workflow(&self, id: WorkflowId, status: WorkflowStatus) {
        let mut workflows = self.workflows.lock().await;
        if let Some(workflow) = workflows.get_mut(&id) {
            workflow.status = status;
            workflow.completed_at = Some(self.clock.now());
        }
    }

    /// Build the condition/task-handler evaluation context: `vars` plus
    /// each completed stage's `output`, addressable as
    /// `"stages.<name>.<key>"` (spec §4.3 "condition evaluation").
    async fn build_context(&self, id: WorkflowId) -> Value {
        let workflows = self.workflows.lock().await;
        let Some(workflow) = workflows.get(&id) else {
            return Value::Object(Default::default());
        };
        let mut stages = serde_json::Map::new();
        for stage in &workflow.stages {
            stages.insert(stage.name.clone(), Value::Object(stage.output.clone()));
        }
        let mut root = serde_json::Map::new();
        root.insert("vars".into(), Value::Object(workflow.vars.clone()));
        root.insert("stages".into(), Value::Object(stages));
        root.insert("params".into(), Value::Object(workflow.params.clone()));
        Value::Object(root)
    }

    /// Run a single stage to its own terminal outcome, dispatching on
    /// `stage_type` (spec §4.3 table). `Approval` blocks on a human (or
    /// auto-approval) decision; every other type runs its task list.
    async fn run_stage(&self, id: WorkflowId, stage_id: WorkflowStageId, workflow_type: &str) -> StageOutcome {
        let ctx = self.build_context(id).await;
        let conditions_hold = {
            let workflows = self.workflows.lock().await;
            workflows
                .get(&id)
                .and_then(|w| w.stage(stage_id))
                .map(|s| condition::all_conditions_hold(&s.conditions, &ctx))
                .unwrap_or(false)
        };
        if !conditions_hold {
            self.set_stage_status(id, stage_id, WorkflowStageStatus::Skipped, true).await;
            return StageOutcome::Skipped;
        }

        self.set_stage_status(id, stage_id, WorkflowStageStatus::Running, false).await;
        let stage_type = {
            let workflows = self.workflows.lock().await;
            workflows.get(&id).and_then(|w| w.stage(stage_id)).map(|s| s.stage_type)
        };

        let outcome = match stage_type {
            Some(WorkflowStageType::Approval) => self.run_approval_stage(id, stage_id, workflow_type).await,
            Some(_) => self.run_task_list_stage(id, stage_id).await,
            None => StageOutcome::Failed,
        };

        self.set_stage_status(
            id,
            stage_id,
            match outcome {
                StageOutcome::Completed => WorkflowStageStatus::Completed,
                StageOutcome::Skipped => WorkflowStageStatus::Skipped,
                StageOutcome::Failed => WorkflowStageStatus::Failed,
                StageOutcome::TimedOut => WorkflowStageStatus::TimedOut,
            },
            true,
        )
        .await;
        outcome
    }

    async fn set_stage_status(
        &self,
        id: WorkflowId,
        stage_id: WorkflowStageId,
        status: WorkflowStageStatus,
        terminal: bool,
    ) {
        let mut workflows = self.workflows.lock().await;
        let Some(workflow) = workflows.get_mut(&id) else { return };
        let Some(stage) = workflow.stages.iter_mut().find(|s| s.id == stage_id) else { return };
        let now = self.clock.now();
        if stage.started_at.is_none() {
            stage.started_at = Some(now);
        }
        stage.status = status;
        if terminal {
            stage.completed_at = Some(now);
        }
    }

    /// `Initialization`/`Validation`/`Processing`/`Analysis`/`Reporting`/
    /// `Notification`/`Cleanup`/`Custom` all reduce to the same
    /// generic-task-list executor (spec §4.3: "Custom: Generic task-list
    /// executor" is the fallback every other type specializes nothing
    /// beyond). A task's exhausted retries fail the stage only if the
    /// task is `critical`.
    async fn run_task_list_stage(&self, id: WorkflowId, stage_id: WorkflowStageId) -> StageOutcome {
        let tasks = {
            let workflows = self.workflows.lock().await;
            workflows
                .get(&id)
                .and_then(|w| w.stage(stage_id))
                .map(|s| s.tasks.clone())
                .unwrap_or_default()
        };

        let mut all_critical_ok = true;
        for (index, task) in tasks.into_iter().enumerate() {
            let ctx = self.build_context(id).await;
            let mut attempt = 0u32;
            let mut result = self.run_task(id, &task, &ctx).await;
            while result.is_err() && attempt < task.max_retries {
                let delay = task::retry_delay(task.retry_strategy, attempt);
                self.clock.sleep(delay).await;
                attempt += 1;
                result = self.run_task(id, &task, &ctx).await;
            }

            match result {
                Ok(value) => {
                    self.set_task_result(id, stage_id, index, WorkflowStageStatus::Completed, attempt, Some(value))
                        .await;
                }
                Err(err) => {
                    self.set_task_result(id, stage_id, index, WorkflowStageStatus::Failed, attempt, None)
                        .await;
                    self.log(
                        LogLevel::Warn,
                        "workflow task failed",
                        HashMap::from([
                            ("workflow_id".to_string(), id.to_string()),
                            ("task".to_string(), task.name.clone()),
                            ("error".to_string(), err.to_string()),
                        ]),
                    );
                    if task.critical {
                        all_critical_ok = false;
                    }
                }
            }
        }

        if all_critical_ok {
            StageOutcome::Completed
        } else {
            StageOutcome::Failed
        }
    }

    async fn set_task_result(
        &self,
        id: WorkflowId,
        stage_id: WorkflowStageId,
        task_index: usize,
        status: WorkflowStageStatus,
        retry_count: u32,
        output: Option<Value>,
    ) {
        let mut workflows = self.workflows.lock().await;
        let Some(workflow) = workflows.get_mut(&id) else { return };
        let Some(stage) = workflow.stages.iter_mut().find(|s| s.id == stage_id) else { return };
        let Some(task) = stage.tasks.get_mut(task_index) else { return };
        let now = self.clock.now();
        task.started_at.get_or_insert(now);
        task.completed_at = Some(now);
        task.status = status;
        task.retry_count = retry_count;
        if let Some(Value::Object(map)) = output {
            stage.output.insert(task.name.clone(), Value::Object(map));
        } else if let Some(value) = output {
            stage.output.insert(task.name.clone(), value);
        }
    }

    /// Dispatch one task: a name with a registered [`TaskHandler`] runs
    /// that handler; a `"submit_scan"` task (task names are
    /// `"submit_scan:<key>"`, `<key>` addressing a `ScanRequest` parked
    /// under `params.scan_requests.<key>`) submits to the orchestrator
    /// and waits for its terminal status; anything else is a
    /// configuration error.
    async fn run_task(
        &self,
        id: WorkflowId,
        task: &scanforge_types::model::WorkflowTask,
        ctx: &Value,
    ) -> anyhow::Result<Value> {
        if let Some(handler) = self.task_handlers.get(&task.name) {
            return handler.run(ctx).await;
        }
        if let Some(key) = task.name.strip_prefix("submit_scan:") {
            return self.run_submit_scan_task(id, key, ctx).await;
        }
        anyhow::bail!("no handler registered for workflow task {}", task.name)
    }

    async fn run_submit_scan_task(&self, id: WorkflowId, key: &str, ctx: &Value) -> anyhow::Result<Value> {
        let request_value = ctx
            .pointer(&format!("/params/scan_requests/{key}"))
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no scan_requests.{key} parameter for submit_scan task"))?;
        let request: ScanRequest = serde_json::from_value(request_value)?;
        let priority = request.priority;
        let strategy = match priority {
            Priority::Critical | Priority::High => {
                scanforge_types::model::ExecutionStrategy::Parallel
            }
            _ => scanforge_types::model::ExecutionStrategy::Adaptive,
        };

        let execution_id = self.orchestrator.submit(request, strategy).await?;
        {
            let mut workflows = self.workflows.lock().await;
            if let Some(workflow) = workflows.get_mut(&id) {
                workflow.execution_id = Some(execution_id);
            }
        }

        loop {
            let execution = self.orchestrator.status(execution_id).await;
            match execution {
                Some(execution) if execution.status.is_terminal() => {
                    return Ok(serde_json::json!({
                        "execution_id": execution_id.to_string(),
                        "status": execution.status.to_string(),
                    }));
                }
                Some(_) => {
                    self.clock.sleep(self.config.scan_poll_interval).await;
                }
                None => anyhow::bail!("execution {execution_id} vanished before reaching a terminal status"),
            }
        }
    }

    /// Block on a human (or auto-approval) decision for an `Approval`
    /// stage (spec §4.3 "Approvals"). Escalates through
    /// [`approval::escalation_chain_for`] on timeout; a fully-escalated
    /// approval fails the stage.
    async fn run_approval_stage(&self, id: WorkflowId, stage_id: WorkflowStageId, workflow_type: &str) -> StageOutcome {
        let now = self.clock.now();
        let approvers = self
            .rbac
            .resolve_approvers(workflow_type, workflow_type, None)
            .await
            .unwrap_or_default();

        let approval_id = {
            let mut pending = self.pending_approvals.lock().await;
            if let Some(existing) = pending
                .values()
                .find(|r| r.workflow_id == id && r.stage_id == stage_id)
            {
                existing.id
            } else {
                let mut request =
                    approval::new_request(id, stage_id, workflow_type, now, self.config.approval_timeout_hours);
                if !approvers.is_empty() {
                    request.escalation_chain = approvers;
                }
                let auto_score = self.auto_approval_score(id, stage_id).await;
                approval::maybe_auto_approve(&mut request, auto_score, now, self.config.auto_approval_threshold);
                let approval_id = request.id;
                pending.insert(approval_id, request);
                approval_id
            }
        };

        loop {
            let now = self.clock.now();
            let fallback_execution_id = self.fallback_execution_id(id).await;
            let decided = {
                let mut pending = self.pending_approvals.lock().await;
                let Some(request) = pending.get_mut(&approval_id) else {
                    return StageOutcome::Failed;
                };
                if let Some(decision) = request.decision {
                    pending.remove(&approval_id);
                    Some(match decision {
                        ApprovalDecision::Approved => StageOutcome::Completed,
                        ApprovalDecision::Rejected => StageOutcome::Failed,
                    })
                } else {
                    match approval::check_timeout(request, fallback_execution_id, now) {
                        approval::TimeoutOutcome::StillWaiting => None,
                        approval::TimeoutOutcome::Escalated => {
                            self.log(
                                LogLevel::Info,
                                "approval escalated",
                                HashMap::from([
                                    ("approval_id".to_string(), approval_id.to_string()),
                                    (
                                        "approver".to_string(),
                                        request.current_approver_role().unwrap_or("").to_string(),
                                    ),
                                ]),
                            );
                            None
                        }
                        approval::TimeoutOutcome::Exhausted { .. } => {
                            pending.remove(&approval_id);
                            Some(StageOutcome::TimedOut)
                        }
                    }
                }
            };
            if let Some(outcome) = decided {
                return outcome;
            }
            self.clock.sleep(self.config.approval_poll_interval).await;
        }
    }

    /// Caller-supplied auto-approval confidence, if any, parked under
    /// `params.auto_approval_score.<stage-name>` (spec §4.3: "if an
    /// auto-approval score >= 0.9 is present, auto-approve"). No
    /// `EstimatorSvc`-style advisor surfaces this today, so it is only
    /// ever externally supplied -- see `DESIGN.md`.
    async fn auto_approval_score(&self, id: WorkflowId, stage_id: WorkflowStageId) -> Option<f64> {
        let workflows = self.workflows.lock().await;
        let workflow = workflows.get(&id)?;
        let stage = workflow.stage(stage_id)?;
        workflow
            .params
            .get("auto_approval_score")
            .and_then(|v| v.as_object())
            .and_then(|m| m.get(&stage.name))
            .and_then(|v| v.as_f64())
    }

    async fn fallback_execution_id(&self, id: WorkflowId) -> scanforge_types::ids::ExecutionId {
        self.workflows
            .lock()
            .await
            .get(&id)
            .and_then(|w| w.execution_id)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration as StdDuration;

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};

    use scanforge_types::model::{ConditionOperator, RetryStrategy};

    use crate::capability::{DataSourceMetadata, DataSourceSvc, EstimatorSvc, RuleOutcome, RuleSvc};
    use crate::orchestrator::OrchestratorConfig;
    use template::{StageTemplate, TaskTemplate};

    struct ManualClock {
        now: std::sync::Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        fn new() -> Arc<Self> {
            Arc::new(Self { now: std::sync::Mutex::new(Utc::now()) })
        }
    }

    #[async_trait]
    impl ClockSvc for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().unwrap()
        }
        async fn sleep(&self, duration: StdDuration) {
            {
                let mut now = self.now.lock().unwrap();
                *now += chrono::Duration::from_std(duration).unwrap_or_default();
            }
            // Without an actual suspension point here, a caller looping on
            // `clock.sleep(...).await` (e.g. `run_approval_stage`) never
            // yields back to the runtime -- it would spin forever on a
            // single task instead of letting the test driver's own poll
            // loop make progress.
            tokio::task::yield_now().await;
        }
    }

    struct StubDataSource;
    #[async_trait]
    impl DataSourceSvc for StubDataSource {
        async fn validate(&self, _: &str) -> anyhow::Result<bool> {
            Ok(true)
        }
        async fn metadata(&self, _: &str) -> anyhow::Result<DataSourceMetadata> {
            Ok(DataSourceMetadata { estimated_rows: 100, tables: vec![], columns: vec![] })
        }
    }

    struct StubRules;
    #[async_trait]
    impl RuleSvc for StubRules {
        async fn validate(&self, rule_ids: &[String]) -> anyhow::Result<Vec<String>> {
            Ok(rule_ids.to_vec())
        }
        async fn execute_rule(&self, rule_id: &str, _: &ScanRequest) -> anyhow::Result<RuleOutcome> {
            Ok(RuleOutcome { rule_id: rule_id.to_string(), succeeded: true, error: None, output: Value::Null })
        }
    }

    struct NoEstimator;
    #[async_trait]
    impl EstimatorSvc for NoEstimator {
        async fn estimate_resources(&self, _: &ScanRequest) -> anyhow::Result<Option<crate::capability::EstimateHint>> {
            Ok(None)
        }
        async fn estimate_duration(&self, _: &ScanRequest) -> anyhow::Result<Option<u32>> {
            Ok(None)
        }
    }

    struct AllowAllRbac;
    #[async_trait]
    impl Rbac for AllowAllRbac {
        async fn resolve_approvers(&self, _: &str, _: &str, _: Option<&str>) -> anyhow::Result<Vec<String>> {
            Ok(vec![])
        }
    }

    struct CountingHandler(Arc<AtomicU64>);
    #[async_trait]
    impl TaskHandler for CountingHandler {
        async fn run(&self, _ctx: &Value) -> anyhow::Result<Value> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(serde_json::json!({"ran": true}))
        }
    }

    fn make_engine() -> Arc<WorkflowEngine> {
        let orchestrator = Orchestrator::new(
            OrchestratorConfig::default(),
            scanforge_types::model::ResourceRequirement {
                cpu_pct: 1000.0,
                memory_mb: 1_000_000,
                storage_mb: 1_000_000,
                network_mbps: 1_000_000,
                db_connections: 1000,
                api_rate: 1_000_000,
                complexity: 1.0,
                estimated_duration_minutes: 1,
            },
            Arc::new(StubDataSource),
            Arc::new(StubRules),
            Some(Arc::new(NoEstimator)),
            Arc::new(ManualClock::new()),
            Arc::new(crate::capability::NullMetricsSink),
            Arc::new(crate::capability::TracingLogSink),
        );

        WorkflowEngine::new(
            WorkflowEngineConfig::default(),
            orchestrator,
            HashMap::new(),
            Arc::new(AllowAllRbac),
            Arc::new(ManualClock::new()),
            Arc::new(crate::capability::NullMetricsSink),
            Arc::new(crate::capability::TracingLogSink),
        )
    }

    fn sample_template(counter: Arc<AtomicU64>) -> (WorkflowTemplate, Arc<dyn TaskHandler>) {
        let handler: Arc<dyn TaskHandler> = Arc::new(CountingHandler(counter));
        let template = WorkflowTemplate {
            name: "audit".into(),
            workflow_type: "data_classification".into(),
            stages: vec![
                StageTemplate {
                    name: "init".into(),
                    stage_type: WorkflowStageType::Initialization,
                    conditions: vec![],
                    tasks: vec![TaskTemplate {
                        name: "seed".into(),
                        critical: true,
                        retry_strategy: RetryStrategy::Immediate,
                        max_retries: 0,
                    }],
                    retry_strategy: RetryStrategy::Immediate,
                    max_retries: 0,
                    timeout_ms: 60_000,
                    optional: false,
                },
                StageTemplate {
                    name: "conditional_skip".into(),
                    stage_type: WorkflowStageType::Custom,
                    conditions: vec![scanforge_types::model::Condition {
                        lhs_path: "vars.never".into(),
                        operator: ConditionOperator::Equals,
                        rhs: serde_json::json!(true),
                    }],
                    tasks: vec![TaskTemplate {
                        name: "seed".into(),
                        critical: true,
                        retry_strategy: RetryStrategy::Immediate,
                        max_retries: 0,
                    }],
                    retry_strategy: RetryStrategy::Immediate,
                    max_retries: 0,
                    timeout_ms: 60_000,
                    optional: false,
                },
            ],
        };
        (template, handler)
    }

    #[tokio::test]
    async fn create_template_rejects_invalid_definitions() {
        let engine = make_engine();
        let mut template = sample_template(Arc::new(AtomicU64::new(0))).0;
        template.stages.clear();
        assert!(engine.create_template(template).await.is_err());
    }

    #[tokio::test]
    async fn execute_workflow_runs_tasks_and_skips_unmet_conditions() {
        let counter = Arc::new(AtomicU64::new(0));
        let (mut template, handler) = sample_template(Arc::clone(&counter));
        template.stages[0].tasks[0].name = "seed".into();

        let orchestrator = Orchestrator::new(
            OrchestratorConfig::default(),
            scanforge_types::model::ResourceRequirement {
                cpu_pct: 1000.0,
                memory_mb: 1_000_000,
                storage_mb: 1_000_000,
                network_mbps: 1_000_000,
                db_connections: 1000,
                api_rate: 1_000_000,
                complexity: 1.0,
                estimated_duration_minutes: 1,
            },
            Arc::new(StubDataSource),
            Arc::new(StubRules),
            Some(Arc::new(NoEstimator)),
            Arc::new(ManualClock::new()),
            Arc::new(crate::capability::NullMetricsSink),
            Arc::new(crate::capability::TracingLogSink),
        );
        let mut handlers: HashMap<String, Arc<dyn TaskHandler>> = HashMap::new();
        handlers.insert("seed".into(), handler);

        let engine = WorkflowEngine::new(
            WorkflowEngineConfig::default(),
            orchestrator,
            handlers,
            Arc::new(AllowAllRbac),
            Arc::new(ManualClock::new()),
            Arc::new(crate::capability::NullMetricsSink),
            Arc::new(crate::capability::TracingLogSink),
        );

        let name = engine.create_template(template).await.unwrap();
        let id = engine
            .execute_workflow(&name, serde_json::Map::new(), Priority::Normal)
            .await
            .unwrap();

        let mut workflow = None;
        for _ in 0..200 {
            let w = engine.status(id).await.unwrap();
            if matches!(w.status, WorkflowStatus::Completed | WorkflowStatus::Failed) {
                workflow = Some(w);
                break;
            }
            tokio::time::sleep(StdDuration::from_millis(10)).await;
        }
        let workflow = workflow.expect("workflow did not reach a terminal status");
        assert_eq!(workflow.status, WorkflowStatus::Completed);
        assert_eq!(workflow.stages[0].status, WorkflowStageStatus::Completed);
        assert_eq!(workflow.stages[1].status, WorkflowStageStatus::Skipped);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancel_workflow_transitions_and_rejects_from_terminal() {
        let engine = make_engine();
        let (template, _handler) = sample_template(Arc::new(AtomicU64::new(0)));
        let name = engine.create_template(template).await.unwrap();
        let id = engine
            .execute_workflow(&name, serde_json::Map::new(), Priority::Normal)
            .await
            .unwrap();

        engine.cancel_workflow(id).await.unwrap();
        let workflow = engine.status(id).await.unwrap();
        assert_eq!(workflow.status, WorkflowStatus::Cancelled);
        assert!(engine.cancel_workflow(id).await.is_err());
    }

    #[tokio::test]
    async fn approval_stage_blocks_until_decided() {
        let counter = Arc::new(AtomicU64::new(0));
        let (mut template, handler) = sample_template(Arc::clone(&counter));
        template.stages.truncate(1);
        template.stages.push(StageTemplate {
            name: "sign_off".into(),
            stage_type: WorkflowStageType::Approval,
            conditions: vec![],
            tasks: vec![],
            retry_strategy: RetryStrategy::Immediate,
            max_retries: 0,
            timeout_ms: 60_000,
            optional: false,
        });

        let orchestrator = Orchestrator::new(
            OrchestratorConfig::default(),
            scanforge_types::model::ResourceRequirement {
                cpu_pct: 1000.0,
                memory_mb: 1_000_000,
                storage_mb: 1_000_000,
                network_mbps: 1_000_000,
                db_connections: 1000,
                api_rate: 1_000_000,
                complexity: 1.0,
                estimated_duration_minutes: 1,
            },
            Arc::new(StubDataSource),
            Arc::new(StubRules),
            Some(Arc::new(NoEstimator)),
            Arc::new(ManualClock::new()),
            Arc::new(crate::capability::NullMetricsSink),
            Arc::new(crate::capability::TracingLogSink),
        );
        let mut handlers: HashMap<String, Arc<dyn TaskHandler>> = HashMap::new();
        handlers.insert("seed".into(), handler);
        let mut config = WorkflowEngineConfig::default();
        config.approval_poll_interval = StdDuration::from_millis(5);

        let engine = WorkflowEngine::new(
            config,
            orchestrator,
            handlers,
            Arc::new(AllowAllRbac),
            Arc::new(ManualClock::new()),
            Arc::new(crate::capability::NullMetricsSink),
            Arc::new(crate::capability::TracingLogSink),
        );

        let name = engine.create_template(template).await.unwrap();
        let id = engine
            .execute_workflow(&name, serde_json::Map::new(), Priority::Normal)
            .await
            .unwrap();

        tokio::time::sleep(StdDuration::from_millis(50)).await;
        let workflow = engine.status(id).await.unwrap();
        assert_eq!(workflow.status, WorkflowStatus::Running);
        let approval_id = workflow.stages[1]
            .id;
        let _ = approval_id;

        // Find the approval request the engine created for this stage.
        let pending = {
            let pendings = engine.pending_approvals.lock().await;
            pendings.values().find(|r| r.workflow_id == id).map(|r| r.id)
        }
        .expect("approval request was not created");

        engine.approve(pending, ApprovalDecision::Approved, "alice").await.unwrap();

        let mut completed = None;
        for _ in 0..200 {
            let w = engine.status(id).await.unwrap();
            if matches!(w.status, WorkflowStatus::Completed | WorkflowStatus::Failed) {
                completed = Some(w);
                break;
            }
            tokio::time::sleep(StdDuration::from_millis(10)).await;
        }
        let completed = completed.expect("workflow did not complete after approval");
        assert_eq!(completed.status, WorkflowStatus::Completed);
    }
}
