//! `Workflow` and `WorkflowStage` — the declarative stage pipeline run
//! after an execution's scan completes (spec §4.3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{ApprovalId, ExecutionId, WorkflowId, WorkflowStageId};
use crate::model::enums::{
    ApprovalDecision, ConditionOperator, Priority, RetryStrategy, WorkflowStageStatus,
    WorkflowStageType, WorkflowStatus,
};

/// A single `lhs <op> rhs` predicate gating whether a stage runs (spec
/// §4.3 "condition evaluation"). `lhs` names a dotted path into the
/// workflow's accumulated context (e.g. `"stages.analysis.findings_count"`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    pub lhs_path: String,
    pub operator: ConditionOperator,
    pub rhs: Value,
}

/// One unit of work inside a `WorkflowStage`. Stages run as an ordered
/// list of tasks (spec §3: `WorkflowStage.tasks[]`); each task carries
/// its own retry policy rather than inheriting the stage's (spec §4.3:
/// "Retry strategy per task: {Immediate, Fixed, ExponentialBackoff,
/// Jittered}"). A `critical` task's exhausted retries fail the whole
/// stage; a non-critical one just leaves its slot empty in `output`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowTask {
    pub name: String,
    pub critical: bool,
    pub retry_strategy: RetryStrategy,
    pub max_retries: u32,
    pub retry_count: u32,
    pub status: WorkflowStageStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub output: serde_json::Map<String, Value>,
}

impl WorkflowTask {
    pub fn new(name: impl Into<String>, critical: bool, retry_strategy: RetryStrategy, max_retries: u32) -> Self {
        Self {
            name: name.into(),
            critical,
            retry_strategy,
            max_retries,
            retry_count: 0,
            status: WorkflowStageStatus::Pending,
            started_at: None,
            completed_at: None,
            output: serde_json::Map::new(),
        }
    }

    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }
}

/// One stage in a `Workflow`'s pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStage {
    pub id: WorkflowStageId,
    pub name: String,
    pub stage_type: WorkflowStageType,
    pub status: WorkflowStageStatus,
    /// All conditions must hold for the stage to run; an empty list means
    /// unconditional (spec §4.3 edge case: no conditions = always runs).
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Ordered units of work the stage executes. A stage with no tasks
    /// runs as a single implicit body, governed by the stage-level
    /// retry fields below.
    #[serde(default)]
    pub tasks: Vec<WorkflowTask>,
    pub retry_strategy: RetryStrategy,
    pub max_retries: u32,
    pub retry_count: u32,
    pub timeout_ms: u64,
    /// Whether the workflow may continue past this stage's failure. A
    /// `false` (non-optional) stage failing takes the whole workflow to
    /// `Failed`; a `true` stage failing just marks the stage and moves on.
    #[serde(default)]
    pub optional: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Output the stage contributed to the workflow's shared context,
    /// addressable by later conditions as `"stages.<name>.<key>"`.
    #[serde(default)]
    pub output: serde_json::Map<String, Value>,
}

impl WorkflowStage {
    /// Whether every critical task in the stage (if any) completed.
    /// A stage with no tasks is judged solely on its own status.
    pub fn critical_tasks_completed(&self) -> bool {
        self.tasks
            .iter()
            .filter(|t| t.critical)
            .all(|t| t.status == WorkflowStageStatus::Completed)
    }
}

/// A pending human decision blocking an `Approval`-type stage (spec
/// §4.3 "approvals").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: ApprovalId,
    pub workflow_id: WorkflowId,
    pub stage_id: WorkflowStageId,
    /// Role hierarchy this approval escalates through on timeout, most
    /// junior first (spec §4.3; see
    /// `scanforge_core::workflow::approval` for the table this is drawn
    /// from).
    pub escalation_chain: Vec<String>,
    pub current_escalation_index: usize,
    pub requested_at: DateTime<Utc>,
    pub timeout_at: DateTime<Utc>,
    pub decision: Option<ApprovalDecision>,
    pub decided_by: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
}

impl ApprovalRequest {
    /// Escalate to the next role in the chain. Returns `false` (no
    /// change) if already at the last entry -- the caller (workflow
    /// engine) treats that as `ApprovalTimeout` with no further
    /// escalation target.
    pub fn escalate(&mut self) -> bool {
        if self.current_escalation_index + 1 >= self.escalation_chain.len() {
            return false;
        }
        self.current_escalation_index += 1;
        true
    }

    pub fn current_approver_role(&self) -> Option<&str> {
        self.escalation_chain
            .get(self.current_escalation_index)
            .map(String::as_str)
    }
}

/// The workflow run itself: an ordered pipeline of `WorkflowStage`s
/// triggered after a scan `Execution` completes (spec §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    /// Set once a stage submits a scan and the orchestrator admits it;
    /// `None` for a freshly queued workflow whose stages have not yet
    /// run (spec §3: `Workflow` is keyed by `templateId`, not by a scan,
    /// so the execution reference is optional rather than primary).
    pub execution_id: Option<ExecutionId>,
    pub template: String,
    pub status: WorkflowStatus,
    pub priority: Priority,
    /// Caller-supplied instantiation parameters (spec §3: `params`),
    /// immutable for the life of the workflow.
    #[serde(default)]
    pub params: serde_json::Map<String, Value>,
    /// Accumulated variable/output context later stages' conditions
    /// address by dotted path (spec §3: `vars`; spec §4.3 "condition
    /// evaluation").
    #[serde(default)]
    pub vars: serde_json::Map<String, Value>,
    pub stages: Vec<WorkflowStage>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub timeout_at: DateTime<Utc>,
}

impl Workflow {
    /// Transition table for the workflow state machine (spec §4.3):
    /// `Queued -> Running -> (Completed|Failed|Cancelled|TimedOut)`, with
    /// `Cancelled` and `TimedOut` reachable from `Running` only (a
    /// workflow that never started cannot time out).
    pub fn is_valid_transition(from: WorkflowStatus, to: WorkflowStatus) -> bool {
        use WorkflowStatus::*;
        matches!(
            (from, to),
            (Queued, Running)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
                | (Running, TimedOut)
                | (Queued, Cancelled)
        )
    }

    pub fn stage(&self, id: WorkflowStageId) -> Option<&WorkflowStage> {
        self.stages.iter().find(|s| s.id == id)
    }
}
