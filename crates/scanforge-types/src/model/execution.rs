//! `Execution` — the orchestrator's live, stateful record of a running or
//! completed scan (spec §3, §4.1).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ExecutionId, ScanRequestId, StageId};
use crate::model::enums::ExecutionStatus;
use crate::model::plan::ExecutionPlan;
use crate::model::resource::ResourceRequirement;

/// Outcome recorded for one completed stage, kept on `Execution` for
/// status queries and for the one-shot sequential recovery path (spec
/// §4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    pub stage_id: StageId,
    pub succeeded: bool,
    pub rule_errors: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

/// The orchestrator's versioned, in-memory record of one admitted scan
/// request (spec §4.1's state machine). `version` is bumped on every
/// transition and used for optimistic-lock-style guarded updates, the
/// same discipline the execution table and priority queue both rely on
/// (spec §5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub id: ExecutionId,
    pub request_id: ScanRequestId,
    pub status: ExecutionStatus,
    pub worker_id: Option<String>,
    pub plan: ExecutionPlan,
    pub allocated: ResourceRequirement,
    /// Monotonically non-decreasing until a terminal state is reached
    /// (spec §3, §8 invariant 6): 0.1 after connection validation, 0.2
    /// after rule preparation, 0.4 after discovery, 0.6 after analysis,
    /// 0.8 after rule application, 0.9 after results processing, 1.0 on
    /// completion.
    pub progress: f64,
    pub current_step: String,
    pub stage_results: Vec<StageResult>,
    pub attempts: u32,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Set on the one terminal transition that produced it; `None` while
    /// running or on success.
    pub failure_reason: Option<String>,
    #[serde(default)]
    pub metrics: HashMap<String, f64>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

/// Named progress checkpoints (spec §3, §4.1). `set_progress` refuses to
/// move `progress`/`current_step` backward on a non-terminal execution
/// (spec §8 invariant 6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProgressStep {
    ConnectionValidated,
    RulesPrepared,
    DiscoveryComplete,
    AnalysisComplete,
    RulesApplied,
    ResultsProcessed,
    Completed,
}

impl ProgressStep {
    pub fn fraction(self) -> f64 {
        match self {
            ProgressStep::ConnectionValidated => 0.1,
            ProgressStep::RulesPrepared => 0.2,
            ProgressStep::DiscoveryComplete => 0.4,
            ProgressStep::AnalysisComplete => 0.6,
            ProgressStep::RulesApplied => 0.8,
            ProgressStep::ResultsProcessed => 0.9,
            ProgressStep::Completed => 1.0,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ProgressStep::ConnectionValidated => "connection_validated",
            ProgressStep::RulesPrepared => "rules_prepared",
            ProgressStep::DiscoveryComplete => "discovery_complete",
            ProgressStep::AnalysisComplete => "analysis_complete",
            ProgressStep::RulesApplied => "rules_applied",
            ProgressStep::ResultsProcessed => "results_processed",
            ProgressStep::Completed => "completed",
        }
    }
}

impl Execution {
    /// Transition table for the execution state machine (spec §4.1).
    /// `Cancelled` is reachable from any non-terminal state; every other
    /// edge is the single forward path through the machine.
    pub fn is_valid_transition(from: ExecutionStatus, to: ExecutionStatus) -> bool {
        use ExecutionStatus::*;
        if to == Cancelled {
            return !from.is_terminal();
        }
        matches!(
            (from, to),
            (Pending, Initializing)
                | (Initializing, Running)
                | (Running, Completed)
                | (Running, Failed)
        )
    }

    /// Apply a transition, bumping `version`. Returns `false` (and leaves
    /// `self` unchanged) if the transition is not legal -- callers treat
    /// that as a conflicting concurrent update, matching the optimistic
    /// lock pattern used elsewhere in the core.
    pub fn transition(&mut self, to: ExecutionStatus, now: DateTime<Utc>) -> bool {
        if !Self::is_valid_transition(self.status, to) {
            return false;
        }
        match to {
            ExecutionStatus::Initializing => {}
            ExecutionStatus::Running => self.started_at = Some(now),
            ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Cancelled => {
                self.completed_at = Some(now);
            }
            ExecutionStatus::Pending => {}
        }
        self.status = to;
        self.version += 1;
        true
    }

    /// Advance to `step`, bumping `version`. No-op (returns `false`) if
    /// `step`'s fraction would move `progress` backward -- progress is
    /// monotonic for the lifetime of a non-terminal execution (spec §8
    /// invariant 6).
    pub fn advance_progress(&mut self, step: ProgressStep) -> bool {
        if step.fraction() < self.progress {
            return false;
        }
        self.progress = step.fraction();
        self.current_step = step.label().to_string();
        self.version += 1;
        true
    }
}
