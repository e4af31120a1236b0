//! Approval stages: request creation, escalation on timeout, and
//! auto-approval (spec §4.3 "Approvals").

use chrono::{DateTime, Duration, Utc};

use scanforge_types::ids::{ApprovalId, ExecutionId, WorkflowId, WorkflowStageId};
use scanforge_types::model::{ApprovalDecision, ApprovalRequest};

/// Default time an approval waits for a decision before escalating
/// (spec §4.3: "`timeoutHours` (default 72)").
pub const DEFAULT_TIMEOUT_HOURS: i64 = 72;

/// A request auto-approves when its carried score meets this threshold
/// (spec §4.3: "if an auto-approval score ≥ 0.9 is present, auto-approve").
pub const AUTO_APPROVAL_THRESHOLD: f64 = 0.9;

/// Role hierarchy an approval escalates through, most junior first (spec
/// §4.3, worked example: `data_classification -> data_analyst ->
/// data_steward -> data_governance_manager -> CIO`). Unrecognized
/// workflow types fall back to a generic three-role chain -- spec.md
/// names this one example explicitly and leaves the general rule as an
/// open question; see `DESIGN.md`.
pub fn escalation_chain_for(workflow_type: &str) -> Vec<String> {
    match workflow_type {
        "data_classification" => vec![
            "data_analyst".into(),
            "data_steward".into(),
            "data_governance_manager".into(),
            "CIO".into(),
        ],
        _ => vec!["requester".into(), "manager".into(), "director".into()],
    }
}

/// Build a fresh `ApprovalRequest` for `workflow_type`, starting at the
/// first role in its escalation chain.
pub fn new_request(
    workflow_id: WorkflowId,
    stage_id: WorkflowStageId,
    workflow_type: &str,
    now: DateTime<Utc>,
    timeout_hours: i64,
) -> ApprovalRequest {
    ApprovalRequest {
        id: ApprovalId::new(),
        workflow_id,
        stage_id,
        escalation_chain: escalation_chain_for(workflow_type),
        current_escalation_index: 0,
        requested_at: now,
        timeout_at: now + Duration::hours(timeout_hours),
        decision: None,
        decided_by: None,
        decided_at: None,
    }
}

/// If `score` (an optional advisor-supplied confidence) clears
/// `threshold`, apply an `Approved` decision immediately.
pub fn maybe_auto_approve(
    request: &mut ApprovalRequest,
    score: Option<f64>,
    now: DateTime<Utc>,
    threshold: f64,
) -> bool {
    let Some(score) = score else { return false };
    if score < threshold {
        return false;
    }
    request.decision = Some(ApprovalDecision::Approved);
    request.decided_by = Some("auto-approval".into());
    request.decided_at = Some(now);
    true
}

/// Outcome of a timeout check against `request`.
pub enum TimeoutOutcome {
    /// Not yet timed out.
    StillWaiting,
    /// Timed out, escalated to the next role in the chain.
    Escalated,
    /// Timed out with no further escalation target (spec §7
    /// `ApprovalTimeout`).
    Exhausted { execution_id: ExecutionId },
}

/// Check `request` against `now` and escalate if its timeout has
/// elapsed (spec §4.3: "On timeout, escalate to the next approver up a
/// role hierarchy").
pub fn check_timeout(request: &mut ApprovalRequest, execution_id: ExecutionId, now: DateTime<Utc>) -> TimeoutOutcome {
    if now < request.timeout_at {
        return TimeoutOutcome::StillWaiting;
    }
    if request.escalate() {
        TimeoutOutcome::Escalated
    } else {
        TimeoutOutcome::Exhausted { execution_id }
    }
}
