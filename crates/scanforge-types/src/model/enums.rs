//! Enumerations shared across the data model (spec §3).
//!
//! String conversion (`Display`/`FromStr`) is derived via `strum` rather
//! than hand-written, since every enum below needs the same
//! "snake_case on the wire, human-readable in logs and CLI flags"
//! treatment. `serde` derives keep JSON round-tripping in the same case.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Scan depth requested for a `ScanRequest`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ScanType {
    Full,
    Deep,
    Incremental,
}

/// Request priority. Ordering follows the numeric `priority_value` used by
/// the scheduler's min-heap (spec §4.2): Critical sorts first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Priority {
    Critical,
    High,
    Normal,
    Low,
    Background,
}

impl Priority {
    /// The numeric weight used as the primary key of the scheduler's
    /// min-heap: `{Critical:1, High:2, Normal:3, Low:4, Background:5}`.
    pub fn priority_value(self) -> u8 {
        match self {
            Priority::Critical => 1,
            Priority::High => 2,
            Priority::Normal => 3,
            Priority::Low => 4,
            Priority::Background => 5,
        }
    }
}

/// Execution mode of a `Stage` within an `ExecutionPlan`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StageMode {
    Sequential,
    Parallel,
}

/// Strategy used to build an `ExecutionPlan` from a `ScanRequest` (spec
/// §4.1, "Execution-plan strategies").
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ExecutionStrategy {
    Sequential,
    Parallel,
    Adaptive,
    Intelligent,
    PriorityBased,
    ResourceOptimized,
}

/// Execution state machine (spec §4.1).
///
/// ```text
/// Pending -> Initializing -> Running -> Completed
///                         \          \-> Failed
///                          \-> Cancelled (from any non-terminal state)
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Initializing,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    /// Whether this status is one of the three terminal states.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }
}

/// Placement strategy a `Schedule` uses to compute its `due` time (spec
/// §4.2).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SchedulingStrategy {
    Immediate,
    OptimalTime,
    ResourceBased,
    DependencyAware,
    Predictive,
    Adaptive,
    BusinessHours,
    OffPeak,
}

/// Schedule lifecycle (spec §3): `Pending -> Scheduled -> Running ->
/// (Completed|Failed|Rescheduled)`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ScheduleStatus {
    Pending,
    Scheduled,
    Running,
    Completed,
    Failed,
    Rescheduled,
}

/// Workflow lifecycle (spec §3): `Queued -> Running ->
/// (Completed|Failed|Cancelled|TimedOut)`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WorkflowStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
    TimedOut,
}

/// Workflow stage lifecycle (spec §3): `Pending -> Running ->
/// (Completed|Failed|Skipped|TimedOut)`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WorkflowStageStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
    TimedOut,
}

/// Declarative stage types a `WorkflowStage` may carry (spec §4.3).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WorkflowStageType {
    Initialization,
    Validation,
    Processing,
    Analysis,
    Reporting,
    Approval,
    Notification,
    Cleanup,
    Custom,
}

/// Comparison operator for a workflow `Condition` (spec §4.3).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    #[strum(serialize = "greater_than")]
    #[serde(rename = "greater_than")]
    GreaterThan,
    #[strum(serialize = "less_than")]
    #[serde(rename = "less_than")]
    LessThan,
    #[strum(serialize = "greater_or_equal")]
    #[serde(rename = "greater_or_equal")]
    GreaterOrEqual,
    #[strum(serialize = "less_or_equal")]
    #[serde(rename = "less_or_equal")]
    LessOrEqual,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    RegexMatch,
    InList,
}

/// Per-task retry strategy within a workflow stage (spec §4.3).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RetryStrategy {
    Immediate,
    Fixed,
    ExponentialBackoff,
    Jittered,
}

/// Outcome decision for an `Approval` workflow stage.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ApprovalDecision {
    Approved,
    Rejected,
}
