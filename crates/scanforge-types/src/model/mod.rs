//! The domain model (spec §3): requests, plans, executions, schedules,
//! and workflows, plus the enumerations shared across them.

pub mod enums;
pub mod execution;
pub mod plan;
pub mod resource;
pub mod scan_request;
pub mod schedule;
pub mod workflow;

pub use enums::{
    ApprovalDecision, ConditionOperator, ExecutionStatus, ExecutionStrategy, Priority,
    RetryStrategy, ScanType, ScheduleStatus, SchedulingStrategy, StageMode, WorkflowStageStatus,
    WorkflowStageType, WorkflowStatus,
};
pub use execution::{Execution, ProgressStep, StageResult};
pub use plan::{ExecutionPlan, Stage};
pub use resource::{ResourceAllocation, ResourceRequirement};
pub use scan_request::ScanRequest;
pub use schedule::Schedule;
pub use workflow::{ApprovalRequest, Condition, Workflow, WorkflowStage, WorkflowTask};
