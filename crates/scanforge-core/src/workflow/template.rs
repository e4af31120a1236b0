//! Workflow template definition and validation (spec §6
//! `CreateTemplate(definition) -> templateId`). A template is the
//! reusable blueprint `ExecuteWorkflow` instantiates into a concrete
//! [`scanforge_types::model::Workflow`] run.

use chrono::Utc;
use serde_json::Value;

use scanforge_types::ids::WorkflowId;
use scanforge_types::model::{
    Condition, RetryStrategy, Workflow, WorkflowStage, WorkflowStageType, WorkflowStatus,
    WorkflowTask,
};
use scanforge_types::ErrorKind;

/// Blueprint for one task within a template stage.
#[derive(Debug, Clone)]
pub struct TaskTemplate {
    pub name: String,
    pub critical: bool,
    pub retry_strategy: RetryStrategy,
    pub max_retries: u32,
}

/// Blueprint for one stage within a template.
#[derive(Debug, Clone)]
pub struct StageTemplate {
    pub name: String,
    pub stage_type: WorkflowStageType,
    pub conditions: Vec<Condition>,
    pub tasks: Vec<TaskTemplate>,
    pub retry_strategy: RetryStrategy,
    pub max_retries: u32,
    pub timeout_ms: u64,
    /// If false, this stage failing takes the whole workflow to `Failed`.
    pub optional: bool,
}

/// A named, ordered pipeline of stages (spec §4.3). Stored by the
/// engine under the name passed to `CreateTemplate`, which doubles as
/// the `templateId` (spec §3: `Workflow.template` is already a bare
/// `String`, so the template registry is keyed the same way rather than
/// introducing a parallel UUID namespace).
#[derive(Debug, Clone)]
pub struct WorkflowTemplate {
    pub name: String,
    pub workflow_type: String,
    pub stages: Vec<StageTemplate>,
}

/// Reject templates that could never run: no stages, duplicate stage
/// names (conditions address stages by name), or a stage timeout of
/// zero (spec §4.3 edge cases are silent here; an unbounded-wait stage
/// would defeat the workflow-level timeout sweep).
pub fn validate_template(template: &WorkflowTemplate) -> Result<(), ErrorKind> {
    if template.name.trim().is_empty() {
        return Err(ErrorKind::InvalidRequest("template name must not be empty".into()));
    }
    if template.stages.is_empty() {
        return Err(ErrorKind::InvalidRequest(format!(
            "template {} must declare at least one stage",
            template.name
        )));
    }
    let mut seen = std::collections::HashSet::new();
    for stage in &template.stages {
        if !seen.insert(stage.name.as_str()) {
            return Err(ErrorKind::InvalidRequest(format!(
                "duplicate stage name {} in template {}",
                stage.name, template.name
            )));
        }
        if stage.timeout_ms == 0 {
            return Err(ErrorKind::InvalidRequest(format!(
                "stage {} must carry a non-zero timeout", stage.name
            )));
        }
    }
    Ok(())
}

/// Instantiate `template` into a fresh [`Workflow`], queued and ready
/// for the engine's dispatch loop to pick up (spec §6 `ExecuteWorkflow`).
pub fn instantiate(
    template: &WorkflowTemplate,
    params: serde_json::Map<String, Value>,
    priority: scanforge_types::model::Priority,
    workflow_timeout_hours: i64,
) -> Workflow {
    let now = Utc::now();
    let stages = template
        .stages
        .iter()
        .map(|stage_template| WorkflowStage {
            id: scanforge_types::ids::WorkflowStageId::new(),
            name: stage_template.name.clone(),
            stage_type: stage_template.stage_type,
            status: scanforge_types::model::WorkflowStageStatus::Pending,
            conditions: stage_template.conditions.clone(),
            tasks: stage_template
                .tasks
                .iter()
                .map(|t| WorkflowTask::new(t.name.clone(), t.critical, t.retry_strategy, t.max_retries))
                .collect(),
            retry_strategy: stage_template.retry_strategy,
            max_retries: stage_template.max_retries,
            retry_count: 0,
            timeout_ms: stage_template.timeout_ms,
            optional: stage_template.optional,
            started_at: None,
            completed_at: None,
            output: serde_json::Map::new(),
        })
        .collect();

    Workflow {
        id: WorkflowId::new(),
        execution_id: None,
        template: template.name.clone(),
        status: WorkflowStatus::Queued,
        priority,
        params,
        vars: serde_json::Map::new(),
        stages,
        created_at: now,
        started_at: None,
        completed_at: None,
        timeout_at: now + chrono::Duration::hours(workflow_timeout_hours),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> WorkflowTemplate {
        WorkflowTemplate {
            name: "data_classification".into(),
            workflow_type: "data_classification".into(),
            stages: vec![StageTemplate {
                name: "init".into(),
                stage_type: WorkflowStageType::Initialization,
                conditions: vec![],
                tasks: vec![TaskTemplate {
                    name: "setup".into(),
                    critical: true,
                    retry_strategy: RetryStrategy::Fixed,
                    max_retries: 2,
                }],
                retry_strategy: RetryStrategy::Fixed,
                max_retries: 0,
                timeout_ms: 60_000,
                optional: false,
            }],
        }
    }

    #[test]
    fn empty_stage_list_is_rejected() {
        let mut t = sample();
        t.stages.clear();
        assert!(validate_template(&t).is_err());
    }

    #[test]
    fn duplicate_stage_names_are_rejected() {
        let mut t = sample();
        t.stages.push(t.stages[0].clone());
        assert!(validate_template(&t).is_err());
    }

    #[test]
    fn well_formed_template_validates() {
        assert!(validate_template(&sample()).is_ok());
    }

    #[test]
    fn instantiate_builds_pending_stages_with_tasks() {
        let template = sample();
        let workflow = instantiate(
            &template,
            serde_json::Map::new(),
            scanforge_types::model::Priority::Normal,
            24,
        );
        assert_eq!(workflow.stages.len(), 1);
        assert_eq!(workflow.stages[0].tasks.len(), 1);
        assert_eq!(
            workflow.stages[0].status,
            scanforge_types::model::WorkflowStageStatus::Pending
        );
        assert!(workflow.timeout_at > workflow.created_at);
    }
}
