//! TOML-deserializable mirror of `scanforge_core::workflow::template`'s
//! types. The core types carry no `Deserialize` impl (templates are built
//! programmatically by every caller the core itself ships) so the CLI's
//! `workflow create` command reads this shape from disk and converts it.

use serde::Deserialize;

use scanforge_core::workflow::template::{StageTemplate, TaskTemplate, WorkflowTemplate};
use scanforge_types::model::{Condition, ConditionOperator, RetryStrategy, WorkflowStageType};

#[derive(Debug, Deserialize)]
pub struct TemplateFile {
    pub name: String,
    pub workflow_type: String,
    #[serde(default)]
    pub stage: Vec<StageDef>,
}

#[derive(Debug, Deserialize)]
pub struct StageDef {
    pub name: String,
    pub stage_type: WorkflowStageType,
    #[serde(default)]
    pub condition: Vec<ConditionDef>,
    #[serde(default)]
    pub task: Vec<TaskDef>,
    #[serde(default = "default_retry_strategy")]
    pub retry_strategy: RetryStrategy,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub optional: bool,
}

#[derive(Debug, Deserialize)]
pub struct ConditionDef {
    pub lhs_path: String,
    pub operator: ConditionOperator,
    pub rhs: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct TaskDef {
    pub name: String,
    #[serde(default)]
    pub critical: bool,
    #[serde(default = "default_retry_strategy")]
    pub retry_strategy: RetryStrategy,
    #[serde(default)]
    pub max_retries: u32,
}

fn default_retry_strategy() -> RetryStrategy {
    RetryStrategy::Immediate
}

fn default_timeout_ms() -> u64 {
    60_000
}

impl From<TemplateFile> for WorkflowTemplate {
    fn from(file: TemplateFile) -> Self {
        WorkflowTemplate {
            name: file.name,
            workflow_type: file.workflow_type,
            stages: file.stage.into_iter().map(StageTemplate::from).collect(),
        }
    }
}

impl From<StageDef> for StageTemplate {
    fn from(def: StageDef) -> Self {
        StageTemplate {
            name: def.name,
            stage_type: def.stage_type,
            conditions: def.condition.into_iter().map(Condition::from).collect(),
            tasks: def.task.into_iter().map(TaskTemplate::from).collect(),
            retry_strategy: def.retry_strategy,
            max_retries: def.max_retries,
            timeout_ms: def.timeout_ms,
            optional: def.optional,
        }
    }
}

impl From<ConditionDef> for Condition {
    fn from(def: ConditionDef) -> Self {
        Condition {
            lhs_path: def.lhs_path,
            operator: def.operator,
            rhs: def.rhs,
        }
    }
}

impl From<TaskDef> for TaskTemplate {
    fn from(def: TaskDef) -> Self {
        TaskTemplate {
            name: def.name,
            critical: def.critical,
            retry_strategy: def.retry_strategy,
            max_retries: def.max_retries,
        }
    }
}

pub fn load_template(path: &std::path::Path) -> anyhow::Result<WorkflowTemplate> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("reading {}: {e}", path.display()))?;
    let file: TemplateFile =
        toml::from_str(&contents).map_err(|e| anyhow::anyhow!("parsing {}: {e}", path.display()))?;
    Ok(file.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_minimal_template() {
        let toml = r#"
            name = "audit"
            workflow_type = "data_classification"

            [[stage]]
            name = "init"
            stage_type = "initialization"

            [[stage.task]]
            name = "seed"
            critical = true
        "#;
        let file: TemplateFile = toml::from_str(toml).unwrap();
        let template: WorkflowTemplate = file.into();
        assert_eq!(template.stages.len(), 1);
        assert_eq!(template.stages[0].tasks.len(), 1);
        assert_eq!(template.stages[0].timeout_ms, 60_000);
    }

    #[test]
    fn parses_conditions_and_explicit_overrides() {
        let toml = r#"
            name = "audit"
            workflow_type = "data_classification"

            [[stage]]
            name = "gate"
            stage_type = "custom"
            optional = true
            timeout_ms = 5000

            [[stage.condition]]
            lhs_path = "vars.score"
            operator = "greater_or_equal"
            rhs = 0.9
        "#;
        let file: TemplateFile = toml::from_str(toml).unwrap();
        let template: WorkflowTemplate = file.into();
        assert!(template.stages[0].optional);
        assert_eq!(template.stages[0].timeout_ms, 5000);
        assert_eq!(template.stages[0].conditions.len(), 1);
        assert_eq!(template.stages[0].conditions[0].operator, ConditionOperator::GreaterOrEqual);
    }
}
