//! `ExecutionPlan` and `Stage` — the output of the orchestrator's planning
//! step (spec §4.1).

use serde::{Deserialize, Serialize};

use crate::ids::StageId;
use crate::model::enums::{ExecutionStrategy, StageMode};
use crate::model::resource::ResourceRequirement;

/// One unit of work within an `ExecutionPlan`. Stages form a DAG via
/// `depends_on`; a `StageMode::Parallel` stage's listed `rule_ids` run
/// concurrently within it, while stages themselves run in dependency
/// order (spec §4.1 "stage execution").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage {
    pub id: StageId,
    pub name: String,
    pub mode: StageMode,
    pub rule_ids: Vec<String>,
    pub depends_on: Vec<StageId>,
    /// Fan-out cap for `StageMode::Parallel` stages; unused (and `None`)
    /// for `Sequential` stages (spec §3: "`maxConcurrency` (Parallel
    /// only)").
    pub max_concurrency: Option<u32>,
    pub requirement: ResourceRequirement,
    /// Whether a failure here fails the whole execution outright, or is
    /// eligible for the orchestrator's one-shot sequential recovery (spec
    /// §4.1 "failure semantics").
    pub critical: bool,
}

/// A complete, ordered plan built from a `ScanRequest` by one of the six
/// `ExecutionStrategy` planners (spec §4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub strategy: ExecutionStrategy,
    pub stages: Vec<Stage>,
    pub total_requirement: ResourceRequirement,
}

impl ExecutionPlan {
    /// Stages with no unsatisfied dependency, in the order they appear in
    /// `stages` (used by the workflow/stage runner to find the next
    /// runnable frontier of the DAG).
    pub fn ready_stages<'a>(&'a self, completed: &[StageId]) -> Vec<&'a Stage> {
        self.stages
            .iter()
            .filter(|s| !completed.contains(&s.id))
            .filter(|s| s.depends_on.iter().all(|dep| completed.contains(dep)))
            .collect()
    }

    /// Whether every stage id named in a `depends_on` list actually
    /// exists in `stages` (spec §8 invariant: a plan never references a
    /// stage it does not contain).
    pub fn dependencies_are_closed(&self) -> bool {
        let known: std::collections::HashSet<_> = self.stages.iter().map(|s| s.id).collect();
        self.stages
            .iter()
            .all(|s| s.depends_on.iter().all(|dep| known.contains(dep)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage(name: &str, depends_on: Vec<StageId>) -> Stage {
        Stage {
            id: StageId::new(),
            name: name.into(),
            mode: StageMode::Sequential,
            rule_ids: vec![],
            depends_on,
            max_concurrency: None,
            requirement: ResourceRequirement::ZERO,
            critical: false,
        }
    }

    #[test]
    fn ready_stages_excludes_unsatisfied_dependencies() {
        let first = stage("first", vec![]);
        let second = stage("second", vec![first.id]);
        let plan = ExecutionPlan {
            strategy: ExecutionStrategy::Sequential,
            stages: vec![first.clone(), second.clone()],
            total_requirement: ResourceRequirement::ZERO,
        };

        let ready = plan.ready_stages(&[]);
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].id, first.id);

        let ready_after_first = plan.ready_stages(&[first.id]);
        assert_eq!(ready_after_first.len(), 1);
        assert_eq!(ready_after_first[0].id, second.id);
    }

    #[test]
    fn dependencies_are_closed_detects_dangling_reference() {
        let dangling = StageId::new();
        let plan = ExecutionPlan {
            strategy: ExecutionStrategy::Sequential,
            stages: vec![stage("only", vec![dangling])],
            total_requirement: ResourceRequirement::ZERO,
        };
        assert!(!plan.dependencies_are_closed());
    }
}
