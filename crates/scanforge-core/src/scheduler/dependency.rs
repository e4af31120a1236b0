//! Dependency graph: tracks which schedules are waiting on which, and
//! re-checks dependents when a dependency completes (spec §4.2
//! "Dependency resolution").

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use scanforge_types::ids::ScheduleId;
use scanforge_types::model::Priority;

/// Promotion window applied to a High/Critical dependent that becomes
/// ready when its last dependency completes (spec §4.2: "advances its
/// due time to `now + 2 min`").
const PROMOTION_WINDOW: Duration = Duration::minutes(2);

/// Tracks `scheduleId -> dependency scheduleIds` and which schedules
/// have completed, so the scheduler can cheaply answer "is this ready?"
/// without re-scanning every other schedule (spec §5: "Scheduler
/// exclusively owns ... `dependencyGraph`").
#[derive(Default)]
pub struct DependencyGraph {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    dependencies: std::collections::HashMap<ScheduleId, Vec<ScheduleId>>,
    completed: std::collections::HashSet<ScheduleId>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, schedule_id: ScheduleId, dependencies: Vec<ScheduleId>) {
        self.inner.lock().await.dependencies.insert(schedule_id, dependencies);
    }

    /// Whether every dependency of `schedule_id` has completed (spec
    /// §4.2: "ready only when every dependency is in state Completed").
    pub async fn is_ready(&self, schedule_id: ScheduleId) -> bool {
        let inner = self.inner.lock().await;
        inner
            .dependencies
            .get(&schedule_id)
            .map(|deps| deps.iter().all(|d| inner.completed.contains(d)))
            .unwrap_or(true)
    }

    /// Mark `schedule_id` completed and return the ids of dependents that
    /// just became ready as a result (spec §4.2: "re-checks its
    /// dependents"). Callers use this to decide which schedules to
    /// promote or re-enqueue.
    pub async fn mark_completed(&self, schedule_id: ScheduleId) -> Vec<ScheduleId> {
        let mut inner = self.inner.lock().await;
        inner.completed.insert(schedule_id);

        inner
            .dependencies
            .iter()
            .filter(|(_, deps)| deps.contains(&schedule_id))
            .filter(|(_, deps)| deps.iter().all(|d| inner.completed.contains(d)))
            .map(|(id, _)| *id)
            .collect()
    }

    /// The promoted `due` for a dependent that just became ready, if its
    /// priority warrants promotion (spec §4.2: "if a dependent is
    /// High/Critical and ready, advances its due time to `now + 2 min`").
    pub fn promoted_due(priority: Priority, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        matches!(priority, Priority::Critical | Priority::High).then(|| now + PROMOTION_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn schedule_with_no_dependencies_is_ready() {
        let graph = DependencyGraph::new();
        assert!(graph.is_ready(ScheduleId::new()).await);
    }

    #[tokio::test]
    async fn schedule_becomes_ready_only_once_every_dependency_completes() {
        let graph = DependencyGraph::new();
        let dependent = ScheduleId::new();
        let dep_a = ScheduleId::new();
        let dep_b = ScheduleId::new();
        graph.register(dependent, vec![dep_a, dep_b]).await;

        assert!(!graph.is_ready(dependent).await);
        graph.mark_completed(dep_a).await;
        assert!(!graph.is_ready(dependent).await);
        let newly_ready = graph.mark_completed(dep_b).await;
        assert!(graph.is_ready(dependent).await);
        assert_eq!(newly_ready, vec![dependent]);
    }

    #[test]
    fn only_high_and_critical_dependents_get_promoted() {
        let now = Utc::now();
        assert!(DependencyGraph::promoted_due(Priority::Critical, now).is_some());
        assert!(DependencyGraph::promoted_due(Priority::High, now).is_some());
        assert!(DependencyGraph::promoted_due(Priority::Normal, now).is_none());
    }
}
