//! `Schedule` — a scan request placed on the scheduler's timeline (spec
//! §3, §4.2).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::ScheduleId;
use crate::model::enums::ScheduleStatus;
use crate::model::enums::SchedulingStrategy;
use crate::model::scan_request::ScanRequest;

/// A scan request the scheduler has placed on its timeline, either a
/// one-shot `due` time or a recurring cron expression (spec §4.2
/// "recurrence").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub id: ScheduleId,
    pub request: ScanRequest,
    pub strategy: SchedulingStrategy,
    pub status: ScheduleStatus,
    /// Other schedules that must reach `Completed` before this one is
    /// placed on the ready queue (spec §4.2 "dependency resolution").
    pub dependencies: Vec<ScheduleId>,
    pub due: DateTime<Utc>,
    /// Present for recurring schedules; `next_run_at` is recomputed from
    /// this expression each time the schedule completes (spec §4.2
    /// `nextCronFire`).
    pub cron: Option<String>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub attempts: u32,
    pub max_attempts: u32,
    pub created_at: DateTime<Utc>,
}

impl Schedule {
    /// Whether every dependency named in `dependencies` has reached
    /// `Completed` in `completed`, per spec §4.2's dependency-resolution
    /// rule.
    pub fn dependencies_satisfied(&self, completed: &[ScheduleId]) -> bool {
        self.dependencies.iter().all(|dep| completed.contains(dep))
    }

    /// Whether another retry attempt is permitted.
    pub fn can_retry(&self) -> bool {
        self.attempts < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::ScanRequestId;
    use crate::model::enums::{Priority, ScanType};
    use std::collections::HashMap;

    fn sample_request() -> ScanRequest {
        ScanRequest {
            id: ScanRequestId::new(),
            data_source_id: "ds".into(),
            scan_type: ScanType::Full,
            priority: Priority::Normal,
            rule_ids: vec!["rule-1".into()],
            timeout_ms: 60_000,
            max_attempts: 3,
            params: HashMap::new(),
            tags: Default::default(),
            created_by: "svc".into(),
            created_at: Utc::now(),
            scheduled_time: None,
            cron: None,
            dependencies: Default::default(),
        }
    }

    fn sample_schedule(dependencies: Vec<ScheduleId>) -> Schedule {
        Schedule {
            id: ScheduleId::new(),
            request: sample_request(),
            strategy: SchedulingStrategy::Immediate,
            status: ScheduleStatus::Pending,
            dependencies,
            due: Utc::now(),
            cron: None,
            last_run_at: None,
            next_run_at: None,
            attempts: 0,
            max_attempts: 3,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn dependencies_satisfied_requires_all_listed_ids() {
        let dep_a = ScheduleId::new();
        let dep_b = ScheduleId::new();
        let schedule = sample_schedule(vec![dep_a, dep_b]);

        assert!(!schedule.dependencies_satisfied(&[dep_a]));
        assert!(schedule.dependencies_satisfied(&[dep_a, dep_b]));
    }

    #[test]
    fn can_retry_respects_max_attempts() {
        let mut schedule = sample_schedule(vec![]);
        schedule.status = ScheduleStatus::Failed;
        schedule.attempts = 2;
        schedule.max_attempts = 2;
        assert!(!schedule.can_retry());
        schedule.max_attempts = 3;
        assert!(schedule.can_retry());
    }
}
