//! `ScanRequest` — the admission-time input to the orchestrator (spec §3,
//! §4.1).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ScanRequestId, ScheduleId};
use crate::model::enums::{Priority, ScanType};

/// A request to scan a data source, as submitted to `Submit` or embedded
/// in a `Schedule`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRequest {
    pub id: ScanRequestId,
    pub data_source_id: String,
    pub scan_type: ScanType,
    pub priority: Priority,
    /// Rule set identifiers to run against the data source, in order.
    /// Validated against `RuleSvc` at admission time; an unknown id is an
    /// `InvalidRequest`. Must be non-empty (spec §8 boundary: `|rules| =
    /// 0` is `InvalidRequest`).
    pub rule_ids: Vec<String>,
    pub timeout_ms: u64,
    pub max_attempts: u32,
    /// Opaque scan-specific parameters (depth limits, sampling rate,
    /// included/excluded paths, ...). Not interpreted by the orchestrator
    /// itself -- forwarded verbatim to `DataSourceSvc`.
    #[serde(default)]
    pub params: HashMap<String, serde_json::Value>,
    /// Free-form labels used for filtering status queries and metrics
    /// breakdowns.
    #[serde(default)]
    pub tags: std::collections::HashSet<String>,
    /// Requester identity, opaque to the orchestrator; consulted by `Rbac`
    /// and recorded on the resulting `Execution`/`Schedule`/`Workflow`.
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    /// At most one of `scheduled_time`/`cron` is set (spec §3 invariant:
    /// "exactly one of `{scheduledTime, cron, nil}` is set").
    pub scheduled_time: Option<DateTime<Utc>>,
    pub cron: Option<String>,
    /// Other schedules this request's placement depends on.
    #[serde(default)]
    pub dependencies: std::collections::HashSet<ScheduleId>,
}

impl ScanRequest {
    /// True when `params`/`tags` are empty and `rule_ids` carries exactly
    /// one entry -- the minimal legal request shape (spec §8 boundary:
    /// empty-but-present collections round-trip as empty, not absent;
    /// `rule_ids` itself must be non-empty per the data-model invariant).
    pub fn is_minimal(&self) -> bool {
        self.rule_ids.len() == 1 && self.params.is_empty() && self.tags.is_empty()
    }

    /// Spec §3 invariants: non-empty rule set, `createdAt <=
    /// scheduledTime` when both present, and at most one of
    /// `{scheduledTime, cron}` set.
    pub fn is_well_formed(&self) -> bool {
        if self.rule_ids.is_empty() {
            return false;
        }
        if self.scheduled_time.is_some() && self.cron.is_some() {
            return false;
        }
        if let Some(scheduled) = self.scheduled_time {
            if self.created_at > scheduled {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ScanRequest {
        ScanRequest {
            id: ScanRequestId::new(),
            data_source_id: "ds-1".into(),
            scan_type: ScanType::Full,
            priority: Priority::Normal,
            rule_ids: vec!["pii-detect".into()],
            timeout_ms: 60_000,
            max_attempts: 3,
            params: HashMap::new(),
            tags: Default::default(),
            created_by: "alice".into(),
            created_at: Utc::now(),
            scheduled_time: None,
            cron: None,
            dependencies: Default::default(),
        }
    }

    #[test]
    fn minimal_request_has_empty_collections_and_one_rule() {
        assert!(sample().is_minimal());
    }

    #[test]
    fn empty_rule_ids_is_not_well_formed() {
        let mut req = sample();
        req.rule_ids.clear();
        assert!(!req.is_well_formed());
    }

    #[test]
    fn scheduled_time_and_cron_together_is_not_well_formed() {
        let mut req = sample();
        req.scheduled_time = Some(Utc::now());
        req.cron = Some("*/15 * * * *".into());
        assert!(!req.is_well_formed());
    }

    #[test]
    fn created_at_after_scheduled_time_is_not_well_formed() {
        let mut req = sample();
        req.created_at = Utc::now();
        req.scheduled_time = Some(req.created_at - chrono::Duration::hours(1));
        assert!(!req.is_well_formed());
    }

    #[test]
    fn serde_roundtrip_preserves_empty_collections() {
        let req = sample();
        let json = serde_json::to_string(&req).unwrap();
        let back: ScanRequest = serde_json::from_str(&json).unwrap();
        assert!(back.params.is_empty());
        assert!(back.tags.is_empty());
    }
}
