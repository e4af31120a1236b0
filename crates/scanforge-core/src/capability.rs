//! Capability traits for the external collaborators the core consumes
//! (spec §6). Each is a small, object-safe, polymorphic surface;
//! concrete implementations (a real data-source catalog, a rule
//! evaluation engine, a wall clock) are supplied by the caller at
//! construction -- the core never reaches for a global singleton
//! (Design Notes: "Global mutable singletons for cache/metrics/logger:
//! pass explicit dependencies at construction").

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use scanforge_types::model::ScanRequest;

/// Metadata about a data source, used by the orchestrator's resource
/// estimation heuristics (spec §4.1).
#[derive(Debug, Clone)]
pub struct DataSourceMetadata {
    pub estimated_rows: u64,
    pub tables: Vec<String>,
    pub columns: Vec<String>,
}

/// Validates data source identifiers and returns metadata used for
/// resource estimation (spec §6: `DataSourceSvc`).
#[async_trait]
pub trait DataSourceSvc: Send + Sync {
    async fn validate(&self, data_source_id: &str) -> Result<bool>;
    async fn metadata(&self, data_source_id: &str) -> Result<DataSourceMetadata>;
}

/// Outcome of executing one rule against one request.
#[derive(Debug, Clone)]
pub struct RuleOutcome {
    pub rule_id: String,
    pub succeeded: bool,
    pub error: Option<String>,
    pub output: Value,
}

/// Validates rule identifiers and executes individual rules (spec §6:
/// `RuleSvc`).
#[async_trait]
pub trait RuleSvc: Send + Sync {
    async fn validate(&self, rule_ids: &[String]) -> Result<Vec<String>>;
    async fn execute_rule(&self, rule_id: &str, request: &ScanRequest) -> Result<RuleOutcome>;
}

/// A resource estimate as returned by an optional advisor (spec §4.1:
/// "if the estimator service returns a hint, replace base values with
/// its values but clamp to the same bounds").
#[derive(Debug, Clone, Copy)]
pub struct EstimateHint {
    pub cpu_pct: f64,
    pub memory_mb: u64,
    pub storage_mb: u64,
    pub network_mbps: u64,
    pub db_connections: u32,
    pub api_rate: u32,
    pub complexity: f64,
    pub duration_minutes: u32,
}

/// Optional resource/duration estimation advisor (spec §6:
/// `EstimatorSvc`). Returning `None` from either method is not an error
/// -- the caller falls back to the deterministic heuristic.
#[async_trait]
pub trait EstimatorSvc: Send + Sync {
    async fn estimate_resources(&self, request: &ScanRequest) -> Result<Option<EstimateHint>>;
    async fn estimate_duration(&self, request: &ScanRequest) -> Result<Option<u32>>;
}

/// Resolves the ordered approver chain for a workflow's `Approval` stage
/// (spec §6: `RBAC.ResolveApprovers`).
#[async_trait]
pub trait Rbac: Send + Sync {
    async fn resolve_approvers(
        &self,
        workflow_type: &str,
        organization_id: &str,
        current_approver_id: Option<&str>,
    ) -> Result<Vec<String>>;
}

/// Injectable source of time and suspension, so tests can drive the
/// scheduler and sweeper deterministically instead of sleeping for real
/// (spec §6: `ClockSvc`; Design Notes: "sleeps go through `ClockSvc.Sleep`
/// to keep tests deterministic").
#[async_trait]
pub trait ClockSvc: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
    async fn sleep(&self, duration: Duration);
}

/// Wall-clock implementation of [`ClockSvc`] used outside tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl ClockSvc for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Emits named, labeled numeric observations (spec §6:
/// `MetricsSink.Emit`).
pub trait MetricsSink: Send + Sync {
    fn emit(&self, name: &str, labels: &HashMap<String, String>, value: f64);
}

/// A `MetricsSink` that discards every observation. The default when no
/// sink is wired, and useful in tests that don't assert on metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullMetricsSink;

impl MetricsSink for NullMetricsSink {
    fn emit(&self, _name: &str, _labels: &HashMap<String, String>, _value: f64) {}
}

/// Structured log levels mirrored from `tracing`'s, kept here so the
/// capability surface does not force a `tracing` dependency onto
/// implementors that want to forward elsewhere (spec §6:
/// `LogSink.Log`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Receives structured log events (spec §6: `LogSink`).
pub trait LogSink: Send + Sync {
    fn log(&self, level: LogLevel, message: &str, fields: &HashMap<String, String>);
}

/// A `LogSink` that forwards to `tracing`, matching the teacher's own
/// direct use of `tracing::{info, warn, error}` at call sites. This is
/// the default sink wired by `scanforge-cli`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn log(&self, level: LogLevel, message: &str, fields: &HashMap<String, String>) {
        let fields_str = fields
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(" ");
        match level {
            LogLevel::Debug => tracing::debug!(fields = %fields_str, "{message}"),
            LogLevel::Info => tracing::info!(fields = %fields_str, "{message}"),
            LogLevel::Warn => tracing::warn!(fields = %fields_str, "{message}"),
            LogLevel::Error => tracing::error!(fields = %fields_str, "{message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn system_clock_sleeps_for_roughly_the_requested_duration() {
        let clock = SystemClock;
        let start = clock.now();
        clock.sleep(Duration::from_millis(5)).await;
        let elapsed = clock.now() - start;
        assert!(elapsed.num_milliseconds() >= 0);
    }

    #[test]
    fn null_sink_accepts_any_emission_without_panicking() {
        let sink = NullMetricsSink;
        sink.emit("scans.submitted", &HashMap::new(), 1.0);
    }
}
