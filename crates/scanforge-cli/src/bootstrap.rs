//! Wires one in-process `Orchestrator` + `Scheduler` + `WorkflowEngine`
//! triple from a [`ScanforgeConfig`], using the demo capability stand-ins
//! (spec §1 Non-goals put real data-source/rule/RBAC connectors out of
//! scope for the core itself). Every CLI invocation builds a fresh stack
//! -- there is no persisted state to reattach to (see `DESIGN.md`,
//! "Persistence stance").

use std::collections::HashMap;
use std::sync::Arc;

use scanforge_core::capability::{NullMetricsSink, SystemClock, TracingLogSink};
use scanforge_core::orchestrator::{Orchestrator, OrchestratorConfig};
use scanforge_core::scheduler::placement::PlacementConfig;
use scanforge_core::scheduler::Scheduler;
use scanforge_core::workflow::{WorkflowEngine, WorkflowEngineConfig};
use scanforge_types::model::ResourceRequirement;

use crate::capability_stubs::{load_catalog, DemoDataSourceSvc, DemoRbac, DemoRuleSvc};
use crate::config::ScanforgeConfig;

/// A reasonably generous single-node capacity for demo purposes. A real
/// deployment would source this from the host's actual resources; spec §1
/// puts infrastructure capacity planning out of scope for the core.
fn demo_capacity() -> ResourceRequirement {
    ResourceRequirement {
        cpu_pct: 3200.0,
        memory_mb: 131_072,
        storage_mb: 2_097_152,
        network_mbps: 10_000,
        db_connections: 200,
        api_rate: 50_000,
        complexity: 100.0,
        estimated_duration_minutes: 0,
    }
}

pub struct Stack {
    pub orchestrator: Arc<Orchestrator>,
    pub scheduler: Arc<Scheduler>,
    pub workflow_engine: Arc<WorkflowEngine>,
}

pub fn build(config: &ScanforgeConfig, catalog_path: &std::path::Path) -> anyhow::Result<Stack> {
    let catalog = load_catalog(catalog_path)?;

    let orchestrator_config = OrchestratorConfig {
        max_concurrent_executions: config.max_concurrent_scans,
        max_queue_size: config.max_queue_size,
        safety_margin: config.safety_margin,
        allocation_grace: chrono::Duration::minutes(5),
        resource_sweep_interval: std::time::Duration::from_secs(config.resource_monitoring_interval_secs),
        admission_poll_interval: std::time::Duration::from_millis(200),
    };

    let orchestrator = Orchestrator::new(
        orchestrator_config,
        demo_capacity(),
        Arc::new(DemoDataSourceSvc::new(catalog)),
        Arc::new(DemoRuleSvc),
        None,
        Arc::new(SystemClock),
        Arc::new(NullMetricsSink),
        Arc::new(TracingLogSink),
    );

    let scheduler = Scheduler::with_placement_config(
        Arc::clone(&orchestrator),
        Arc::new(SystemClock),
        PlacementConfig {
            business_start_hour: config.business_hours_start,
            business_end_hour: config.business_hours_end,
            peak_start_hour: config.peak_hours_start,
            peak_end_hour: config.peak_hours_end,
            maintenance_start_hour: config.maintenance_window_start,
            maintenance_end_hour: config.maintenance_window_end,
        },
    );

    let workflow_engine = WorkflowEngine::new(
        WorkflowEngineConfig {
            default_workflow_timeout_hours: config.workflow_timeout_hours,
            approval_poll_interval: std::time::Duration::from_secs(5),
            scan_poll_interval: std::time::Duration::from_millis(200),
            approval_timeout_hours: config.approval_timeout_hours,
            auto_approval_threshold: config.auto_approval_threshold,
        },
        Arc::clone(&orchestrator),
        HashMap::new(),
        Arc::new(DemoRbac),
        Arc::new(SystemClock),
        Arc::new(NullMetricsSink),
        Arc::new(TracingLogSink),
    );

    Ok(Stack {
        orchestrator,
        scheduler,
        workflow_engine,
    })
}
