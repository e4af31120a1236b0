//! Cross-component integration tests exercising the orchestrator and
//! scheduler together through `scanforge-test-utils` fakes, covering a
//! representative subset of spec.md §8's concrete end-to-end scenarios.
//! Unit tests colocated with each module cover the rest of §8's boundary
//! behaviors; these tests check that the pieces compose correctly.

use std::sync::Arc;
use std::time::Duration;

use scanforge_core::capability::{DataSourceMetadata, NullMetricsSink, SystemClock, TracingLogSink};
use scanforge_core::orchestrator::{Orchestrator, OrchestratorConfig};
use scanforge_core::scheduler::Scheduler;
use scanforge_types::model::{ExecutionStatus, ExecutionStrategy, Priority, ResourceRequirement, SchedulingStrategy};

use scanforge_test_utils::{sample_scan_request, NoHintEstimatorSvc, StubDataSourceSvc, StubRuleSvc};

fn ample_capacity() -> ResourceRequirement {
    ResourceRequirement {
        cpu_pct: 1000.0,
        memory_mb: 1_000_000,
        storage_mb: 1_000_000,
        network_mbps: 1_000_000,
        db_connections: 1000,
        api_rate: 1_000_000,
        complexity: 1.0,
        estimated_duration_minutes: 1,
    }
}

fn test_orchestrator(capacity: ResourceRequirement) -> Arc<Orchestrator> {
    Orchestrator::new(
        OrchestratorConfig::default(),
        capacity,
        Arc::new(
            StubDataSourceSvc::new().with_source(
                "warehouse-primary",
                DataSourceMetadata {
                    estimated_rows: 50_000,
                    tables: vec!["customers".into(), "orders".into()],
                    columns: vec!["id".into(), "name".into()],
                },
            ),
        ),
        Arc::new(StubRuleSvc::new()),
        Some(Arc::new(NoHintEstimatorSvc)),
        Arc::new(SystemClock),
        Arc::new(NullMetricsSink),
        Arc::new(TracingLogSink),
    )
}

/// Spec §8 scenario 1: an empty pool admits a multi-rule request
/// immediately and it runs to completion under `Parallel`.
#[tokio::test]
async fn immediate_admission_runs_a_parallel_request_to_completion() {
    let orchestrator = test_orchestrator(ample_capacity());
    let mut request = sample_scan_request();
    request.rule_ids = (0..5).map(|i| format!("rule-{i}")).collect();

    let execution_id = orchestrator
        .submit(request, ExecutionStrategy::Parallel)
        .await
        .expect("submit should succeed with capacity available");

    let mut terminal = None;
    for _ in 0..200 {
        let status = orchestrator.status(execution_id).await.expect("execution exists");
        if status.status.is_terminal() {
            terminal = Some(status);
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let execution = terminal.expect("execution did not reach a terminal state in time");
    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(execution.progress, 1.0);
    assert_eq!(execution.plan.stages.len(), 1);
    assert_eq!(execution.plan.stages[0].rule_ids.len(), 5);

    let metrics = orchestrator.metrics_snapshot();
    assert_eq!(metrics.submitted, 1);
    assert_eq!(metrics.completed, 1);
}

/// Spec §8 scenario 2: once the queue is at `maxQueueSize`, further
/// submissions fail with `QueueFull` rather than growing the queue.
#[tokio::test]
async fn queue_full_rejects_once_max_queue_size_is_reached() {
    let mut config = OrchestratorConfig::default();
    config.max_queue_size = 2;
    let orchestrator = Orchestrator::new(
        config,
        // Zero capacity: every submission queues, none are admitted.
        ResourceRequirement::ZERO,
        Arc::new(StubDataSourceSvc::new()),
        Arc::new(StubRuleSvc::new()),
        Some(Arc::new(NoHintEstimatorSvc)),
        Arc::new(SystemClock),
        Arc::new(NullMetricsSink),
        Arc::new(TracingLogSink),
    );

    orchestrator
        .submit(sample_scan_request(), ExecutionStrategy::Sequential)
        .await
        .expect("first submission should queue");
    orchestrator
        .submit(sample_scan_request(), ExecutionStrategy::Sequential)
        .await
        .expect("second submission should queue");

    let result = orchestrator
        .submit(sample_scan_request(), ExecutionStrategy::Sequential)
        .await;
    assert!(matches!(result, Err(scanforge_types::ErrorKind::QueueFull { .. })));
}

/// Spec §8 scenario 3: cancelling a still-queued request removes it
/// before any worker ever picks it up, and no allocation is ever
/// recorded for it (the round-trip law in §8).
#[tokio::test]
async fn cancel_before_admission_removes_the_queued_request() {
    let orchestrator = test_orchestrator(ResourceRequirement::ZERO);
    let execution_id = orchestrator
        .submit(sample_scan_request(), ExecutionStrategy::Sequential)
        .await
        .expect("submission should queue given zero capacity");

    let status = orchestrator.status(execution_id).await.expect("placeholder exists");
    assert_eq!(status.status, ExecutionStatus::Pending);

    orchestrator.cancel(execution_id).await.expect("cancel should succeed while queued");
    let status = orchestrator.status(execution_id).await.expect("execution record retained");
    assert_eq!(status.status, ExecutionStatus::Cancelled);

    let utilization = orchestrator.resource_utilization().await;
    assert!(utilization.values().all(|&v| v == 0.0));
}

/// Spec §8 scenario 6: a dependent schedule stays parked until its
/// dependency has actually been submitted to the orchestrator, rather
/// than jumping the queue the moment it's registered. The due-time
/// promotion itself (the other half of scenario 6) is exercised directly
/// against the scheduler's internals in `scheduler::tests`, since
/// nothing in the scheduler's public surface exposes a schedule's `due`
/// to external callers.
#[tokio::test]
async fn dependent_schedule_stays_pending_until_its_dependency_is_submitted() {
    let orchestrator = test_orchestrator(ample_capacity());
    let scheduler = Scheduler::new(Arc::clone(&orchestrator), Arc::new(SystemClock));

    let dependency_id = scheduler
        .schedule(sample_scan_request(), SchedulingStrategy::Immediate, vec![])
        .await;

    let mut dependent_request = sample_scan_request();
    dependent_request.priority = Priority::High;
    dependent_request.scheduled_time = Some(chrono::Utc::now());
    let _dependent_id = scheduler
        .schedule(dependent_request, SchedulingStrategy::DependencyAware, vec![dependency_id])
        .await;

    assert_eq!(scheduler.status().await.pending, 2);

    // Both are due now, but the dependent isn't ready yet: this tick
    // submits the dependency and re-parks the dependent for a later tick
    // rather than submitting both.
    scheduler.tick().await;
    assert_eq!(orchestrator.metrics_snapshot().submitted, 1);
    assert_eq!(scheduler.status().await.pending, 1);
}
