//! The scheduler: translates scheduling intents into concrete enqueue
//! events consumed by the [`crate::orchestrator::Orchestrator`] (spec
//! §4.2). Owns `schedules`, its priority heap, and the dependency graph
//! exclusively (spec §5); it never reaches into the orchestrator's
//! state beyond calling `submit`.

pub mod cron;
pub mod dependency;
pub mod placement;
pub mod queue;
pub mod retry;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use scanforge_types::ids::ScheduleId;
use scanforge_types::model::{Schedule, ScheduleStatus, SchedulingStrategy};
use scanforge_types::ErrorKind;

use crate::capability::ClockSvc;
use crate::orchestrator::Orchestrator;
use dependency::DependencyGraph;
use placement::{PlacementConfig, ResourceForecast};
use queue::{FailedRingBuffer, ScheduleQueue};

const FAILED_RING_BUFFER_CAPACITY: usize = 256;

/// A forecast that always reports flat suitability. Used when the
/// caller has no real utilization history to feed `ResourceBased`
/// placement; `Orchestrator::resource_utilization` is the natural real
/// implementation at the call site.
pub struct FlatForecast;
impl ResourceForecast for FlatForecast {
    fn score(&self, _candidate: chrono::DateTime<chrono::Utc>) -> f64 {
        50.0
    }
}

/// Aggregate scheduler status (spec §4.2: `Status() -> aggregate
/// status`). Not specified further by spec.md; the fields mirror the
/// orchestrator's own metrics snapshot shape for consistency.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStatus {
    pub pending: usize,
    pub failed_ring_buffer_len: usize,
}

pub struct Scheduler {
    orchestrator: Arc<Orchestrator>,
    clock: Arc<dyn ClockSvc>,
    forecast: Arc<dyn ResourceForecast + Send + Sync>,
    placement_config: PlacementConfig,
    queue: ScheduleQueue,
    dependencies: DependencyGraph,
    failed: FailedRingBuffer,
    registry: Mutex<HashMap<ScheduleId, Schedule>>,
}

impl Scheduler {
    pub fn new(orchestrator: Arc<Orchestrator>, clock: Arc<dyn ClockSvc>) -> Arc<Self> {
        Self::with_placement_config(orchestrator, clock, PlacementConfig::default())
    }

    /// Construct with an explicit business-hours/peak-hours/maintenance-window
    /// configuration (spec §9 open question: these are configurable from day
    /// one rather than hard-coded).
    pub fn with_placement_config(
        orchestrator: Arc<Orchestrator>,
        clock: Arc<dyn ClockSvc>,
        placement_config: PlacementConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            orchestrator,
            clock,
            forecast: Arc::new(FlatForecast),
            placement_config,
            queue: ScheduleQueue::new(),
            dependencies: DependencyGraph::new(),
            failed: FailedRingBuffer::new(FAILED_RING_BUFFER_CAPACITY),
            registry: Mutex::new(HashMap::new()),
        })
    }

    /// Place a request on the scheduler's timeline (spec §4.2 `Schedule`).
    pub async fn schedule(
        &self,
        request: scanforge_types::model::ScanRequest,
        strategy: SchedulingStrategy,
        dependencies: Vec<ScheduleId>,
    ) -> ScheduleId {
        let now = self.clock.now();
        let queue_len = self.queue.len().await;

        let due = if let Some(explicit) = request.scheduled_time {
            explicit
        } else {
            placement::compute_due(
                &self.placement_config,
                strategy,
                request.priority,
                now,
                queue_len,
                request.rule_ids.len(),
                self.forecast.as_ref(),
            )
        };

        let id = ScheduleId::new();
        let schedule = Schedule {
            id,
            cron: request.cron.clone(),
            request,
            strategy,
            status: ScheduleStatus::Scheduled,
            dependencies: dependencies.clone(),
            due,
            last_run_at: None,
            next_run_at: None,
            attempts: 0,
            max_attempts: 3,
            created_at: now,
        };

        self.dependencies.register(id, dependencies).await;
        self.registry.lock().await.insert(id, schedule.clone());
        self.queue.push(schedule).await;
        id
    }

    /// Cancel a pending schedule (spec §4.2 `Cancel`).
    pub async fn cancel(&self, schedule_id: ScheduleId) -> Result<(), ErrorKind> {
        let mut registry = self.registry.lock().await;
        match registry.get_mut(&schedule_id) {
            Some(schedule) if !matches!(schedule.status, ScheduleStatus::Completed | ScheduleStatus::Failed) => {
                schedule.status = ScheduleStatus::Failed;
                Ok(())
            }
            Some(_) => Err(ErrorKind::InternalError(format!(
                "schedule {schedule_id} is already terminal"
            ))),
            None => Err(ErrorKind::InternalError(format!("unknown schedule {schedule_id}"))),
        }
    }

    pub async fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            pending: self.queue.len().await,
            failed_ring_buffer_len: self.failed.len().await,
        }
    }

    /// One scheduling tick: pop every due, dependency-satisfied schedule
    /// and submit it to the orchestrator. Intended to be driven by
    /// [`run_scheduling_loop`] on a fixed interval (spec §5
    /// `_scheduling_loop`).
    async fn tick(self: &Arc<Self>) {
        let now = self.clock.now();
        while let Some(schedule) = self.queue.pop_due(now).await {
            if !self.dependencies.is_ready(schedule.id).await {
                // Not ready yet; park it for the next tick rather than
                // surfacing DependencyUnsatisfied to a caller (spec §7).
                let mut parked = schedule;
                parked.due = now + chrono::Duration::minutes(1);
                self.queue.push(parked).await;
                continue;
            }

            match self
                .orchestrator
                .submit(schedule.request.clone(), execution_strategy_for(schedule.strategy))
                .await
            {
                Ok(_execution_id) => {
                    let mut registry = self.registry.lock().await;
                    if let Some(entry) = registry.get_mut(&schedule.id) {
                        entry.status = ScheduleStatus::Running;
                        entry.last_run_at = Some(now);
                    }
                    drop(registry);
                    self.on_completed(schedule.id, schedule.cron.clone(), now).await;
                }
                Err(ErrorKind::QueueFull { .. }) => {
                    let mut retried = schedule;
                    retried.due = now + chrono::Duration::seconds(30);
                    self.queue.push(retried).await;
                }
                Err(_other) => {
                    let mut failing = schedule;
                    match retry::decide(&mut failing, now) {
                        retry::RetryDecision::Reenqueue(_) => self.queue.push(failing).await,
                        retry::RetryDecision::Exhausted => self.failed.push(failing).await,
                    }
                }
            }
        }
    }

    /// Promote any dependents that just became ready, and (for a cron
    /// schedule) enqueue the next recurrence (spec §4.2 "Dependency
    /// resolution", "Recurrence").
    async fn on_completed(&self, schedule_id: ScheduleId, cron_expr: Option<String>, now: chrono::DateTime<chrono::Utc>) {
        let newly_ready = self.dependencies.mark_completed(schedule_id).await;
        for dependent_id in newly_ready {
            let priority = {
                let registry = self.registry.lock().await;
                registry.get(&dependent_id).map(|dependent| dependent.request.priority)
            };
            let Some(priority) = priority else { continue };
            let Some(promoted) = DependencyGraph::promoted_due(priority, now) else {
                continue;
            };
            // The dependent's live record sits in `queue`, not in
            // `registry` -- `registry` is only a read-model snapshot, so
            // updating it alone would never move the dependent ahead of
            // its originally-due turn.
            if self.queue.promote(dependent_id, promoted).await {
                let mut registry = self.registry.lock().await;
                if let Some(dependent) = registry.get_mut(&dependent_id) {
                    dependent.due = promoted;
                }
            }
        }

        if let Some(expr) = cron_expr {
            if let Some(next_due) = cron::next_cron_fire(&expr, now) {
                let mut registry = self.registry.lock().await;
                if let Some(original) = registry.get(&schedule_id).cloned() {
                    drop(registry);
                    let fresh_id = ScheduleId::new();
                    let fresh = Schedule {
                        id: fresh_id,
                        due: next_due,
                        next_run_at: Some(next_due),
                        status: ScheduleStatus::Scheduled,
                        attempts: 0,
                        created_at: now,
                        ..original
                    };
                    self.registry.lock().await.insert(fresh_id, fresh.clone());
                    self.queue.push(fresh).await;
                }
            }
        }
    }

    /// Supervised background loop (spec §5 `_scheduling_loop`): ticks on
    /// a fixed cadence until cancelled. Tick granularity is independent
    /// of `interval` accuracy requirements named in spec §8 (`<= 10s`);
    /// callers pick `interval` accordingly.
    pub async fn run_scheduling_loop(self: Arc<Self>, interval: std::time::Duration, cancel: CancellationToken) {
        loop {
            if cancel.is_cancelled() {
                return;
            }
            self.tick().await;
            tokio::select! {
                _ = self.clock.sleep(interval) => {}
                _ = cancel.cancelled() => return,
            }
        }
    }
}

/// Map a `SchedulingStrategy` onto the `ExecutionStrategy` the
/// orchestrator's plan builder understands. Scheduling strategy governs
/// *when*; execution strategy governs *how*, so most map onto
/// `Adaptive` unless the name implies an execution shape directly.
fn execution_strategy_for(strategy: SchedulingStrategy) -> scanforge_types::model::ExecutionStrategy {
    use scanforge_types::model::ExecutionStrategy;
    match strategy {
        SchedulingStrategy::Predictive | SchedulingStrategy::OptimalTime => ExecutionStrategy::Intelligent,
        SchedulingStrategy::ResourceBased => ExecutionStrategy::ResourceOptimized,
        _ => ExecutionStrategy::Adaptive,
    }
}
