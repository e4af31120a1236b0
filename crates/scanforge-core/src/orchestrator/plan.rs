//! Execution-plan strategies (spec §4.1 "Execution-plan strategies").
//!
//! All six strategies are built from the same two primitive shapes: one
//! stage per rule chained sequentially, or rules batched into stages of
//! a concurrency-bounded size. `Adaptive`, `Intelligent`,
//! `PriorityBased`, and `ResourceOptimized` all reduce to the batched
//! shape with a different batch-size policy; the plain `batch_size`
//! formula is spec §4.1's `min(|rules|, floor(cpuPct/5), dbConnections)`.
//!
//! `kind`/`complexity` grouping for `Adaptive` is specified loosely
//! ("group rules by kind/complexity") but `RuleSvc` (spec §6) exposes no
//! per-rule kind -- only validation. Grouping here falls back to batch
//! size as the sequential/parallel discriminator (`|group| <= 3` stays
//! Sequential), which is the only signal the capability surface
//! actually provides; see `DESIGN.md`.

use scanforge_types::ids::StageId;
use scanforge_types::model::{ExecutionPlan, ExecutionStrategy, Priority, ResourceRequirement, ScanRequest, Stage, StageMode};

use crate::capability::EstimateHint;

fn batch_size(num_rules: usize, cpu_pct: f64, db_connections: u32) -> usize {
    num_rules
        .min((cpu_pct / 5.0).floor().max(1.0) as usize)
        .min(db_connections.max(1) as usize)
        .max(1)
}

fn per_stage_requirement(total: ResourceRequirement, stage_count: usize) -> ResourceRequirement {
    if stage_count == 0 {
        return ResourceRequirement::ZERO;
    }
    total.scaled(1.0 / stage_count as f64)
}

/// One stage per rule, each depending on the previous (spec §4.1
/// "Sequential").
fn build_sequential(request: &ScanRequest, total: ResourceRequirement) -> Vec<Stage> {
    let per_rule = per_stage_requirement(total, request.rule_ids.len());
    let mut stages = Vec::with_capacity(request.rule_ids.len());
    let mut previous: Option<StageId> = None;
    for rule_id in &request.rule_ids {
        let id = StageId::new();
        stages.push(Stage {
            id,
            name: format!("rule:{rule_id}"),
            mode: StageMode::Sequential,
            rule_ids: vec![rule_id.clone()],
            depends_on: previous.into_iter().collect(),
            max_concurrency: None,
            requirement: per_rule,
            critical: true,
        });
        previous = Some(id);
    }
    stages
}

/// Batch rules into stages of `batch_size`; stages run sequentially,
/// rules within a stage run in parallel (spec §4.1 "Parallel").
fn build_parallel(request: &ScanRequest, total: ResourceRequirement) -> Vec<Stage> {
    let size = batch_size(request.rule_ids.len(), total.cpu_pct, total.db_connections);
    let chunks: Vec<&[String]> = request.rule_ids.chunks(size).collect();
    let per_stage = per_stage_requirement(total, chunks.len());

    let mut stages = Vec::with_capacity(chunks.len());
    let mut previous: Option<StageId> = None;
    for (idx, chunk) in chunks.iter().enumerate() {
        let id = StageId::new();
        stages.push(Stage {
            id,
            name: format!("batch-{idx}"),
            mode: StageMode::Parallel,
            rule_ids: chunk.to_vec(),
            depends_on: previous.into_iter().collect(),
            max_concurrency: Some(chunk.len() as u32),
            requirement: per_stage,
            critical: true,
        });
        previous = Some(id);
    }
    stages
}

/// Group rules into the same batches `build_parallel` would use, but
/// render each group Sequential when it has 3 or fewer rules and
/// Parallel otherwise (spec §4.1 "Adaptive").
fn build_adaptive(request: &ScanRequest, total: ResourceRequirement, concurrency_factor: f64) -> Vec<Stage> {
    let size = batch_size(
        request.rule_ids.len(),
        total.cpu_pct * concurrency_factor,
        total.db_connections,
    )
    .max(1);
    let chunks: Vec<&[String]> = request.rule_ids.chunks(size).collect();
    let per_stage = per_stage_requirement(total, chunks.len());

    let mut stages = Vec::with_capacity(chunks.len());
    let mut previous: Option<StageId> = None;
    for (idx, chunk) in chunks.iter().enumerate() {
        let id = StageId::new();
        let mode = if chunk.len() <= 3 {
            StageMode::Sequential
        } else {
            StageMode::Parallel
        };
        stages.push(Stage {
            id,
            name: format!("group-{idx}"),
            mode,
            rule_ids: chunk.to_vec(),
            depends_on: previous.into_iter().collect(),
            max_concurrency: matches!(mode, StageMode::Parallel).then(|| chunk.len() as u32),
            requirement: per_stage,
            critical: true,
        });
        previous = Some(id);
    }
    stages
}

/// Priority-dependent concurrency boost applied to `Adaptive`'s batch
/// sizing for `PriorityBased` (spec §4.1: "equivalent to Adaptive with
/// priority boosts"). Higher urgency widens the parallel batch so urgent
/// work finishes sooner; exact factors are an engineering choice, not an
/// externally specified constant.
fn priority_concurrency_factor(priority: Priority) -> f64 {
    match priority {
        Priority::Critical => 2.0,
        Priority::High => 1.5,
        Priority::Normal => 1.0,
        Priority::Low => 0.75,
        Priority::Background => 0.5,
    }
}

/// Build an `ExecutionPlan` for `request` under `strategy`, given the
/// total estimated resource requirement and (for `Intelligent`) an
/// optional advisor hint.
pub fn build_plan(
    request: &ScanRequest,
    strategy: ExecutionStrategy,
    total: ResourceRequirement,
    advisor_hint: Option<EstimateHint>,
) -> ExecutionPlan {
    let stages = match strategy {
        ExecutionStrategy::Sequential => build_sequential(request, total),
        ExecutionStrategy::Parallel => build_parallel(request, total),
        ExecutionStrategy::Adaptive => build_adaptive(request, total, 1.0),
        // No advisor output means no plan hint beyond the resource
        // estimate already folded into `total` -- fall back to Adaptive
        // rather than treating the absence as an error (Design Notes).
        ExecutionStrategy::Intelligent => match advisor_hint {
            Some(hint) => build_adaptive(request, total, hint.complexity.max(0.1)),
            None => build_adaptive(request, total, 1.0),
        },
        ExecutionStrategy::PriorityBased => {
            build_adaptive(request, total, priority_concurrency_factor(request.priority))
        }
        // Resource-tightened: halve the concurrency factor so fewer
        // rules run in parallel per stage, trading latency for a
        // smaller peak footprint.
        ExecutionStrategy::ResourceOptimized => build_adaptive(request, total, 0.5),
    };

    ExecutionPlan {
        strategy,
        stages,
        total_requirement: total,
    }
}
