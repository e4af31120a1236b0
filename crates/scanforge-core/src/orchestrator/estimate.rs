//! Deterministic resource estimation heuristics (spec §4.1 "Resource
//! estimation rules"). An `EstimatorSvc` hint, when present, replaces
//! the heuristic base values but is still clamped to the same bounds --
//! the heuristic is the contract, the advisor is an optimization
//! (Design Notes: "Heuristic ML advisors: keep them as pluggable
//! advisors behind interfaces that return optional hints").

use scanforge_types::model::{ResourceRequirement, ScanRequest, ScanType};

use crate::capability::{DataSourceMetadata, EstimateHint};

fn clamp_f64(value: f64, lo: f64, hi: f64) -> f64 {
    value.max(lo).min(hi)
}

fn clamp_u64(value: f64, lo: u64, hi: u64) -> u64 {
    (value.round() as i64).clamp(lo as i64, hi as i64) as u64
}

fn clamp_u32(value: f64, lo: u32, hi: u32) -> u32 {
    (value.round() as i64).clamp(lo as i64, hi as i64) as u32
}

/// The complexity multiplier applied to CPU/memory/storage/network
/// before clamping (spec §4.1).
pub fn complexity_multiplier(request: &ScanRequest, metadata: &DataSourceMetadata) -> f64 {
    let mut multiplier = 1.0;
    if request.rule_ids.len() > 10 {
        multiplier += 0.5;
    }
    if request.scan_type == ScanType::Deep {
        multiplier += 1.0;
    }
    if metadata.columns.len() > 100 {
        multiplier += 0.3;
    }
    multiplier
}

/// Derive a `ResourceRequirement` for `request` given `metadata`,
/// applying `hint` (if any) in place of the heuristic base values
/// before the complexity multiplier and clamps (spec §4.1).
pub fn estimate_resources(
    request: &ScanRequest,
    metadata: &DataSourceMetadata,
    hint: Option<EstimateHint>,
) -> ResourceRequirement {
    let rows = metadata.estimated_rows as f64;
    let complexity = hint.map(|h| h.complexity).unwrap_or_else(|| complexity_multiplier(request, metadata));

    let base_cpu = hint
        .map(|h| h.cpu_pct)
        .unwrap_or_else(|| rows / 100_000.0 * 2.0);
    let base_memory = hint
        .map(|h| h.memory_mb as f64)
        .unwrap_or_else(|| rows / 10_000.0 * 100.0);
    let base_storage = hint
        .map(|h| h.storage_mb as f64)
        .unwrap_or_else(|| rows / 1_000.0 * 10.0);
    let base_network = hint
        .map(|h| h.network_mbps as f64)
        .unwrap_or_else(|| metadata.tables.len() as f64 * 5.0);

    let cpu_pct = clamp_f64(base_cpu * complexity, 5.0, 50.0);
    let memory_mb = clamp_u64(base_memory * complexity, 512, 8192);
    let storage_mb = clamp_u64(base_storage * complexity, 100, 10_240);
    let network_mbps = clamp_u64(base_network * complexity, 10, 1000);

    let db_connections = hint
        .map(|h| h.db_connections)
        .unwrap_or_else(|| clamp_u32(metadata.tables.len() as f64 / 10.0, 1, 10));
    let api_rate = hint
        .map(|h| h.api_rate)
        .unwrap_or_else(|| clamp_u32(request.rule_ids.len() as f64 * 5.0, 10, 1000));

    let duration_minutes = hint.map(|h| h.duration_minutes).unwrap_or_else(|| {
        let rule_factor = (request.rule_ids.len() as f64 / 10.0).max(1.0);
        let raw = (rows / 100_000.0 * 10.0 * rule_factor * complexity).ceil();
        clamp_u32(raw, 5, 480)
    });

    ResourceRequirement {
        cpu_pct,
        memory_mb,
        storage_mb,
        network_mbps,
        db_connections,
        api_rate,
        complexity,
        estimated_duration_minutes: duration_minutes,
    }
}
