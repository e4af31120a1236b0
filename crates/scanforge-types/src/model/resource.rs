//! Resource estimation and allocation types (spec §3, §4.1, §5).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::ExecutionId;

/// Estimated or reserved demand across the six resource dimensions the
/// pool tracks (spec §3 `ResourceRequirement`). All fields are
/// non-negative; `estimated_duration_minutes >= 1`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequirement {
    pub cpu_pct: f64,
    pub memory_mb: u64,
    pub storage_mb: u64,
    pub network_mbps: u64,
    pub db_connections: u32,
    pub api_rate: u32,
    pub complexity: f64,
    pub estimated_duration_minutes: u32,
}

impl ResourceRequirement {
    pub const ZERO: ResourceRequirement = ResourceRequirement {
        cpu_pct: 0.0,
        memory_mb: 0,
        storage_mb: 0,
        network_mbps: 0,
        db_connections: 0,
        api_rate: 0,
        complexity: 1.0,
        estimated_duration_minutes: 1,
    };

    /// Componentwise sum of the allocatable dimensions. `complexity` and
    /// `estimated_duration_minutes` are per-request scalars, not pool
    /// counters, so they are carried from `self` unchanged -- summing
    /// them across concurrent allocations would not mean anything.
    pub fn saturating_add(self, other: ResourceRequirement) -> ResourceRequirement {
        ResourceRequirement {
            cpu_pct: self.cpu_pct + other.cpu_pct,
            memory_mb: self.memory_mb.saturating_add(other.memory_mb),
            storage_mb: self.storage_mb.saturating_add(other.storage_mb),
            network_mbps: self.network_mbps.saturating_add(other.network_mbps),
            db_connections: self.db_connections.saturating_add(other.db_connections),
            api_rate: self.api_rate.saturating_add(other.api_rate),
            complexity: self.complexity,
            estimated_duration_minutes: self.estimated_duration_minutes,
        }
    }

    pub fn saturating_sub(self, other: ResourceRequirement) -> ResourceRequirement {
        ResourceRequirement {
            cpu_pct: (self.cpu_pct - other.cpu_pct).max(0.0),
            memory_mb: self.memory_mb.saturating_sub(other.memory_mb),
            storage_mb: self.storage_mb.saturating_sub(other.storage_mb),
            network_mbps: self.network_mbps.saturating_sub(other.network_mbps),
            db_connections: self.db_connections.saturating_sub(other.db_connections),
            api_rate: self.api_rate.saturating_sub(other.api_rate),
            complexity: self.complexity,
            estimated_duration_minutes: self.estimated_duration_minutes,
        }
    }

    /// Whether `self` fits within `capacity` on every one of the six
    /// allocatable dimensions (spec §4.1: "required + current ≤ capacity
    /// ... on *every* resource type"). The caller is expected to have
    /// already subtracted current usage and applied the safety margin.
    pub fn fits_within(self, capacity: ResourceRequirement) -> bool {
        self.cpu_pct <= capacity.cpu_pct
            && self.memory_mb <= capacity.memory_mb
            && self.storage_mb <= capacity.storage_mb
            && self.network_mbps <= capacity.network_mbps
            && self.db_connections <= capacity.db_connections
            && self.api_rate <= capacity.api_rate
    }

    /// Scale every allocatable dimension by `factor`, clamped to
    /// non-negative (spec §4.1: "multiply CPU/memory/storage/network by
    /// complexity multiplier").
    pub fn scaled(self, factor: f64) -> ResourceRequirement {
        let factor = factor.max(0.0);
        ResourceRequirement {
            cpu_pct: self.cpu_pct * factor,
            memory_mb: (self.memory_mb as f64 * factor).round() as u64,
            storage_mb: (self.storage_mb as f64 * factor).round() as u64,
            network_mbps: (self.network_mbps as f64 * factor).round() as u64,
            db_connections: self.db_connections,
            api_rate: self.api_rate,
            complexity: self.complexity,
            estimated_duration_minutes: self.estimated_duration_minutes,
        }
    }
}

/// A granted allocation against the resource pool, held for the lifetime
/// of one execution and released (or reclaimed by the sweeper on
/// expiry) when the execution reaches a terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceAllocation {
    pub execution_id: ExecutionId,
    pub requirement: ResourceRequirement,
    pub priority_value: u8,
    pub allocated_at: DateTime<Utc>,
    /// `allocated_at + estimated_duration_minutes + grace` (spec §3).
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(cpu: f64, mem: u64) -> ResourceRequirement {
        ResourceRequirement {
            cpu_pct: cpu,
            memory_mb: mem,
            ..ResourceRequirement::ZERO
        }
    }

    #[test]
    fn fits_within_checks_every_dimension() {
        let need = req(20.0, 512);
        let cap = req(30.0, 1024);
        assert!(need.fits_within(cap));

        let tight = req(30.0, 256);
        assert!(!need.fits_within(tight));
    }

    #[test]
    fn saturating_add_does_not_overflow() {
        let big = ResourceRequirement {
            memory_mb: u64::MAX,
            ..req(1.0, u64::MAX)
        };
        let sum = big.saturating_add(big);
        assert_eq!(sum.memory_mb, u64::MAX);
    }

    #[test]
    fn scaled_applies_factor_to_allocatable_dims_only() {
        let base = ResourceRequirement {
            cpu_pct: 10.0,
            memory_mb: 100,
            storage_mb: 100,
            network_mbps: 10,
            db_connections: 2,
            api_rate: 50,
            complexity: 1.5,
            estimated_duration_minutes: 30,
        };
        let scaled = base.scaled(2.0);
        assert_eq!(scaled.cpu_pct, 20.0);
        assert_eq!(scaled.memory_mb, 200);
        assert_eq!(scaled.db_connections, 2);
        assert_eq!(scaled.complexity, 1.5);
    }
}
