//! Shared primitives used by the orchestrator, scheduler, and workflow
//! engine: the priority heap and the resource pool (spec §2 "shared
//! primitives": "priority queue, bounded channels, clock, identifiers,
//! logger facade"). Bounded channels, clock, and identifiers live in
//! [`crate::capability`] and `scanforge_types::ids`; this module holds
//! the two primitives with nontrivial invariants of their own.

pub mod priority_heap;
pub mod resource_pool;

pub use priority_heap::{PriorityHeap, PriorityKey};
pub use resource_pool::ResourcePool;
