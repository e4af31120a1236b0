//! The enterprise scan orchestration core: the orchestrator, scheduler,
//! and workflow engine (spec §1's "hardest parts"), plus the shared
//! primitives and capability traits they're built on.
//!
//! Each of the three components owns its own state exclusively (spec
//! §3 "Ownership"): the orchestrator owns `activeExecutions`,
//! `allocatedResources`, `queue`, and `metrics`; the scheduler owns
//! `schedules`, `priorityHeap`, and `dependencyGraph`; the workflow
//! engine owns `workflows`, `pendingApprovals`, and `escalationQueue`.
//! Cross-component calls go through narrow public APIs and opaque
//! identifiers only -- never through a shared mutable struct.

pub mod capability;
pub mod orchestrator;
pub mod primitives;
pub mod scheduler;
pub mod workflow;

pub use orchestrator::Orchestrator;
pub use scheduler::Scheduler;
pub use workflow::WorkflowEngine;
