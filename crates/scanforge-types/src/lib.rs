//! Domain model types for the scan orchestration core: opaque
//! identifiers, the data model (requests, plans, executions, schedules,
//! workflows), and the error taxonomy. No I/O lives in this crate --
//! everything here is plain data, serializable with `serde`, shared
//! between `scanforge-core` and its callers.

pub mod error;
pub mod ids;
pub mod model;

pub use error::ErrorKind;
