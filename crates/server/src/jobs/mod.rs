// crates/server/src/jobs/mod.rs
//! Asynchronous job engine: registry, worker, synthetic progress reporter,
//! status broadcaster, and the supervisor that ties them together.

pub mod broadcaster;
pub mod handles;
pub mod job;
pub mod registry;
pub mod reporter;
pub mod supervisor;
pub mod worker;

pub use job::{Job, JobSnapshot, JobStatus};
pub use registry::{run_eviction_sweep, JobRegistry};
pub use supervisor::JobSupervisor;
