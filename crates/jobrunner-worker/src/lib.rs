//! Asynchronous job execution for jobrunner.
//!
//! This crate provides:
//! - The [`Job`] contract with per-job retry policy and failure hook
//! - An elastic [`WorkerPool`] returning a [`JobHandle`] per submission
//! - A fixed-rate [`ScheduledRunner`] for periodic jobs
//! - An in-flight registry of job names for observability
//! - Built-in jobs, such as the periodic pool statistics report

mod executor;
pub mod handle;
pub mod job;
pub mod jobs;
pub mod pool;
mod queue;
pub mod registry;
pub mod scheduler;
pub mod shutdown;

pub use handle::JobHandle;
pub use job::{Job, JobError};
pub use pool::{PoolStats, WorkerPool};
pub use registry::InFlightRegistry;
pub use scheduler::{ScheduleState, ScheduledJob, ScheduledRunner};
pub use shutdown::ShutdownReport;
