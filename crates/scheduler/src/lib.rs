//! `genpress-scheduler`
//!
//! **Responsibility:** the scheduling core of the content-generation
//! pipeline.
//!
//! - [`DailyPlanner`]: once a day, decides how many jobs are still owed and
//!   paces them across the remaining window with jitter.
//! - [`Worker`]: fires on a fixed period behind a single-flight guard,
//!   claims a bounded batch of due jobs, and drives each through the
//!   provider layer with persistent per-job retry.
//! - [`SettlementDetector`]: after each tick, finds batches with no open job
//!   left and fires their one-time notification.
//! - [`JobStore`]/[`QuotaStore`]/[`NotificationSink`]: the narrow
//!   collaborator seams; durable implementations live outside this crate.
//! - [`Pipeline`]: wires everything together and owns the driver thread.

pub mod job;
pub mod pipeline;
pub mod planner;
pub mod quota;
pub mod settlement;
pub mod store;
pub mod testing;
pub mod worker;

pub use job::{DEFAULT_MAX_RETRIES, Job, JobSpec, JobStatus};
pub use pipeline::{Pipeline, PipelineConfig, PipelineHandle};
pub use planner::{DailyPlanner, PlanReport, PlannerConfig};
pub use quota::{GenerationQuota, Seed};
pub use settlement::{BatchOutcome, NotificationSink, SettlementDetector, SinkError};
pub use store::{
    BatchSummary, InMemoryJobStore, InMemoryQuotaStore, JobStore, QuotaStore, StoreError,
};
pub use worker::{TickReport, Worker, WorkerConfig};
