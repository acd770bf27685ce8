//! Job model: one unit of scheduled generation work.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use genpress_core::{BatchId, JobId, SeedId};

/// Default number of job-level retries across ticks.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Job execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Scheduled, waiting for its due time.
    Pending,
    /// Claimed by a worker tick.
    InProgress,
    /// Finished successfully.
    Completed,
    /// Failed with retries exhausted.
    Failed,
}

impl JobStatus {
    /// Completed or terminally failed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Still counts against batch settlement.
    pub fn is_open(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::InProgress)
    }
}

/// One scheduled generation job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Batch this job was planned into (one batch per calendar day).
    pub batch_id: BatchId,
    /// Content seed this job consumes.
    pub seed_id: SeedId,
    /// Seed topic, used as the generation prompt input.
    pub topic: String,
    /// Earliest instant a worker tick may pick this job up.
    pub scheduled_for: DateTime<Utc>,
    /// Calendar day this job belongs to for planning purposes. Stays fixed
    /// even when pacing or a retry pushes `scheduled_for` past midnight.
    pub planned_for: NaiveDate,
    pub status: JobStatus,
    /// Job-level retries consumed so far (distinct from provider backoff).
    pub retry_count: u32,
    pub max_retries: u32,
    /// Reference to the generated artefact, set on completion.
    pub result_ref: Option<String>,
    /// Terminal failure reason, set when retries are exhausted.
    pub failure_reason: Option<String>,
    /// Batch-level convenience flag set once the batch notification fired.
    pub notification_sent: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Whether a failed execution may be re-queued instead of going terminal.
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }
}

/// Creation request handed to the job store by the planner.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub batch_id: BatchId,
    pub seed_id: SeedId,
    pub topic: String,
    pub scheduled_for: DateTime<Utc>,
    /// Planning day; defaults to `scheduled_for`'s date, the planner overrides
    /// it for jobs whose pacing spilled past midnight.
    pub planned_for: NaiveDate,
    pub max_retries: u32,
}

impl JobSpec {
    pub fn new(
        batch_id: BatchId,
        seed_id: SeedId,
        topic: impl Into<String>,
        scheduled_for: DateTime<Utc>,
    ) -> Self {
        Self {
            batch_id,
            seed_id,
            topic: topic.into(),
            scheduled_for,
            planned_for: scheduled_for.date_naive(),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}
