//! Job and quota storage abstractions with in-memory implementations.
//!
//! Durable implementations live outside this crate; the in-memory stores
//! mirror the contract they must honour (claims are conditional status
//! swaps, quota updates are atomic) and back the tests.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use chrono::{DateTime, NaiveDate, Utc};

use genpress_core::{BatchId, JobId, SeedId};

use crate::job::{Job, JobSpec, JobStatus};
use crate::quota::GenerationQuota;

/// Storage error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("seed not found: {0}")]
    SeedNotFound(SeedId),
    #[error("no active quota")]
    NoActiveQuota,
    #[error("storage error: {0}")]
    Storage(String),
}

/// Aggregated view of one batch, computed on demand.
#[derive(Debug, Clone)]
pub struct BatchSummary {
    pub batch_id: BatchId,
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
    /// `result_ref`s of the completed jobs, in schedule order.
    pub results: Vec<String>,
}

impl BatchSummary {
    /// A batch is settled once no job of it remains open.
    pub fn is_settled(&self) -> bool {
        self.pending == 0 && self.in_progress == 0
    }
}

/// Persisted job records.
pub trait JobStore: Send + Sync {
    /// Insert a new pending job.
    fn create(&self, spec: JobSpec) -> Result<Job, StoreError>;

    /// Fetch a job by id.
    fn get(&self, id: JobId) -> Result<Option<Job>, StoreError>;

    /// Atomically claim up to `limit` due pending jobs, oldest `scheduled_for`
    /// first, transitioning each to `InProgress`.
    fn claim_due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Job>, StoreError>;

    /// Record successful completion.
    fn complete(&self, id: JobId, result_ref: &str) -> Result<(), StoreError>;

    /// Record terminal failure.
    fn fail(&self, id: JobId, reason: &str) -> Result<(), StoreError>;

    /// Re-queue a failed execution: increments `retry_count`, sets `Pending`
    /// and the next due time.
    fn retry(&self, id: JobId, next_run: DateTime<Utc>) -> Result<(), StoreError>;

    /// Count jobs planned for the given calendar date, across all statuses.
    /// Keyed on `planned_for`, so jobs whose due time spilled past midnight
    /// still count against their own day.
    fn count_for_date(&self, date: NaiveDate) -> Result<usize, StoreError>;

    /// Batch id of the jobs already planned for the given date, if any.
    fn batch_for_date(&self, date: NaiveDate) -> Result<Option<BatchId>, StoreError>;

    /// Summaries of every batch whose notification has not fired yet.
    fn unnotified_batches(&self) -> Result<Vec<BatchSummary>, StoreError>;

    /// Set `notification_sent` on every job of the batch.
    fn mark_batch_notified(&self, batch_id: BatchId) -> Result<(), StoreError>;
}

/// Persisted quota record (one active at a time).
pub trait QuotaStore: Send + Sync {
    /// The active quota, if any.
    fn active(&self) -> Result<Option<GenerationQuota>, StoreError>;

    /// Atomically bump `generated_count` (capped at `total_needed`).
    fn increment_generated(&self) -> Result<(), StoreError>;

    /// Mark one seed consumed.
    fn mark_seed_used(&self, seed_id: SeedId) -> Result<(), StoreError>;

    /// Deactivate the quota (it no longer plans jobs).
    fn deactivate(&self) -> Result<(), StoreError>;
}

/// In-memory job store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every job, in schedule order (test helper).
    pub fn all(&self) -> Vec<Job> {
        let jobs = self.jobs.read().unwrap();
        let mut all: Vec<_> = jobs.values().cloned().collect();
        all.sort_by_key(|j| j.scheduled_for);
        all
    }
}

impl JobStore for InMemoryJobStore {
    fn create(&self, spec: JobSpec) -> Result<Job, StoreError> {
        let now = Utc::now();
        let job = Job {
            id: JobId::new(),
            batch_id: spec.batch_id,
            seed_id: spec.seed_id,
            topic: spec.topic,
            scheduled_for: spec.scheduled_for,
            planned_for: spec.planned_for,
            status: JobStatus::Pending,
            retry_count: 0,
            max_retries: spec.max_retries,
            result_ref: None,
            failure_reason: None,
            notification_sent: false,
            created_at: now,
            updated_at: now,
        };
        self.jobs.write().unwrap().insert(job.id, job.clone());
        Ok(job)
    }

    fn get(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        Ok(self.jobs.read().unwrap().get(&id).cloned())
    }

    fn claim_due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Job>, StoreError> {
        let mut jobs = self.jobs.write().unwrap();

        let mut due: Vec<JobId> = jobs
            .values()
            .filter(|j| j.status == JobStatus::Pending && j.scheduled_for <= now)
            .map(|j| j.id)
            .collect();
        due.sort_by_key(|id| jobs[id].scheduled_for);
        due.truncate(limit);

        let mut claimed = Vec::with_capacity(due.len());
        for id in due {
            if let Some(job) = jobs.get_mut(&id) {
                // Conditional swap; a durable store does this as a CAS on status.
                if job.status == JobStatus::Pending {
                    job.status = JobStatus::InProgress;
                    job.updated_at = now;
                    claimed.push(job.clone());
                }
            }
        }
        Ok(claimed)
    }

    fn complete(&self, id: JobId, result_ref: &str) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().unwrap();
        let job = jobs.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        job.status = JobStatus::Completed;
        job.result_ref = Some(result_ref.to_string());
        job.updated_at = Utc::now();
        Ok(())
    }

    fn fail(&self, id: JobId, reason: &str) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().unwrap();
        let job = jobs.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        job.status = JobStatus::Failed;
        job.failure_reason = Some(reason.to_string());
        job.updated_at = Utc::now();
        Ok(())
    }

    fn retry(&self, id: JobId, next_run: DateTime<Utc>) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().unwrap();
        let job = jobs.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        job.retry_count += 1;
        job.status = JobStatus::Pending;
        job.scheduled_for = next_run;
        job.updated_at = Utc::now();
        Ok(())
    }

    fn count_for_date(&self, date: NaiveDate) -> Result<usize, StoreError> {
        let jobs = self.jobs.read().unwrap();
        Ok(jobs.values().filter(|j| j.planned_for == date).count())
    }

    fn batch_for_date(&self, date: NaiveDate) -> Result<Option<BatchId>, StoreError> {
        let jobs = self.jobs.read().unwrap();
        // The earliest-scheduled job wins, so the answer is stable even if a
        // stray second batch ever shares the date.
        Ok(jobs
            .values()
            .filter(|j| j.planned_for == date)
            .min_by_key(|j| j.scheduled_for)
            .map(|j| j.batch_id))
    }

    fn unnotified_batches(&self) -> Result<Vec<BatchSummary>, StoreError> {
        let jobs = self.jobs.read().unwrap();

        let mut members: HashMap<BatchId, Vec<&Job>> = HashMap::new();
        for job in jobs.values() {
            members.entry(job.batch_id).or_default().push(job);
        }

        let mut summaries = Vec::new();
        for (batch_id, mut batch_jobs) in members {
            if batch_jobs.iter().any(|j| j.notification_sent) {
                continue;
            }
            batch_jobs.sort_by_key(|j| j.scheduled_for);

            let mut summary = BatchSummary {
                batch_id,
                pending: 0,
                in_progress: 0,
                completed: 0,
                failed: 0,
                results: Vec::new(),
            };
            for job in batch_jobs {
                match job.status {
                    JobStatus::Pending => summary.pending += 1,
                    JobStatus::InProgress => summary.in_progress += 1,
                    JobStatus::Completed => {
                        summary.completed += 1;
                        if let Some(result) = &job.result_ref {
                            summary.results.push(result.clone());
                        }
                    }
                    JobStatus::Failed => summary.failed += 1,
                }
            }
            summaries.push(summary);
        }
        Ok(summaries)
    }

    fn mark_batch_notified(&self, batch_id: BatchId) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().unwrap();
        for job in jobs.values_mut().filter(|j| j.batch_id == batch_id) {
            job.notification_sent = true;
            job.updated_at = Utc::now();
        }
        Ok(())
    }
}

/// In-memory quota store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryQuotaStore {
    quota: Mutex<Option<GenerationQuota>>,
}

impl InMemoryQuotaStore {
    pub fn new(quota: GenerationQuota) -> Self {
        Self {
            quota: Mutex::new(Some(quota)),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

impl QuotaStore for InMemoryQuotaStore {
    fn active(&self) -> Result<Option<GenerationQuota>, StoreError> {
        let quota = self.quota.lock().unwrap();
        Ok(quota.as_ref().filter(|q| q.active).cloned())
    }

    fn increment_generated(&self) -> Result<(), StoreError> {
        let mut quota = self.quota.lock().unwrap();
        let quota = quota.as_mut().ok_or(StoreError::NoActiveQuota)?;
        quota.generated_count = (quota.generated_count + 1).min(quota.total_needed);
        Ok(())
    }

    fn mark_seed_used(&self, seed_id: SeedId) -> Result<(), StoreError> {
        let mut quota = self.quota.lock().unwrap();
        let quota = quota.as_mut().ok_or(StoreError::NoActiveQuota)?;
        let seed = quota
            .seeds
            .iter_mut()
            .find(|s| s.id == seed_id)
            .ok_or(StoreError::SeedNotFound(seed_id))?;
        seed.used = true;
        Ok(())
    }

    fn deactivate(&self) -> Result<(), StoreError> {
        let mut quota = self.quota.lock().unwrap();
        let quota = quota.as_mut().ok_or(StoreError::NoActiveQuota)?;
        quota.active = false;
        Ok(())
    }
}
