//! Daily job planner: decides how many jobs today still needs and paces them
//! across the remaining window.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use rand::Rng;
use tracing::{debug, info, warn};

use genpress_core::{BatchId, Clock};

use crate::job::JobSpec;
use crate::store::{JobStore, QuotaStore, StoreError};

/// Planner tuning knobs.
#[derive(Debug, Clone, Copy)]
pub struct PlannerConfig {
    /// Hard floor between two consecutively scheduled jobs.
    pub min_interval: Duration,
    /// Maximum signed jitter applied to each spacing step.
    pub jitter: Duration,
    /// Retry budget stamped onto created jobs.
    pub max_retries: u32,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::minutes(5),
            jitter: Duration::minutes(15),
            max_retries: crate::job::DEFAULT_MAX_RETRIES,
        }
    }
}

/// Outcome of one planning pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanReport {
    pub created: usize,
}

/// Plans one calendar day's jobs from the active quota.
///
/// Invoked once per day plus a catch-up call at process start; re-invocation
/// on the same day is safe because the existing-job count covers all
/// statuses.
pub struct DailyPlanner {
    jobs: Arc<dyn JobStore>,
    quota: Arc<dyn QuotaStore>,
    clock: Arc<dyn Clock>,
    config: PlannerConfig,
}

impl DailyPlanner {
    pub fn new(jobs: Arc<dyn JobStore>, quota: Arc<dyn QuotaStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            jobs,
            quota,
            clock,
            config: PlannerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: PlannerConfig) -> Self {
        self.config = config;
        self
    }

    /// Run one planning pass for the current calendar day (UTC).
    pub fn plan_daily_jobs(&self) -> Result<PlanReport, StoreError> {
        let none = PlanReport { created: 0 };

        let Some(quota) = self.quota.active()? else {
            debug!("no active quota, nothing to plan");
            return Ok(none);
        };
        if quota.is_exhausted() {
            info!(
                total_needed = quota.total_needed,
                "quota reached its total, deactivating"
            );
            self.quota.deactivate()?;
            return Ok(none);
        }

        let unused = quota.unused_seeds();
        if unused.is_empty() {
            debug!("seed pool exhausted, nothing to plan");
            return Ok(none);
        }

        let today_target = quota
            .per_day_target
            .min(quota.remaining())
            .min(unused.len() as u32) as usize;
        if today_target == 0 {
            return Ok(none);
        }

        let now = self.clock.now();
        let today = now.date_naive();
        let existing = self.jobs.count_for_date(today)?;
        let to_create = today_target.saturating_sub(existing);
        if to_create == 0 {
            debug!(existing, today_target, "today is already fully planned");
            return Ok(none);
        }

        // One batch per calendar day, shared with any jobs planned earlier today.
        let batch_id = match self.jobs.batch_for_date(today)? {
            Some(existing_batch) => existing_batch,
            None => BatchId::new(),
        };

        let times = self.pace(now, quota.preferred_start_time, to_create);

        let mut created = 0;
        for (seed, scheduled_for) in unused.into_iter().zip(times) {
            let mut spec = JobSpec::new(batch_id, seed.id, seed.topic, scheduled_for);
            // A due time the pacing floor pushed past midnight still belongs
            // to today's plan and batch.
            spec.planned_for = today;
            spec.max_retries = self.config.max_retries;
            match self.jobs.create(spec) {
                Ok(job) => {
                    debug!(job_id = %job.id, scheduled_for = %job.scheduled_for, "job planned");
                    created += 1;
                }
                // One bad insert must not sink the rest of the day's plan.
                Err(err) => {
                    warn!(seed_id = %seed.id, error = %err, "failed to plan job, skipping seed");
                }
            }
        }

        info!(created, batch_id = %batch_id, "daily planning pass finished");
        Ok(PlanReport { created })
    }

    /// Spread `count` due times across the remaining window of `now`'s day.
    ///
    /// The first job lands at the window start; each next one is a jittered
    /// base interval later, never closer than `min_interval` to its
    /// predecessor. Times past end-of-day clamp to `end - min_interval`,
    /// except where the spacing floor wins: schedule density is degraded,
    /// never refused.
    fn pace(&self, now: DateTime<Utc>, preferred_start: NaiveTime, count: usize) -> Vec<DateTime<Utc>> {
        let today = now.date_naive();
        let end = today
            .and_time(NaiveTime::from_hms_opt(23, 59, 0).unwrap_or_default())
            .and_utc();
        let preferred = today.and_time(preferred_start).and_utc();

        let mut start = preferred.max(now);
        if start >= end {
            start = end - self.config.min_interval;
        }

        let base_interval = ((end - start) / count as i32).max(self.config.min_interval);
        let jitter_secs = self.config.jitter.num_seconds();
        let mut rng = rand::thread_rng();

        let mut times = Vec::with_capacity(count);
        let mut prev = start;
        for i in 0..count {
            let at = if i == 0 {
                start
            } else {
                let jitter = Duration::seconds(rng.gen_range(-jitter_secs..=jitter_secs));
                let candidate = (prev + base_interval + jitter).min(end - self.config.min_interval);
                candidate.max(prev + self.config.min_interval)
            };
            times.push(at);
            prev = at;
        }
        times
    }
}
