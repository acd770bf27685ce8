//! Worker loop: claims due jobs each tick and drives them through the
//! generation layer.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Duration;
use tracing::{debug, info, warn};

use genpress_core::{BatchId, Clock};
use genpress_providers::BackoffOrchestrator;

use crate::job::Job;
use crate::settlement::SettlementDetector;
use crate::store::{JobStore, QuotaStore, StoreError};

/// Worker tuning knobs.
#[derive(Debug, Clone, Copy)]
pub struct WorkerConfig {
    /// Maximum jobs claimed per tick.
    pub batch_size: usize,
    /// Due-time push applied when a failed job is re-queued.
    pub retry_delay: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            retry_delay: Duration::minutes(1),
        }
    }
}

/// What one tick did.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    /// True when this invocation overlapped a still-running tick and did
    /// nothing.
    pub skipped: bool,
    pub claimed: usize,
    pub completed: usize,
    pub retried: usize,
    pub failed: usize,
    /// Batches whose settlement notification fired during this tick.
    pub notified: Vec<BatchId>,
}

enum JobOutcome {
    Completed,
    Retried,
    Failed,
}

/// Releases the single-flight flag even when a tick unwinds.
struct TickGuard<'a>(&'a AtomicBool);

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Periodically driven job worker.
///
/// Jobs are executed strictly sequentially within a tick, bounding external
/// provider load to one in-flight generation at a time. Overlapping ticks
/// are dropped, never queued.
pub struct Worker {
    jobs: Arc<dyn JobStore>,
    quota: Arc<dyn QuotaStore>,
    generator: BackoffOrchestrator,
    detector: SettlementDetector,
    clock: Arc<dyn Clock>,
    config: WorkerConfig,
    running: AtomicBool,
}

impl Worker {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        quota: Arc<dyn QuotaStore>,
        generator: BackoffOrchestrator,
        detector: SettlementDetector,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            jobs,
            quota,
            generator,
            detector,
            clock,
            config: WorkerConfig::default(),
            running: AtomicBool::new(false),
        }
    }

    pub fn with_config(mut self, config: WorkerConfig) -> Self {
        self.config = config;
        self
    }

    /// Run one tick: claim due jobs, execute them, then check settlement.
    pub fn tick(&self) -> TickReport {
        let mut report = TickReport::default();

        if self
            .running
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            debug!("previous tick still running, skipping this one");
            report.skipped = true;
            return report;
        }
        let _guard = TickGuard(&self.running);

        let now = self.clock.now();
        let due = match self.jobs.claim_due(now, self.config.batch_size) {
            Ok(due) => due,
            Err(err) => {
                warn!(error = %err, "failed to claim due jobs");
                return report;
            }
        };
        report.claimed = due.len();

        for job in &due {
            match self.execute(job) {
                Ok(JobOutcome::Completed) => report.completed += 1,
                Ok(JobOutcome::Retried) => report.retried += 1,
                Ok(JobOutcome::Failed) => report.failed += 1,
                Err(err) => {
                    // Remaining claimed jobs stay InProgress for reclaim or
                    // inspection; the next tick re-scans.
                    warn!(
                        job_id = %job.id,
                        error = %err,
                        "store unavailable, abandoning the rest of this tick"
                    );
                    break;
                }
            }
        }

        match self.detector.check_settled_batches() {
            Ok(notified) => report.notified = notified,
            Err(err) => warn!(error = %err, "settlement check failed"),
        }

        report
    }

    /// Execute one claimed job. `Err` means the job store itself failed;
    /// generation errors are absorbed into the job's retry/failure state.
    fn execute(&self, job: &Job) -> Result<JobOutcome, StoreError> {
        debug!(job_id = %job.id, topic = %job.topic, retry_count = job.retry_count, "executing job");

        match self.generator.generate_with_backoff(&job.topic) {
            Ok(generation) => {
                self.jobs.complete(job.id, &generation.text)?;
                // Quota bookkeeping is best-effort; a hiccup here must not
                // fail an already-completed job.
                if let Err(err) = self.quota.increment_generated() {
                    warn!(job_id = %job.id, error = %err, "failed to bump quota counter");
                }
                if let Err(err) = self.quota.mark_seed_used(job.seed_id) {
                    warn!(job_id = %job.id, error = %err, "failed to mark seed used");
                }
                info!(
                    job_id = %job.id,
                    provider = %generation.provider,
                    attempts = generation.attempts.len(),
                    "job completed"
                );
                Ok(JobOutcome::Completed)
            }
            Err(err) if job.can_retry() => {
                let next_run = self.clock.now() + self.config.retry_delay;
                warn!(
                    job_id = %job.id,
                    error = %err,
                    retry = job.retry_count + 1,
                    max_retries = job.max_retries,
                    "job failed, re-queued"
                );
                self.jobs.retry(job.id, next_run)?;
                Ok(JobOutcome::Retried)
            }
            Err(err) => {
                warn!(job_id = %job.id, error = %err, "job failed terminally");
                self.jobs.fail(job.id, &err.to_string())?;
                Ok(JobOutcome::Failed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobSpec, JobStatus};
    use crate::quota::GenerationQuota;
    use crate::store::{InMemoryJobStore, InMemoryQuotaStore};
    use crate::testing::CollectingSink;
    use chrono::{DateTime, NaiveTime, TimeZone, Utc};
    use genpress_core::{ManualClock, SeedId};
    use genpress_providers::testing::{RecordingProvider, ScriptedCall};
    use genpress_providers::{FallbackClient, GenerationError, TextProvider};
    use std::sync::mpsc;
    use std::time::Duration as StdDuration;

    fn nine_am() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()
    }

    fn quota_store(seed_ids: &mut Vec<SeedId>) -> Arc<InMemoryQuotaStore> {
        let quota = GenerationQuota::new(
            10,
            4,
            NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            ["first topic", "second topic"].map(String::from),
        );
        *seed_ids = quota.seeds.iter().map(|s| s.id).collect();
        Arc::new(InMemoryQuotaStore::new(quota))
    }

    fn worker_with_providers(
        jobs: Arc<InMemoryJobStore>,
        quota: Arc<InMemoryQuotaStore>,
        clock: Arc<ManualClock>,
        providers: Vec<Box<dyn TextProvider>>,
    ) -> Worker {
        let client = FallbackClient::new(providers, clock.clone())
            .with_inter_provider_delay(StdDuration::ZERO);
        let generator = BackoffOrchestrator::new(client, clock.clone());
        let detector = SettlementDetector::new(jobs.clone(), Arc::new(CollectingSink::new()));
        Worker::new(jobs, quota, generator, detector, clock)
    }

    #[test]
    fn completes_due_job_and_books_quota() {
        let jobs = Arc::new(InMemoryJobStore::new());
        let mut seed_ids = Vec::new();
        let quota = quota_store(&mut seed_ids);
        let clock = Arc::new(ManualClock::new(nine_am()));
        let log = RecordingProvider::shared_log();
        let worker = worker_with_providers(
            jobs.clone(),
            quota.clone(),
            clock.clone(),
            vec![Box::new(RecordingProvider::new("alpha", ScriptedCall::Succeed, log))],
        );

        let job = jobs
            .create(JobSpec::new(genpress_core::BatchId::new(), seed_ids[0], "first topic", nine_am()))
            .unwrap();

        let report = worker.tick();

        assert_eq!(report.claimed, 1);
        assert_eq!(report.completed, 1);
        let job = jobs.get(job.id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.result_ref.is_some());

        let q = quota.active().unwrap().unwrap();
        assert_eq!(q.generated_count, 1);
        assert!(q.seeds[0].used);
        assert!(!q.seeds[1].used);
    }

    #[test]
    fn job_retries_until_exhaustion_then_fails_terminally() {
        let jobs = Arc::new(InMemoryJobStore::new());
        let mut seed_ids = Vec::new();
        let quota = quota_store(&mut seed_ids);
        let clock = Arc::new(ManualClock::new(nine_am()));
        let log = RecordingProvider::shared_log();
        let worker = worker_with_providers(
            jobs.clone(),
            quota,
            clock.clone(),
            vec![Box::new(RecordingProvider::new("alpha", ScriptedCall::Retryable, log))],
        );

        let job = jobs
            .create(JobSpec::new(genpress_core::BatchId::new(), seed_ids[0], "first topic", nine_am()))
            .unwrap();

        // Initial execution plus three job-level retries.
        let mut terminal_failures = 0;
        for _ in 0..6 {
            let report = worker.tick();
            terminal_failures += report.failed;
            clock.advance(StdDuration::from_secs(5 * 60));
        }

        assert_eq!(terminal_failures, 1);
        let job = jobs.get(job.id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.retry_count, job.max_retries);
        assert!(job.failure_reason.as_deref().unwrap().contains("busy"));
    }

    #[test]
    fn one_bad_job_does_not_stop_the_rest_of_the_tick() {
        struct TopicSensitive;
        impl TextProvider for TopicSensitive {
            fn name(&self) -> &str {
                "picky"
            }
            fn call(&self, prompt: &str) -> Result<String, GenerationError> {
                if prompt.contains("second") {
                    Err(GenerationError::fatal("picky", "content policy rejection"))
                } else {
                    Ok(format!("generated: {prompt}"))
                }
            }
        }

        let jobs = Arc::new(InMemoryJobStore::new());
        let mut seed_ids = Vec::new();
        let quota = quota_store(&mut seed_ids);
        let clock = Arc::new(ManualClock::new(nine_am()));
        let worker = worker_with_providers(
            jobs.clone(),
            quota,
            clock,
            vec![Box::new(TopicSensitive)],
        );

        let batch = genpress_core::BatchId::new();
        let mut bad_spec = JobSpec::new(batch, seed_ids[1], "second topic", nine_am());
        bad_spec.max_retries = 0;
        let bad = jobs.create(bad_spec).unwrap();
        // Both due at the same tick so the fatal job runs alongside the good one.
        let good = jobs
            .create(JobSpec::new(batch, seed_ids[0], "first topic", nine_am()))
            .unwrap();

        let report = worker.tick();

        assert_eq!(report.claimed, 2);
        assert_eq!(report.completed, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(jobs.get(bad.id).unwrap().unwrap().status, JobStatus::Failed);
        assert_eq!(jobs.get(good.id).unwrap().unwrap().status, JobStatus::Completed);
        // Both jobs terminal, so the batch settled within the same tick.
        assert_eq!(report.notified, vec![batch]);
    }

    #[test]
    fn overlapping_tick_is_skipped_not_queued() {
        struct GateProvider {
            entered: mpsc::Sender<()>,
            gate: std::sync::Mutex<mpsc::Receiver<()>>,
        }
        impl TextProvider for GateProvider {
            fn name(&self) -> &str {
                "gate"
            }
            fn call(&self, prompt: &str) -> Result<String, GenerationError> {
                let _ = self.entered.send(());
                let _ = self.gate.lock().unwrap().recv();
                Ok(format!("generated: {prompt}"))
            }
        }

        let jobs = Arc::new(InMemoryJobStore::new());
        let mut seed_ids = Vec::new();
        let quota = quota_store(&mut seed_ids);
        let clock = Arc::new(ManualClock::new(nine_am()));

        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let worker = Arc::new(worker_with_providers(
            jobs.clone(),
            quota,
            clock,
            vec![Box::new(GateProvider {
                entered: entered_tx,
                gate: std::sync::Mutex::new(release_rx),
            })],
        ));

        jobs.create(JobSpec::new(genpress_core::BatchId::new(), seed_ids[0], "first topic", nine_am()))
            .unwrap();

        let background = {
            let worker = worker.clone();
            std::thread::spawn(move || worker.tick())
        };

        // Wait until the first tick is mid-execution, then overlap it.
        entered_rx.recv().unwrap();
        let overlapping = worker.tick();
        assert!(overlapping.skipped);
        assert_eq!(overlapping.claimed, 0);

        release_tx.send(()).unwrap();
        let first = background.join().unwrap();
        assert_eq!(first.claimed, 1);
        assert_eq!(first.completed, 1);

        // The flag is released afterwards; a fresh tick runs normally.
        assert!(!worker.tick().skipped);
    }
}
