//! Pipeline wiring and the background driver thread.
//!
//! One [`Pipeline`] is constructed at process start with its collaborators
//! injected; nothing in this crate reaches for global state. The driver
//! thread runs the planner on calendar-day changes (with a catch-up pass at
//! start) and the worker on every tick.

use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use tracing::{info, warn};

use genpress_core::Clock;
use genpress_providers::{BackoffOrchestrator, BackoffPolicy, FallbackClient, TextProvider};

use crate::planner::{DailyPlanner, PlannerConfig};
use crate::settlement::{NotificationSink, SettlementDetector};
use crate::store::{JobStore, QuotaStore};
use crate::worker::{Worker, WorkerConfig};

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    /// Worker tick period.
    pub tick_period: Duration,
    /// Pause before re-attempting a failed daily planning pass. Coarser than
    /// the tick period so a down quota store is not polled every tick.
    pub replan_retry: ChronoDuration,
    pub planner: PlannerConfig,
    pub worker: WorkerConfig,
    pub backoff: BackoffPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tick_period: Duration::from_secs(60),
            replan_retry: ChronoDuration::minutes(5),
            planner: PlannerConfig::default(),
            worker: WorkerConfig::default(),
            backoff: BackoffPolicy::default(),
        }
    }
}

/// The assembled content-generation pipeline.
pub struct Pipeline {
    planner: DailyPlanner,
    worker: Worker,
    clock: Arc<dyn Clock>,
    tick_period: Duration,
    replan_retry: ChronoDuration,
}

impl Pipeline {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        quota: Arc<dyn QuotaStore>,
        sink: Arc<dyn NotificationSink>,
        providers: Vec<Box<dyn TextProvider>>,
        clock: Arc<dyn Clock>,
        config: PipelineConfig,
    ) -> Self {
        let client = FallbackClient::new(providers, clock.clone());
        let generator = BackoffOrchestrator::new(client, clock.clone()).with_policy(config.backoff);
        let detector = SettlementDetector::new(jobs.clone(), sink);
        let planner =
            DailyPlanner::new(jobs.clone(), quota.clone(), clock.clone()).with_config(config.planner);
        let worker =
            Worker::new(jobs, quota, generator, detector, clock.clone()).with_config(config.worker);

        Self {
            planner,
            worker,
            clock,
            tick_period: config.tick_period,
            replan_retry: config.replan_retry,
        }
    }

    /// Direct access for callers that drive the pipeline themselves
    /// (tests, embedders with their own timers).
    pub fn planner(&self) -> &DailyPlanner {
        &self.planner
    }

    pub fn worker(&self) -> &Worker {
        &self.worker
    }

    /// Start the background driver thread.
    pub fn spawn(self) -> PipelineHandle {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let join = thread::Builder::new()
            .name("genpress-pipeline".to_string())
            .spawn(move || {
                driver_loop(self, shutdown_rx);
            })
            .expect("failed to spawn pipeline thread");

        PipelineHandle {
            shutdown: shutdown_tx,
            join: Some(join),
        }
    }
}

/// Handle to a running pipeline.
#[derive(Debug)]
pub struct PipelineHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl PipelineHandle {
    /// Request graceful shutdown and wait for the driver thread.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

/// Decides when the daily planning pass runs: once per calendar day on
/// success, and after a configured pause on failure rather than on every
/// tick.
struct PlanSchedule {
    planned_for: Option<NaiveDate>,
    next_attempt: Option<DateTime<Utc>>,
    retry_after: ChronoDuration,
}

impl PlanSchedule {
    fn new(retry_after: ChronoDuration) -> Self {
        Self {
            planned_for: None,
            next_attempt: None,
            retry_after,
        }
    }

    fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.planned_for != Some(now.date_naive())
            && self.next_attempt.is_none_or(|at| now >= at)
    }

    fn succeeded(&mut self, day: NaiveDate) {
        self.planned_for = Some(day);
        self.next_attempt = None;
    }

    fn failed(&mut self, now: DateTime<Utc>) {
        self.next_attempt = Some(now + self.retry_after);
    }
}

fn driver_loop(pipeline: Pipeline, shutdown: mpsc::Receiver<()>) {
    info!("pipeline started");

    // Starts due, which doubles as the catch-up pass at process start.
    let mut plan = PlanSchedule::new(pipeline.replan_retry);

    loop {
        let now = pipeline.clock.now();
        if plan.is_due(now) {
            let today = now.date_naive();
            match pipeline.planner.plan_daily_jobs() {
                Ok(report) => {
                    info!(created = report.created, %today, "daily planning pass");
                    plan.succeeded(today);
                }
                Err(err) => {
                    warn!(error = %err, "daily planning failed, deferring retry");
                    plan.failed(now);
                }
            }
        }

        pipeline.worker.tick();

        match shutdown.recv_timeout(pipeline.tick_period) {
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
            Err(mpsc::RecvTimeoutError::Timeout) => {}
        }
    }

    info!("pipeline stopped");
}
