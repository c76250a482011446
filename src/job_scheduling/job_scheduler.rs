//! Scheduler core: one timer task per enabled job

use chrono::Utc;
use futures::FutureExt;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::time::{Duration, Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use super::guard::ExecutionGuard;
use super::registry::JobRegistry;
use super::stats::{StatsCollector, next_fire_time};
use super::types::{JobBody, JobOutcome, JobSpec};
use crate::config::defaults::DEFAULT_SETTLE_DELAY;
use crate::errors::JobError;
use crate::utils::human_format::format_interval;

/// Drives every enabled job on its own interval without overlap
pub struct JobScheduler {
    registry: JobRegistry,
    stats: StatsCollector,
    guards: HashMap<String, ExecutionGuard>,
    settle_delay: Duration,
    cancellation_token: CancellationToken,
    /// Per-job timer loops
    timers: TaskTracker,
    /// In-flight job bodies
    runs: TaskTracker,
    started: AtomicBool,
}

/// What happened while stopping the scheduler
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StopReport {
    /// Jobs abandoned because they outlived the drain timeout
    pub aborted: Vec<String>,
}

impl StopReport {
    pub fn is_clean(&self) -> bool {
        self.aborted.is_empty()
    }
}

/// Summary of a single pass over all enabled jobs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SinglePassReport {
    pub successes: usize,
    pub failures: usize,
}

impl SinglePassReport {
    pub fn all_succeeded(&self) -> bool {
        self.failures == 0
    }
}

impl JobScheduler {
    pub fn new(registry: JobRegistry, stats: StatsCollector) -> Self {
        let guards = registry
            .jobs()
            .iter()
            .map(|job| (job.name.clone(), ExecutionGuard::new()))
            .collect();

        Self {
            registry,
            stats,
            guards,
            settle_delay: DEFAULT_SETTLE_DELAY,
            cancellation_token: CancellationToken::new(),
            timers: TaskTracker::new(),
            runs: TaskTracker::new(),
            started: AtomicBool::new(false),
        }
    }

    /// Delay before the startup run of `run_immediately` jobs
    pub fn with_settle_delay(mut self, settle_delay: Duration) -> Self {
        self.settle_delay = settle_delay;
        self
    }

    pub fn stats(&self) -> &StatsCollector {
        &self.stats
    }

    pub fn guard(&self, job_name: &str) -> Option<&ExecutionGuard> {
        self.guards.get(job_name)
    }

    /// Arm one timer per enabled job
    ///
    /// Must be called from within a tokio runtime. Calling it again is a no-op.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("Job scheduler already started");
            return;
        }

        let mut scheduled = 0;
        for spec in self.registry.jobs() {
            if !spec.enabled {
                info!(job = %spec.name, "Job is disabled, not scheduling");
                continue;
            }

            let timer = JobTimer {
                spec: spec.clone(),
                guard: self.guards[&spec.name].clone(),
                stats: self.stats.clone(),
                runs: self.runs.clone(),
                settle_delay: self.settle_delay,
            };
            info!(
                job = %spec.name,
                run_immediately = spec.run_immediately,
                "Scheduling job to run every {}",
                format_interval(spec.interval)
            );
            self.timers.spawn(timer.run(self.cancellation_token.clone()));
            scheduled += 1;
        }

        if scheduled == 0 {
            warn!("No jobs are enabled; scheduler is idle");
        }
        info!(job_count = scheduled, "Job scheduler started");
    }

    /// Cancel all timers, then wait up to `drain_timeout` for running jobs
    ///
    /// Jobs still running afterwards are abandoned: their guard is released
    /// and their state is marked failed with an "aborted on shutdown" error.
    /// The abandoned futures are not interrupted.
    pub async fn stop(&self, drain_timeout: Duration) -> StopReport {
        info!("Stopping job scheduler, no new runs will start");
        self.cancellation_token.cancel();
        self.timers.close();
        self.timers.wait().await;
        self.stats.clear_schedule().await;

        self.runs.close();
        let report = self.drain(drain_timeout).await;

        // Runs finishing during the drain record a next fire time
        self.stats.clear_schedule().await;
        if report.is_clean() {
            info!("Job scheduler stopped");
        } else {
            warn!(aborted = report.aborted.len(), "Job scheduler stopped with abandoned jobs");
        }
        report
    }

    async fn drain(&self, drain_timeout: Duration) -> StopReport {
        let in_flight = self.runs.len();
        if in_flight == 0 {
            return StopReport::default();
        }

        info!(
            in_flight,
            "Waiting up to {} for running jobs to finish",
            humantime::format_duration(drain_timeout)
        );
        if tokio::time::timeout(drain_timeout, self.runs.wait())
            .await
            .is_ok()
        {
            info!("All running jobs finished");
            return StopReport::default();
        }

        let mut report = StopReport::default();
        for spec in self.registry.jobs() {
            let Some(run_id) = self.guards[&spec.name].force_release() else {
                continue;
            };
            let marked = self
                .stats
                .record_end(&spec.name, run_id, JobOutcome::Aborted)
                .await;
            if marked {
                warn!(job = %spec.name, run_id, "Job still running after drain timeout, abandoning it");
                report.aborted.push(spec.name.clone());
            }
        }
        report
    }

    /// Run one job immediately, outside its timer
    ///
    /// Goes through the same guard and stats path as a tick. Returns `None`
    /// when the job is unknown or already running.
    pub async fn run_once(&self, job_name: &str) -> Option<JobOutcome> {
        let spec = self.registry.get(job_name)?;
        let permit = self.guards.get(job_name)?.try_acquire()?;
        let run_id = permit.run_id();

        self.stats.record_start(job_name, run_id).await;
        let outcome = execute_body(job_name, Arc::clone(&spec.body)).await;
        self.stats.record_end(job_name, run_id, outcome.clone()).await;
        Some(outcome)
    }

    /// Run every enabled job once, one after another
    pub async fn run_enabled_once(&self) -> SinglePassReport {
        let mut report = SinglePassReport::default();
        let names: Vec<String> = self.registry.enabled().map(|job| job.name.clone()).collect();

        for name in names {
            info!(job = %name, "Running job");
            match self.run_once(&name).await {
                Some(outcome) if outcome.is_success() => report.successes += 1,
                _ => report.failures += 1,
            }
        }

        info!(
            "Single pass complete. Success: {}, Failures: {}",
            report.successes, report.failures
        );
        report
    }
}

/// Timer loop for one job
struct JobTimer {
    spec: JobSpec,
    guard: ExecutionGuard,
    stats: StatsCollector,
    runs: TaskTracker,
    settle_delay: Duration,
}

impl JobTimer {
    async fn run(self, cancellation_token: CancellationToken) {
        let interval = self.spec.interval;
        let mut ticker = interval_at(Instant::now() + interval, interval);
        // Missed ticks are dropped, never queued
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        if self.spec.run_immediately {
            self.record_next_fire(self.settle_delay).await;
            tokio::select! {
                _ = tokio::time::sleep(self.settle_delay) => {
                    info!(job = %self.spec.name, "Running job immediately on startup");
                    self.tick().await;
                }
                _ = cancellation_token.cancelled() => {
                    debug!(job = %self.spec.name, "Timer cancelled before startup run");
                    return;
                }
            }
        } else {
            self.record_next_fire(interval).await;
        }

        loop {
            tokio::select! {
                biased;
                _ = cancellation_token.cancelled() => {
                    info!(job = %self.spec.name, "Shutting down job timer");
                    break;
                }
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
    }

    async fn record_next_fire(&self, after: Duration) {
        if let Some(at) = next_fire_time(Utc::now(), after) {
            self.stats.record_scheduled(&self.spec.name, at).await;
        }
    }

    /// One timer firing: run the job unless its previous run is still going
    async fn tick(&self) {
        let Some(permit) = self.guard.try_acquire() else {
            info!(job = %self.spec.name, "Previous run still in progress, skipping tick");
            self.stats.record_skip(&self.spec.name).await;
            return;
        };

        let run_id = permit.run_id();
        self.stats.record_start(&self.spec.name, run_id).await;

        let name = self.spec.name.clone();
        let body = Arc::clone(&self.spec.body);
        let stats = self.stats.clone();
        self.runs.spawn(async move {
            let outcome = execute_body(&name, body).await;
            stats.record_end(&name, run_id, outcome).await;
            // Released only after the outcome is recorded
            drop(permit);
        });
    }
}

/// Invoke a job body, converting errors and panics into an outcome
async fn execute_body(job_name: &str, body: Arc<dyn JobBody>) -> JobOutcome {
    let started = std::time::Instant::now();
    info!(job = %job_name, "Starting job");

    let result = AssertUnwindSafe(body.run()).catch_unwind().await;
    let duration_ms = started.elapsed().as_millis() as u64;

    match result {
        Ok(Ok(())) => {
            info!(job = %job_name, duration_ms, "Job completed successfully");
            JobOutcome::Success
        }
        Ok(Err(e)) => {
            warn!(job = %job_name, duration_ms, error = %e, "Job failed");
            JobOutcome::failure(e.to_string())
        }
        Err(panic) => {
            let err = JobError::Panicked {
                message: panic_message(panic.as_ref()),
            };
            error!(job = %job_name, duration_ms, error = %err, "Job panicked");
            JobOutcome::failure(err.to_string())
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::JobError;
    use crate::job_scheduling::types::JobStatus;
    use std::sync::atomic::AtomicUsize;

    fn scheduler(jobs: Vec<JobSpec>) -> JobScheduler {
        let registry = JobRegistry::new(jobs).unwrap();
        let stats = StatsCollector::new(registry.jobs());
        JobScheduler::new(registry, stats)
    }

    #[test]
    fn test_panic_message_extraction() {
        let payload: Box<dyn Any + Send> = Box::new("selector not found");
        assert_eq!(panic_message(payload.as_ref()), "selector not found");

        let payload: Box<dyn Any + Send> = Box::new(String::from("bad row"));
        assert_eq!(panic_message(payload.as_ref()), "bad row");

        let payload: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic payload");
    }

    #[tokio::test]
    async fn test_run_once_records_success() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let scheduler = scheduler(vec![JobSpec::from_fn(
            "power_to_choose",
            Duration::from_secs(3600),
            move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            },
        )]);

        assert_eq!(scheduler.run_once("power_to_choose").await, Some(JobOutcome::Success));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let job = scheduler.stats().job("power_to_choose").await.unwrap();
        assert_eq!(job.last_status, JobStatus::Success);
        assert!(!scheduler.guard("power_to_choose").unwrap().is_held());
    }

    #[tokio::test]
    async fn test_run_once_unknown_or_busy() {
        let scheduler = scheduler(vec![JobSpec::from_fn(
            "villa_del_arco",
            Duration::from_secs(3600),
            || async { Ok(()) },
        )]);
        assert!(scheduler.run_once("missing").await.is_none());

        let _held = scheduler.guard("villa_del_arco").unwrap().try_acquire().unwrap();
        assert!(scheduler.run_once("villa_del_arco").await.is_none());
    }

    #[tokio::test]
    async fn test_panicking_body_is_recorded_as_failure() {
        let scheduler = scheduler(vec![JobSpec::from_fn(
            "alaska_award",
            Duration::from_secs(3600),
            || async {
                if true {
                    panic!("award table layout changed");
                }
                Ok(())
            },
        )]);

        let outcome = scheduler.run_once("alaska_award").await.unwrap();
        match outcome {
            JobOutcome::Failure { error } => {
                assert!(error.contains("award table layout changed"))
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(!scheduler.guard("alaska_award").unwrap().is_held());
    }

    #[tokio::test]
    async fn test_single_pass_skips_disabled_and_counts() {
        let scheduler = scheduler(vec![
            JobSpec::from_fn("ok", Duration::from_secs(60), || async { Ok(()) }),
            JobSpec::from_fn("broken", Duration::from_secs(60), || async {
                Err(JobError::failed("no rows"))
            }),
            JobSpec::from_fn("off", Duration::from_secs(60), || async { Ok(()) }).enabled(false),
        ]);

        let report = scheduler.run_enabled_once().await;
        assert_eq!(report, SinglePassReport { successes: 1, failures: 1 });
        assert!(!report.all_succeeded());

        let off = scheduler.stats().job("off").await.unwrap();
        assert_eq!(off.last_status, JobStatus::NeverRun);
    }

    #[tokio::test]
    async fn test_stop_without_start_is_clean() {
        let scheduler = scheduler(vec![JobSpec::from_fn(
            "ok",
            Duration::from_secs(60),
            || async { Ok(()) },
        )]);
        let report = scheduler.stop(Duration::from_secs(1)).await;
        assert!(report.is_clean());
    }
}
