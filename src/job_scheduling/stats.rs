//! Stats collector
//!
//! Sole owner of per-job [`JobState`] and the process-wide [`ServiceStats`].
//! Every mutation goes through one of the `record_*` methods, each of which
//! takes the write lock once, so a [`StatsSnapshot`] never observes a
//! half-applied update (`total_runs == successful_runs + failed_runs` always
//! holds in a snapshot). The lock is never held while a job body runs.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

use super::types::{JobOutcome, JobSpec, JobStatus, RunId};
use crate::errors::JobError;

/// Failures kept for the `/health` report
const MAX_RECENT_ERRORS: usize = 10;

/// Mutable per-job record
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobState {
    pub name: String,
    pub enabled: bool,
    #[serde(skip)]
    pub interval: Duration,
    pub last_start_time: Option<DateTime<Utc>>,
    pub last_end_time: Option<DateTime<Utc>>,
    pub last_status: JobStatus,
    pub last_error: Option<String>,
    /// Last failure was a forced abort at shutdown, not a job error
    pub aborted: bool,
    pub next_scheduled_time: Option<DateTime<Utc>>,
    pub run_count: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub skipped_ticks: u64,
    #[serde(skip)]
    current_run: Option<RunId>,
}

impl JobState {
    fn new(spec: &JobSpec) -> Self {
        Self {
            name: spec.name.clone(),
            enabled: spec.enabled,
            interval: spec.interval,
            last_start_time: None,
            last_end_time: None,
            last_status: JobStatus::NeverRun,
            last_error: None,
            aborted: false,
            next_scheduled_time: None,
            run_count: 0,
            success_count: 0,
            failure_count: 0,
            skipped_ticks: 0,
            current_run: None,
        }
    }

    /// Run id of the invocation currently marked running
    pub fn current_run(&self) -> Option<RunId> {
        self.current_run
    }
}

/// Process-wide aggregate counters
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStats {
    pub start_time: DateTime<Utc>,
    pub total_runs: u64,
    pub successful_runs: u64,
    pub failed_runs: u64,
    /// When the most recent invocation of any job finished
    pub last_run_at: Option<DateTime<Utc>>,
}

impl ServiceStats {
    fn new() -> Self {
        Self {
            start_time: Utc::now(),
            total_runs: 0,
            successful_runs: 0,
            failed_runs: 0,
            last_run_at: None,
        }
    }

    /// Percentage of finished runs that succeeded, 0 when nothing ran yet
    pub fn success_rate_percent(&self) -> f64 {
        if self.total_runs == 0 {
            0.0
        } else {
            self.successful_runs as f64 / self.total_runs as f64 * 100.0
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentError {
    pub job: String,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

/// Immutable point-in-time copy of all stats
#[derive(Debug, Clone)]
pub struct StatsSnapshot {
    pub taken_at: DateTime<Utc>,
    pub service: ServiceStats,
    pub jobs: BTreeMap<String, JobState>,
    /// Oldest first
    pub recent_errors: Vec<RecentError>,
}

impl StatsSnapshot {
    pub fn uptime(&self) -> Duration {
        (self.taken_at - self.service.start_time)
            .to_std()
            .unwrap_or_default()
    }

    /// True when any job's most recent attempt failed
    pub fn is_degraded(&self) -> bool {
        self.jobs
            .values()
            .any(|job| job.last_status == JobStatus::Failure)
    }
}

struct StatsInner {
    service: ServiceStats,
    jobs: HashMap<String, JobState>,
    recent_errors: VecDeque<RecentError>,
}

/// Shared handle to the collector; cheap to clone
#[derive(Clone)]
pub struct StatsCollector {
    inner: Arc<RwLock<StatsInner>>,
}

impl StatsCollector {
    /// Create a collector with one never-run entry per job
    pub fn new(jobs: &[JobSpec]) -> Self {
        let jobs = jobs
            .iter()
            .map(|spec| (spec.name.clone(), JobState::new(spec)))
            .collect();

        Self {
            inner: Arc::new(RwLock::new(StatsInner {
                service: ServiceStats::new(),
                jobs,
                recent_errors: VecDeque::with_capacity(MAX_RECENT_ERRORS),
            })),
        }
    }

    /// Mark `job_name` running under `run_id`
    pub async fn record_start(&self, job_name: &str, run_id: RunId) {
        let mut inner = self.inner.write().await;
        if let Some(job) = inner.jobs.get_mut(job_name) {
            job.last_status = JobStatus::Running;
            job.last_start_time = Some(Utc::now());
            job.last_error = None;
            job.aborted = false;
            job.current_run = Some(run_id);
        }
    }

    /// Apply the outcome of run `run_id`
    ///
    /// Returns false and changes nothing when `run_id` is no longer the
    /// job's current run, e.g. a run abandoned at shutdown finishing late.
    pub async fn record_end(&self, job_name: &str, run_id: RunId, outcome: JobOutcome) -> bool {
        let now = Utc::now();
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;

        let Some(job) = inner.jobs.get_mut(job_name) else {
            return false;
        };
        if job.current_run != Some(run_id) {
            debug!(job = %job_name, run_id, "Ignoring outcome of a run that is no longer current");
            return false;
        }

        job.current_run = None;
        job.last_end_time = Some(now);
        job.next_scheduled_time = next_fire_time(now, job.interval);
        job.run_count += 1;
        inner.service.total_runs += 1;
        inner.service.last_run_at = Some(now);

        match outcome {
            JobOutcome::Success => {
                job.last_status = JobStatus::Success;
                job.last_error = None;
                job.success_count += 1;
                inner.service.successful_runs += 1;
            }
            JobOutcome::Failure { error } => {
                job.last_status = JobStatus::Failure;
                job.failure_count += 1;
                inner.service.failed_runs += 1;
                push_recent_error(&mut inner.recent_errors, job_name, &error, now);
                job.last_error = Some(error);
            }
            JobOutcome::Aborted => {
                let error = JobError::AbortedOnShutdown.to_string();
                job.last_status = JobStatus::Failure;
                job.aborted = true;
                job.failure_count += 1;
                inner.service.failed_runs += 1;
                push_recent_error(&mut inner.recent_errors, job_name, &error, now);
                job.last_error = Some(error);
            }
        }

        true
    }

    /// Count a tick that was skipped because the previous run was still going
    pub async fn record_skip(&self, job_name: &str) {
        let mut inner = self.inner.write().await;
        if let Some(job) = inner.jobs.get_mut(job_name) {
            job.skipped_ticks += 1;
        }
    }

    /// Record when the job is next expected to fire
    pub async fn record_scheduled(&self, job_name: &str, at: DateTime<Utc>) {
        let mut inner = self.inner.write().await;
        if let Some(job) = inner.jobs.get_mut(job_name) {
            job.next_scheduled_time = Some(at);
        }
    }

    /// Clear the next fire time of every job; used once timers are cancelled
    pub async fn clear_schedule(&self) {
        let mut inner = self.inner.write().await;
        for job in inner.jobs.values_mut() {
            job.next_scheduled_time = None;
        }
    }

    pub async fn snapshot(&self) -> StatsSnapshot {
        let inner = self.inner.read().await;
        StatsSnapshot {
            taken_at: Utc::now(),
            service: inner.service.clone(),
            jobs: inner
                .jobs
                .iter()
                .map(|(name, state)| (name.clone(), state.clone()))
                .collect(),
            recent_errors: inner.recent_errors.iter().cloned().collect(),
        }
    }

    pub async fn job(&self, job_name: &str) -> Option<JobState> {
        self.inner.read().await.jobs.get(job_name).cloned()
    }
}

/// `now + interval`, or `None` when it falls outside the representable range
pub fn next_fire_time(now: DateTime<Utc>, interval: Duration) -> Option<DateTime<Utc>> {
    chrono::Duration::from_std(interval)
        .ok()
        .and_then(|interval| now.checked_add_signed(interval))
}

fn push_recent_error(
    recent_errors: &mut VecDeque<RecentError>,
    job_name: &str,
    error: &str,
    timestamp: DateTime<Utc>,
) {
    if recent_errors.len() == MAX_RECENT_ERRORS {
        recent_errors.pop_front();
    }
    recent_errors.push_back(RecentError {
        job: job_name.to_string(),
        error: error.to_string(),
        timestamp,
    });
}
