//! Job scheduling type definitions

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::errors::JobResult;

/// A unit of recurring work
///
/// The scheduler never looks inside a body; it only observes whether `run`
/// returned `Ok` or `Err` (or panicked) and how long it took.
#[async_trait]
pub trait JobBody: Send + Sync {
    async fn run(&self) -> JobResult<()>;
}

/// Adapter turning an async closure into a [`JobBody`]
pub struct FnJob<F> {
    f: F,
}

impl<F, Fut> FnJob<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = JobResult<()>> + Send,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> JobBody for FnJob<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = JobResult<()>> + Send,
{
    async fn run(&self) -> JobResult<()> {
        (self.f)().await
    }
}

/// Immutable description of a scheduled job
#[derive(Clone)]
pub struct JobSpec {
    /// Unique job name, used as the key everywhere
    pub name: String,
    /// Period between ticks
    pub interval: Duration,
    /// Disabled jobs are registered but never ticked
    pub enabled: bool,
    /// Fire once shortly after startup instead of waiting a full interval
    pub run_immediately: bool,
    pub body: Arc<dyn JobBody>,
}

impl JobSpec {
    pub fn new(name: impl Into<String>, interval: Duration, body: Arc<dyn JobBody>) -> Self {
        Self {
            name: name.into(),
            interval,
            enabled: true,
            run_immediately: false,
            body,
        }
    }

    /// Build a job from an async closure
    pub fn from_fn<F, Fut>(name: impl Into<String>, interval: Duration, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = JobResult<()>> + Send + 'static,
    {
        Self::new(name, interval, Arc::new(FnJob::new(f)))
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn run_immediately(mut self, run_immediately: bool) -> Self {
        self.run_immediately = run_immediately;
        self
    }
}

impl fmt::Debug for JobSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobSpec")
            .field("name", &self.name)
            .field("interval", &self.interval)
            .field("enabled", &self.enabled)
            .field("run_immediately", &self.run_immediately)
            .finish_non_exhaustive()
    }
}

/// Status of a job's most recent attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobStatus {
    NeverRun,
    Running,
    Success,
    Failure,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::NeverRun => "never-run",
            JobStatus::Running => "running",
            JobStatus::Success => "success",
            JobStatus::Failure => "failure",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one invocation as seen by the stats collector
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Success,
    Failure { error: String },
    /// Abandoned at shutdown; counted as a failure but flagged separately
    Aborted,
}

impl JobOutcome {
    pub fn failure(error: impl Into<String>) -> Self {
        JobOutcome::Failure {
            error: error.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Success)
    }
}

/// Identifier of one invocation, unique per scheduler
pub type RunId = u64;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::JobError;

    #[test]
    fn test_job_status_serializes_kebab_case() {
        assert_eq!(
            serde_json::to_value(JobStatus::NeverRun).unwrap(),
            serde_json::json!("never-run")
        );
        assert_eq!(JobStatus::Failure.to_string(), "failure");
    }

    #[test]
    fn test_job_spec_builder_defaults() {
        let spec = JobSpec::from_fn("alaska_award", Duration::from_secs(60), || async { Ok(()) });
        assert!(spec.enabled);
        assert!(!spec.run_immediately);

        let spec = spec.enabled(false).run_immediately(true);
        assert!(!spec.enabled);
        assert!(spec.run_immediately);
        assert!(format!("{spec:?}").contains("alaska_award"));
    }

    #[tokio::test]
    async fn test_fn_job_propagates_result() {
        let ok = FnJob::new(|| async { Ok(()) });
        assert!(ok.run().await.is_ok());

        let failing = FnJob::new(|| async { Err(JobError::failed("threshold page missing")) });
        let err = failing.run().await.unwrap_err();
        assert_eq!(err.to_string(), "threshold page missing");
    }
}
