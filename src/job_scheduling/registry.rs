//! Job registry built once at startup

use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

use super::job_executor::{CommandJob, HttpCheckJob};
use super::types::{JobBody, JobSpec};
use crate::config::defaults::MAX_INTERVAL;
use crate::config::{Config, JobAction, JobConfig};
use crate::errors::{AppError, AppResult};
use crate::utils::human_format::format_interval;

/// Fixed set of jobs; never changes after construction
#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
    jobs: Vec<JobSpec>,
}

impl JobRegistry {
    pub fn new(jobs: Vec<JobSpec>) -> AppResult<Self> {
        let mut seen = HashSet::new();
        for job in &jobs {
            if !seen.insert(job.name.clone()) {
                return Err(AppError::invalid_job(&job.name, "duplicate job name"));
            }
            if job.interval.is_zero() {
                return Err(AppError::invalid_job(&job.name, "interval must be positive"));
            }
            if job.interval > MAX_INTERVAL {
                return Err(AppError::invalid_job(
                    &job.name,
                    format!("interval must not exceed {}", format_interval(MAX_INTERVAL)),
                ));
            }
        }
        Ok(Self { jobs })
    }

    /// Build every configured job, enabled or not
    pub fn from_config(config: &Config) -> AppResult<Self> {
        let jobs = config
            .jobs
            .iter()
            .map(job_spec_from_config)
            .collect::<AppResult<Vec<_>>>()?;
        Self::new(jobs)
    }

    pub fn jobs(&self) -> &[JobSpec] {
        &self.jobs
    }

    pub fn get(&self, name: &str) -> Option<&JobSpec> {
        self.jobs.iter().find(|job| job.name == name)
    }

    pub fn enabled(&self) -> impl Iterator<Item = &JobSpec> {
        self.jobs.iter().filter(|job| job.enabled)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn log_summary(&self) {
        info!("Scheduler configuration:");
        for job in &self.jobs {
            if job.enabled {
                info!("  {}: every {}", job.name, format_interval(job.interval));
            } else {
                info!("  {}: disabled", job.name);
            }
        }
    }
}

fn job_spec_from_config(job: &JobConfig) -> AppResult<JobSpec> {
    let body: Arc<dyn JobBody> = match &job.action {
        JobAction::Command {
            program,
            args,
            working_dir,
            env,
        } => Arc::new(
            CommandJob::new(program.clone(), args.clone())
                .with_working_dir(working_dir.clone())
                .with_env(env.clone()),
        ),
        JobAction::Http { url, timeout } => Arc::new(
            HttpCheckJob::new(url.clone(), *timeout)
                .map_err(|e| AppError::invalid_job(&job.name, e.to_string()))?,
        ),
    };

    Ok(JobSpec::new(job.name.clone(), job.interval(), body)
        .enabled(job.enabled)
        .run_immediately(job.run_immediately))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn command_job(name: &str, enabled: bool) -> JobConfig {
        JobConfig {
            name: name.to_string(),
            interval_minutes: 15,
            enabled,
            run_immediately: false,
            action: JobAction::Command {
                program: "true".to_string(),
                args: Vec::new(),
                working_dir: None,
                env: BTreeMap::new(),
            },
        }
    }

    #[test]
    fn test_from_config_keeps_disabled_jobs() {
        let config = Config {
            jobs: vec![
                command_job("power_to_choose", true),
                command_job("villa_del_arco", false),
                JobConfig {
                    name: "status_page".to_string(),
                    interval_minutes: 5,
                    enabled: true,
                    run_immediately: true,
                    action: JobAction::Http {
                        url: "http://127.0.0.1:9/status".to_string(),
                        timeout: Duration::from_secs(1),
                    },
                },
            ],
            ..Config::default()
        };

        let registry = JobRegistry::from_config(&config).unwrap();
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.enabled().count(), 2);

        let ptc = registry.get("power_to_choose").unwrap();
        assert_eq!(ptc.interval, Duration::from_secs(15 * 60));
        assert!(!ptc.run_immediately);
        assert!(registry.get("status_page").unwrap().run_immediately);
        assert!(!registry.get("villa_del_arco").unwrap().enabled);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let jobs = vec![
            JobSpec::from_fn("alaska", Duration::from_secs(1), || async { Ok(()) }),
            JobSpec::from_fn("alaska", Duration::from_secs(2), || async { Ok(()) }),
        ];
        assert!(JobRegistry::new(jobs).is_err());
    }

    #[test]
    fn test_oversized_interval_rejected() {
        let at_cap = vec![JobSpec::from_fn("yearly", MAX_INTERVAL, || async { Ok(()) })];
        assert!(JobRegistry::new(at_cap).is_ok());

        let huge = Duration::from_secs(1_000_000_000_000 * 60);
        let jobs = vec![JobSpec::from_fn("big", huge, || async { Ok(()) })];
        let err = JobRegistry::new(jobs).unwrap_err();
        assert!(err.to_string().contains("must not exceed"));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let jobs = vec![JobSpec::from_fn("alaska", Duration::ZERO, || async { Ok(()) })];
        assert!(JobRegistry::new(jobs).is_err());
    }
}
