use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::errors::{AppError, AppResult};

pub mod defaults;
pub mod duration_serde;

use defaults::*;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub health_check: HealthCheckConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub jobs: Vec<JobConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    #[serde(default = "default_health_check_enabled")]
    pub enabled: bool,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// How long shutdown waits for in-flight jobs before aborting them
    #[serde(with = "duration_serde::duration", default = "default_drain_timeout")]
    pub drain_timeout: Duration,
    /// Delay before the startup run of `run_immediately` jobs
    #[serde(with = "duration_serde::duration", default = "default_settle_delay")]
    pub settle_delay: Duration,
}

/// One scheduled job as written in the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub name: String,
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,
    #[serde(default = "default_job_enabled")]
    pub enabled: bool,
    #[serde(default = "default_run_immediately")]
    pub run_immediately: bool,
    pub action: JobAction,
}

/// What a job actually does when it fires
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobAction {
    /// Run an external program; exit status 0 is success
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        working_dir: Option<PathBuf>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        env: BTreeMap<String, String>,
    },
    /// GET a URL; any 2xx status is success
    Http {
        url: String,
        #[serde(with = "duration_serde::duration", default = "default_http_timeout")]
        timeout: Duration,
    },
}

fn default_health_check_enabled() -> bool {
    DEFAULT_HEALTH_CHECK_ENABLED
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_drain_timeout() -> Duration {
    DEFAULT_DRAIN_TIMEOUT
}

fn default_settle_delay() -> Duration {
    DEFAULT_SETTLE_DELAY
}

fn default_interval_minutes() -> u64 {
    DEFAULT_INTERVAL_MINUTES
}

fn default_job_enabled() -> bool {
    DEFAULT_JOB_ENABLED
}

fn default_run_immediately() -> bool {
    DEFAULT_RUN_IMMEDIATELY
}

fn default_http_timeout() -> Duration {
    DEFAULT_HTTP_TIMEOUT
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: default_health_check_enabled(),
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            drain_timeout: default_drain_timeout(),
            settle_delay: default_settle_delay(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            health_check: HealthCheckConfig::default(),
            scheduler: SchedulerConfig::default(),
            jobs: Vec::new(),
        }
    }
}

impl JobConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes.saturating_mul(60))
    }
}

impl Config {
    /// Config written to disk when no config file exists yet
    pub fn example() -> Self {
        Self {
            jobs: vec![JobConfig {
                name: "villa_del_arco".to_string(),
                interval_minutes: 60,
                enabled: false,
                run_immediately: true,
                action: JobAction::Command {
                    program: "python3".to_string(),
                    args: vec!["villa_del_arco_scraper.py".to_string()],
                    working_dir: None,
                    env: BTreeMap::new(),
                },
            }],
            ..Self::default()
        }
    }

    /// Load defaults, then the TOML file, then `PRICE_ALERT_*` environment overrides
    pub fn load_from_file(config_file: &str) -> AppResult<Self> {
        if !Path::new(config_file).exists() {
            let contents = toml::to_string_pretty(&Self::example())?;
            std::fs::write(config_file, contents)?;
            info!("Created default config file: {}", config_file);
        }

        let config: Config = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_file))
            .merge(Env::prefixed(ENV_PREFIX).split(ENV_SEPARATOR))
            .extract()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.scheduler.drain_timeout.is_zero() {
            return Err(AppError::configuration(
                "scheduler.drain_timeout must be greater than zero",
            ));
        }

        let mut seen = HashSet::new();
        for job in &self.jobs {
            if job.name.trim().is_empty() {
                return Err(AppError::invalid_job(&job.name, "name must not be empty"));
            }
            if !seen.insert(job.name.as_str()) {
                return Err(AppError::invalid_job(&job.name, "duplicate job name"));
            }
            if job.interval_minutes == 0 {
                return Err(AppError::invalid_job(
                    &job.name,
                    "interval_minutes must be a positive integer",
                ));
            }
            if job.interval_minutes > MAX_INTERVAL_MINUTES {
                return Err(AppError::invalid_job(
                    &job.name,
                    format!("interval_minutes must not exceed {MAX_INTERVAL_MINUTES}"),
                ));
            }
            match &job.action {
                JobAction::Command { program, .. } if program.trim().is_empty() => {
                    return Err(AppError::invalid_job(&job.name, "command program is empty"));
                }
                JobAction::Http { url, .. } if url.trim().is_empty() => {
                    return Err(AppError::invalid_job(&job.name, "http url is empty"));
                }
                _ => {}
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    const SAMPLE: &str = r#"
        [health_check]
        port = 9100

        [scheduler]
        drain_timeout = "10s"

        [[jobs]]
        name = "power_to_choose"
        interval_minutes = 30
        enabled = true
        run_immediately = false
        action = { type = "command", program = "python3", args = ["power_to_choose_scraper.py"] }

        [[jobs]]
        name = "status_page"
        enabled = true
        action = { type = "http", url = "http://localhost:9000/status", timeout = "5s" }
    "#;

    #[test]
    fn test_load_from_file_with_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", SAMPLE)?;

            let config = Config::load_from_file("config.toml").expect("config loads");
            assert!(config.health_check.enabled);
            assert_eq!(config.health_check.host, DEFAULT_HOST);
            assert_eq!(config.health_check.port, 9100);
            assert_eq!(config.scheduler.drain_timeout, Duration::from_secs(10));
            assert_eq!(config.scheduler.settle_delay, DEFAULT_SETTLE_DELAY);

            assert_eq!(config.jobs.len(), 2);
            let ptc = &config.jobs[0];
            assert_eq!(ptc.interval(), Duration::from_secs(30 * 60));
            assert!(!ptc.run_immediately);

            let status = &config.jobs[1];
            assert_eq!(status.interval_minutes, DEFAULT_INTERVAL_MINUTES);
            assert!(status.run_immediately);
            assert_eq!(
                status.action,
                JobAction::Http {
                    url: "http://localhost:9000/status".to_string(),
                    timeout: Duration::from_secs(5),
                }
            );
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", SAMPLE)?;
            jail.set_env("PRICE_ALERT_HEALTH_CHECK__PORT", "9200");
            jail.set_env("PRICE_ALERT_HEALTH_CHECK__ENABLED", "false");
            jail.set_env("PRICE_ALERT_SCHEDULER__DRAIN_TIMEOUT", "1m");

            let config = Config::load_from_file("config.toml").expect("config loads");
            assert_eq!(config.health_check.port, 9200);
            assert!(!config.health_check.enabled);
            assert_eq!(config.scheduler.drain_timeout, Duration::from_secs(60));
            Ok(())
        });
    }

    #[test]
    fn test_missing_file_writes_example() {
        Jail::expect_with(|_jail| {
            let config = Config::load_from_file("fresh.toml").expect("config loads");
            assert!(Path::new("fresh.toml").exists());
            assert_eq!(config.jobs.len(), 1);
            assert!(config.jobs.iter().all(|job| !job.enabled));
            Ok(())
        });
    }

    #[test]
    fn test_duplicate_job_names_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                [[jobs]]
                name = "villa"
                action = { type = "command", program = "true" }

                [[jobs]]
                name = "villa"
                action = { type = "command", program = "false" }
                "#,
            )?;

            let err = Config::load_from_file("config.toml").unwrap_err();
            assert!(err.to_string().contains("duplicate job name"));
            Ok(())
        });
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut config = Config::example();
        config.jobs[0].interval_minutes = 0;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, AppError::InvalidJob { .. }));
    }

    #[test]
    fn test_oversized_interval_rejected() {
        let mut config = Config::example();
        config.jobs[0].interval_minutes = MAX_INTERVAL_MINUTES;
        assert!(config.validate().is_ok());

        config.jobs[0].interval_minutes = 1_000_000_000_000;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, AppError::InvalidJob { .. }));
        assert!(err.to_string().contains("must not exceed"));
    }

    #[test]
    fn test_zero_drain_timeout_rejected() {
        let mut config = Config::default();
        config.scheduler.drain_timeout = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_example_round_trips_through_toml() {
        let rendered = toml::to_string_pretty(&Config::example()).unwrap();
        let parsed: Config = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.jobs[0].name, "villa_del_arco");
        assert_eq!(parsed.scheduler.drain_timeout, DEFAULT_DRAIN_TIMEOUT);
    }
}
