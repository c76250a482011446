//! HTTP response types for the health server
//!
//! Field names are camelCase on the wire.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::job_scheduling::{JobState, RecentError, StatsSnapshot};
use crate::utils::human_format::{format_interval, format_uptime};

/// Failures shown in `/health`, newest last
pub const RECENT_ERRORS_SHOWN: usize = 5;

/// Overall service status reported by `/health`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Healthy,
    Degraded,
}

/// Body of `GET /health`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: ServiceStatus,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub uptime_human: String,
    /// When the most recent run of any job finished
    pub last_check: Option<DateTime<Utc>>,
    pub statistics: RunStatistics,
    pub jobs: BTreeMap<String, JobHealth>,
    pub recent_errors: Vec<RecentError>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStatistics {
    pub total_runs: u64,
    pub successful_runs: u64,
    pub failed_runs: u64,
    pub success_rate_percent: f64,
}

/// Per-job entry of `GET /health`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobHealth {
    /// `disabled` for disabled jobs, otherwise the last status
    pub status: String,
    pub enabled: bool,
    pub last_run: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Set when the last failure was a forced abort at shutdown
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub aborted: bool,
    pub last_end_time: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    pub interval: String,
    pub run_count: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub skipped_ticks: u64,
}

impl From<&JobState> for JobHealth {
    fn from(job: &JobState) -> Self {
        let status = if job.enabled {
            job.last_status.as_str()
        } else {
            "disabled"
        };

        Self {
            status: status.to_string(),
            enabled: job.enabled,
            last_run: job.last_start_time,
            last_error: job.last_error.clone(),
            aborted: job.aborted,
            last_end_time: job.last_end_time,
            next_run: job.next_scheduled_time,
            interval: format_interval(job.interval),
            run_count: job.run_count,
            success_count: job.success_count,
            failure_count: job.failure_count,
            skipped_ticks: job.skipped_ticks,
        }
    }
}

impl HealthResponse {
    pub fn from_snapshot(snapshot: &StatsSnapshot) -> Self {
        let uptime = snapshot.uptime();
        let status = if snapshot.is_degraded() {
            ServiceStatus::Degraded
        } else {
            ServiceStatus::Healthy
        };
        let service = &snapshot.service;
        let skip = snapshot
            .recent_errors
            .len()
            .saturating_sub(RECENT_ERRORS_SHOWN);

        Self {
            status,
            timestamp: snapshot.taken_at,
            uptime_seconds: uptime.as_secs(),
            uptime_human: format_uptime(uptime),
            last_check: service.last_run_at,
            statistics: RunStatistics {
                total_runs: service.total_runs,
                successful_runs: service.successful_runs,
                failed_runs: service.failed_runs,
                success_rate_percent: (service.success_rate_percent() * 100.0).round() / 100.0,
            },
            jobs: snapshot
                .jobs
                .iter()
                .map(|(name, job)| (name.clone(), JobHealth::from(job)))
                .collect(),
            recent_errors: snapshot.recent_errors[skip..].to_vec(),
        }
    }
}

/// Body of `GET /ready`
#[derive(Debug, Clone, Serialize)]
pub struct ReadyResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ReadyResponse {
    pub fn ready() -> Self {
        Self {
            ready: true,
            message: None,
        }
    }

    pub fn not_ready(message: impl Into<String>) -> Self {
        Self {
            ready: false,
            message: Some(message.into()),
        }
    }
}
