//! Prometheus metrics endpoint
//!
//! A fresh registry is filled from the stats snapshot on every scrape, so
//! the exported values are always consistent with `/health`.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use prometheus::{
    Counter, Gauge, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use tracing::error;

use crate::job_scheduling::{JobStatus, StatsSnapshot};
use crate::web::AppState;

const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Prometheus metrics endpoint handler
pub async fn prometheus_metrics(State(state): State<AppState>) -> Response {
    let snapshot = state.stats.snapshot().await;

    match render_metrics(&snapshot) {
        Ok(output) => (StatusCode::OK, [("content-type", CONTENT_TYPE)], output).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Encode a snapshot in the Prometheus text exposition format
pub fn render_metrics(snapshot: &StatsSnapshot) -> prometheus::Result<String> {
    let registry = Registry::new();
    let service = &snapshot.service;

    let up = IntGauge::new("price_alert_up", "Service is up and serving")?;
    up.set(1);
    registry.register(Box::new(up))?;

    let uptime = Counter::new("price_alert_uptime_seconds", "Service uptime in seconds")?;
    uptime.inc_by(snapshot.uptime().as_secs_f64());
    registry.register(Box::new(uptime))?;

    for (name, help, value) in [
        ("price_alert_total_runs", "Total job runs", service.total_runs),
        (
            "price_alert_successful_runs",
            "Total successful job runs",
            service.successful_runs,
        ),
        ("price_alert_failed_runs", "Total failed job runs", service.failed_runs),
    ] {
        let counter = IntCounter::new(name, help)?;
        counter.inc_by(value);
        registry.register(Box::new(counter))?;
    }

    let success_rate = Gauge::new(
        "price_alert_success_rate_percent",
        "Percentage of finished runs that succeeded",
    )?;
    success_rate.set(service.success_rate_percent());
    registry.register(Box::new(success_rate))?;

    let job_runs = IntCounterVec::new(
        Opts::new("price_alert_job_runs_total", "Finished runs per job"),
        &["job"],
    )?;
    let job_failures = IntCounterVec::new(
        Opts::new("price_alert_job_failures_total", "Failed runs per job"),
        &["job"],
    )?;
    let job_skipped = IntCounterVec::new(
        Opts::new(
            "price_alert_job_skipped_ticks_total",
            "Ticks skipped because the previous run was still going",
        ),
        &["job"],
    )?;
    let job_running = IntGaugeVec::new(
        Opts::new("price_alert_job_running", "1 while the job is running"),
        &["job"],
    )?;
    let job_enabled = IntGaugeVec::new(
        Opts::new("price_alert_job_enabled", "1 if the job is enabled"),
        &["job"],
    )?;

    for (name, job) in &snapshot.jobs {
        let labels = [name.as_str()];
        job_runs.with_label_values(&labels).inc_by(job.run_count);
        job_failures.with_label_values(&labels).inc_by(job.failure_count);
        job_skipped.with_label_values(&labels).inc_by(job.skipped_ticks);
        job_running
            .with_label_values(&labels)
            .set(i64::from(job.last_status == JobStatus::Running));
        job_enabled
            .with_label_values(&labels)
            .set(i64::from(job.enabled));
    }

    registry.register(Box::new(job_runs))?;
    registry.register(Box::new(job_failures))?;
    registry.register(Box::new(job_skipped))?;
    registry.register(Box::new(job_running))?;
    registry.register(Box::new(job_enabled))?;

    TextEncoder::new().encode_to_string(&registry.gather())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job_scheduling::{JobOutcome, JobSpec, StatsCollector};
    use std::time::Duration;

    #[tokio::test]
    async fn test_render_includes_service_and_job_metrics() {
        let stats = StatsCollector::new(&[
            JobSpec::from_fn("power_to_choose", Duration::from_secs(60), || async { Ok(()) }),
            JobSpec::from_fn("villa_del_arco", Duration::from_secs(60), || async { Ok(()) })
                .enabled(false),
        ]);
        stats.record_start("power_to_choose", 1).await;
        stats
            .record_end("power_to_choose", 1, JobOutcome::failure("no rows"))
            .await;
        stats.record_skip("power_to_choose").await;

        let output = render_metrics(&stats.snapshot().await).unwrap();

        assert!(output.contains("price_alert_up 1"));
        assert!(output.contains("price_alert_total_runs 1"));
        assert!(output.contains("price_alert_failed_runs 1"));
        assert!(output.contains("# TYPE price_alert_uptime_seconds counter"));
        assert!(output.contains("price_alert_job_failures_total{job=\"power_to_choose\"} 1"));
        assert!(output.contains("price_alert_job_skipped_ticks_total{job=\"power_to_choose\"} 1"));
        assert!(output.contains("price_alert_job_enabled{job=\"villa_del_arco\"} 0"));
        assert!(output.contains("price_alert_job_runs_total{job=\"villa_del_arco\"} 0"));
    }
}
