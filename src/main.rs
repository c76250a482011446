use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use price_alert_scheduler::{
    config::Config,
    job_scheduling::{JobRegistry, JobScheduler, StatsCollector},
    shutdown::{EXIT_STARTUP_FAILURE, ShutdownCoordinator},
    utils::format_interval,
    web::{AppState, WebServer},
};

#[derive(Parser)]
#[command(name = "price-alert-scheduler")]
#[command(version)]
#[command(about = "Runs price alert jobs on fixed intervals and reports their health")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Health check port (overrides config file)
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Run as a long-lived service or run every enabled job once and exit
    #[arg(short, long, value_enum, default_value_t = Mode::Service)]
    mode: Mode,

    /// List configured jobs and exit
    #[arg(short, long)]
    list: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Mode {
    Service,
    Single,
}

fn init_logging(log_level: &str, format: LogFormat) {
    let log_filter = if matches!(log_level, "debug" | "trace") {
        format!("price_alert_scheduler={log_level},tower_http={log_level}")
    } else {
        format!("price_alert_scheduler={log_level}")
    };
    let registry = tracing_subscriber::registry().with(
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| log_filter.into()),
    );

    match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

fn print_jobs(registry: &JobRegistry) {
    println!("Configured jobs:");
    for job in registry.jobs() {
        let state = if job.enabled { "enabled" } else { "disabled" };
        println!(
            "  {:<24} every {:<14} {}",
            job.name,
            format_interval(job.interval),
            state
        );
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.log_format);

    match run(cli).await {
        Ok(exit_code) => exit_code,
        Err(e) => {
            error!("Startup failed: {:#}", e);
            ExitCode::from(EXIT_STARTUP_FAILURE)
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    info!("Starting Price Alert Scheduler v{}", env!("CARGO_PKG_VERSION"));

    let mut config = Config::load_from_file(&cli.config)?;
    info!("Configuration loaded from: {}", cli.config);

    if let Some(port) = cli.port {
        config.health_check.port = port;
    }

    let registry = JobRegistry::from_config(&config)?;
    if cli.list {
        print_jobs(&registry);
        return Ok(ExitCode::SUCCESS);
    }
    registry.log_summary();

    let stats = StatsCollector::new(registry.jobs());
    let scheduler =
        JobScheduler::new(registry, stats.clone()).with_settle_delay(config.scheduler.settle_delay);

    match cli.mode {
        Mode::Single => {
            info!("Running in single-pass mode");
            let report = scheduler.run_enabled_once().await;
            Ok(if report.all_succeeded() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Mode::Service => run_service(config, scheduler, stats).await,
    }
}

async fn run_service(
    config: Config,
    scheduler: JobScheduler,
    stats: StatsCollector,
) -> Result<ExitCode> {
    let shutdown = ShutdownCoordinator::new();
    let signals = shutdown.listen_for_signals()?;
    let server_token = CancellationToken::new();

    // The health server must be listening before any job fires
    let server_handle = if config.health_check.enabled {
        let web_server = WebServer::new(
            &config.health_check,
            AppState {
                stats,
                shutdown: shutdown.clone(),
            },
        )?;
        info!(
            "Starting health server on {}:{}",
            web_server.host(),
            web_server.port()
        );

        let (server_ready_tx, server_ready_rx) = tokio::sync::oneshot::channel();
        let token = server_token.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = web_server.serve_with_cancellation(server_ready_tx, token).await {
                error!("Health server failed: {}", e);
            }
        });

        match server_ready_rx.await {
            Ok(Ok(addr)) => {
                info!("Health server is listening on {}, starting scheduler", addr);
            }
            Ok(Err(bind_error)) => {
                return Err(bind_error.into());
            }
            Err(_) => {
                error!("Health server task completed without signaling");
                return Err(anyhow::anyhow!("Health server failed to start"));
            }
        }
        Some(handle)
    } else {
        info!("Health check server disabled");
        None
    };

    scheduler.start();
    info!("Scheduler running, waiting for SIGTERM or SIGINT");

    let exit_code = shutdown
        .run_until_signal(signals, &scheduler, config.scheduler.drain_timeout)
        .await;

    server_token.cancel();
    if let Some(handle) = server_handle {
        let _ = handle.await;
    }

    info!(exit_code, "Price Alert Scheduler stopped");
    Ok(ExitCode::from(exit_code))
}
