//! Shutdown coordination
//!
//! On SIGTERM/SIGINT the coordinator flips the shutting-down flag (so
//! `/ready` reports 503 immediately), stops the scheduler with the drain
//! timeout and turns the result into a process exit code.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{info, warn};

use crate::errors::AppResult;
use crate::job_scheduling::JobScheduler;

/// All jobs drained
pub const EXIT_CLEAN: u8 = 0;
/// Configuration or bind failure at startup
pub const EXIT_STARTUP_FAILURE: u8 = 1;
/// At least one job was abandoned after the drain timeout
pub const EXIT_FORCED_ABORT: u8 = 2;

/// Signal that started the shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Terminate,
    Interrupt,
}

impl std::fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownSignal::Terminate => write!(f, "SIGTERM"),
            ShutdownSignal::Interrupt => write!(f, "SIGINT"),
        }
    }
}

/// Owns the process-wide shutting-down flag; cheap to clone
#[derive(Debug, Clone, Default)]
pub struct ShutdownCoordinator {
    shutting_down: Arc<AtomicBool>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Flip the flag; returns false if shutdown had already begun
    pub fn begin_shutdown(&self) -> bool {
        !self.shutting_down.swap(true, Ordering::SeqCst)
    }

    /// Register the termination signal handlers
    ///
    /// Call this before binding the server or starting the scheduler so a
    /// signal received during startup still takes the graceful path.
    pub fn listen_for_signals(&self) -> AppResult<SignalListener> {
        SignalListener::install()
    }

    /// Stop the scheduler and map the outcome to an exit code
    pub async fn shutdown(&self, scheduler: &JobScheduler, drain_timeout: Duration) -> u8 {
        if !self.begin_shutdown() {
            warn!("Shutdown already in progress");
        }

        let report = scheduler.stop(drain_timeout).await;
        if report.is_clean() {
            info!("Shutdown complete, all jobs drained");
            EXIT_CLEAN
        } else {
            warn!(
                aborted = ?report.aborted,
                "Shutdown complete, some jobs were aborted"
            );
            EXIT_FORCED_ABORT
        }
    }

    /// Block until a termination signal, then shut down
    pub async fn run_until_signal(
        &self,
        mut signals: SignalListener,
        scheduler: &JobScheduler,
        drain_timeout: Duration,
    ) -> u8 {
        let received = signals.recv().await;
        info!("Received {}, shutting down gracefully", received);
        self.shutdown(scheduler, drain_timeout).await
    }
}

/// Installed SIGTERM/SIGINT streams
#[cfg(unix)]
pub struct SignalListener {
    sigterm: tokio::signal::unix::Signal,
    sigint: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl SignalListener {
    pub fn install() -> AppResult<Self> {
        use tokio::signal::unix::{SignalKind, signal};

        Ok(Self {
            sigterm: signal(SignalKind::terminate())?,
            sigint: signal(SignalKind::interrupt())?,
        })
    }

    pub async fn recv(&mut self) -> ShutdownSignal {
        tokio::select! {
            _ = self.sigterm.recv() => ShutdownSignal::Terminate,
            _ = self.sigint.recv() => ShutdownSignal::Interrupt,
        }
    }
}

/// Installed Ctrl+C stream (Windows fallback)
#[cfg(windows)]
pub struct SignalListener {
    ctrl_c: tokio::signal::windows::CtrlC,
}

#[cfg(windows)]
impl SignalListener {
    pub fn install() -> AppResult<Self> {
        Ok(Self {
            ctrl_c: tokio::signal::windows::ctrl_c()?,
        })
    }

    pub async fn recv(&mut self) -> ShutdownSignal {
        self.ctrl_c.recv().await;
        ShutdownSignal::Interrupt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job_scheduling::{JobRegistry, JobSpec, StatsCollector};

    #[test]
    fn test_begin_shutdown_is_one_way() {
        let coordinator = ShutdownCoordinator::new();
        let observer = coordinator.clone();
        assert!(!observer.is_shutting_down());

        assert!(coordinator.begin_shutdown());
        assert!(observer.is_shutting_down());
        assert!(!coordinator.begin_shutdown());
        assert!(observer.is_shutting_down());
    }

    #[tokio::test]
    async fn test_idle_scheduler_exits_clean() {
        let registry = JobRegistry::new(vec![JobSpec::from_fn(
            "power_to_choose",
            Duration::from_secs(60),
            || async { Ok(()) },
        )])
        .unwrap();
        let stats = StatsCollector::new(registry.jobs());
        let scheduler = JobScheduler::new(registry, stats);
        scheduler.start();

        let coordinator = ShutdownCoordinator::new();
        let code = coordinator
            .shutdown(&scheduler, Duration::from_secs(1))
            .await;
        assert_eq!(code, EXIT_CLEAN);
        assert!(coordinator.is_shutting_down());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_signal_during_startup_takes_graceful_path() {
        let coordinator = ShutdownCoordinator::new();
        let signals = coordinator.listen_for_signals().unwrap();

        // Delivered before the scheduler is even built
        let status = std::process::Command::new("kill")
            .args(["-TERM", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());

        let registry = JobRegistry::new(vec![JobSpec::from_fn(
            "villa_del_arco",
            Duration::from_secs(60),
            || async { Ok(()) },
        )])
        .unwrap();
        let stats = StatsCollector::new(registry.jobs());
        let scheduler = JobScheduler::new(registry, stats);
        scheduler.start();

        let code = tokio::time::timeout(
            Duration::from_secs(10),
            coordinator.run_until_signal(signals, &scheduler, Duration::from_secs(1)),
        )
        .await
        .expect("buffered signal is delivered");
        assert_eq!(code, EXIT_CLEAN);
        assert!(coordinator.is_shutting_down());
    }
}
