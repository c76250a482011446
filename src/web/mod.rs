//! Web layer module
//!
//! The health server exposes `/health`, `/ready` and `/metrics`. Handlers
//! only read a [`StatsSnapshot`](crate::job_scheduling::StatsSnapshot) and
//! the shutting-down flag; they never mutate scheduling state.

use axum::{
    Json, Router,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use std::net::SocketAddr;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::HealthCheckConfig;
use crate::errors::{AppError, AppResult};
use crate::job_scheduling::StatsCollector;
use crate::shutdown::ShutdownCoordinator;

pub mod handlers;
pub mod responses;

pub use responses::{HealthResponse, ReadyResponse};

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub stats: StatsCollector,
    pub shutdown: ShutdownCoordinator,
}

/// Health server configuration and setup
pub struct WebServer {
    app: Router,
    addr: SocketAddr,
}

impl WebServer {
    pub fn new(config: &HealthCheckConfig, state: AppState) -> AppResult<Self> {
        let addr: SocketAddr = format!("{}:{}", config.host, config.port)
            .parse()
            .map_err(|e| {
                AppError::configuration(format!(
                    "Invalid health check address {}:{}: {e}",
                    config.host, config.port
                ))
            })?;

        Ok(Self {
            app: Self::create_router(state),
            addr,
        })
    }

    /// Create the router with all routes and middleware
    pub fn create_router(state: AppState) -> Router {
        Router::new()
            .route("/health", get(handlers::health::health_check))
            .route("/ready", get(handlers::health::readiness_check))
            .route("/metrics", get(handlers::metrics::prometheus_metrics))
            .fallback(not_found)
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Bind, report the outcome on `ready_signal`, then serve until cancelled
    ///
    /// The bound address (useful with port 0) is sent on success. A bind
    /// failure is sent and also returned.
    pub async fn serve_with_cancellation(
        self,
        ready_signal: oneshot::Sender<AppResult<SocketAddr>>,
        cancellation_token: CancellationToken,
    ) -> AppResult<()> {
        let listener = match tokio::net::TcpListener::bind(&self.addr).await {
            Ok(listener) => listener,
            Err(bind_error) => {
                let _ = ready_signal.send(Err(AppError::Bind {
                    addr: self.addr.to_string(),
                    source: std::io::Error::new(bind_error.kind(), bind_error.to_string()),
                }));
                return Err(AppError::Bind {
                    addr: self.addr.to_string(),
                    source: bind_error,
                });
            }
        };

        let local_addr = listener.local_addr()?;
        info!("Health server listening on http://{}", local_addr);
        let _ = ready_signal.send(Ok(local_addr));

        let shutdown_signal = async move {
            cancellation_token.cancelled().await;
            info!("Health server received cancellation signal, shutting down");
        };

        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal)
            .await?;
        Ok(())
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": "not found" })),
    )
}
