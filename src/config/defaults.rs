/// Configuration default values
///
/// This module contains all the default values for configuration options,
/// making them easily changeable in one central location.
use std::time::Duration;

// Health check server defaults
pub const DEFAULT_HEALTH_CHECK_ENABLED: bool = true;
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;

// Scheduler defaults
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);
/// Delay before a `run_immediately` job fires, so the health server binds first
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(2);

// Job defaults
pub const DEFAULT_INTERVAL_MINUTES: u64 = 60;
/// Longest accepted job interval: one leap year
pub const MAX_INTERVAL_MINUTES: u64 = 366 * 24 * 60;
pub const MAX_INTERVAL: Duration = Duration::from_secs(MAX_INTERVAL_MINUTES * 60);
pub const DEFAULT_JOB_ENABLED: bool = false;
pub const DEFAULT_RUN_IMMEDIATELY: bool = true;
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(60);

// Environment overrides, e.g. PRICE_ALERT_HEALTH_CHECK__PORT=9090
pub const ENV_PREFIX: &str = "PRICE_ALERT_";
pub const ENV_SEPARATOR: &str = "__";
