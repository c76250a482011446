//! Job scheduling subsystem
//!
//! The system is built around four main components:
//! - `JobRegistry`: Fixed set of jobs built at startup
//! - `ExecutionGuard`: Per-job token that prevents overlapping runs
//! - `StatsCollector`: Shared per-job and service-wide counters
//! - `JobScheduler`: Interval timers that tie the other three together
//!
//! Job bodies (`CommandJob`, `HttpCheckJob`, or any `JobBody`) are opaque to
//! the scheduler; it only sees success or failure.

pub mod guard;
pub mod job_executor;
pub mod job_scheduler;
pub mod registry;
pub mod stats;
pub mod types;

pub use guard::{ExecutionGuard, GuardPermit};
pub use job_executor::{CommandJob, HttpCheckJob};
pub use job_scheduler::{JobScheduler, SinglePassReport, StopReport};
pub use registry::JobRegistry;
pub use stats::{JobState, RecentError, ServiceStats, StatsCollector, StatsSnapshot};
pub use types::*;
