//! Centralized error handling for the price alert scheduler
//!
//! Two families of errors exist:
//!
//! - **Application errors** ([`AppError`]): configuration problems and
//!   server bind failures. These are fatal at startup.
//! - **Job errors** ([`JobError`]): failures reported by a job body. These
//!   are recorded by the stats collector and never propagate past the
//!   scheduler.

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Convenience type alias for job body results
pub type JobResult<T> = Result<T, JobError>;
