//! Error type definitions for the price alert scheduler

use thiserror::Error;

/// Marker stored as the last error of a job that was still running when the
/// shutdown drain timeout elapsed.
pub const ABORTED_ON_SHUTDOWN: &str = "aborted on shutdown";

/// Top-level application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration could not be loaded or failed validation
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// The health server could not bind its listening address
    #[error("Failed to bind health server to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Invalid job definition
    #[error("Invalid job '{name}': {reason}")]
    InvalidJob { name: String, reason: String },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn invalid_job(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidJob {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

impl From<figment::Error> for AppError {
    fn from(err: figment::Error) -> Self {
        Self::configuration(err.to_string())
    }
}

impl From<toml::ser::Error> for AppError {
    fn from(err: toml::ser::Error) -> Self {
        Self::configuration(err.to_string())
    }
}

/// Failure reported by a job body
///
/// The scheduler only distinguishes success from failure; the variants exist
/// so the recorded error message is useful to operators.
#[derive(Error, Debug)]
pub enum JobError {
    /// Generic failure reported by the job itself
    #[error("{message}")]
    Failed { message: String },

    /// External command exited unsuccessfully or could not be spawned
    #[error("Command '{program}' failed: {message}")]
    Command { program: String, message: String },

    /// HTTP check failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// HTTP check returned a non-success status
    #[error("Unexpected HTTP status {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    /// The job body panicked
    #[error("Job panicked: {message}")]
    Panicked { message: String },

    /// The job was still running when the shutdown drain timeout elapsed
    #[error("{}", ABORTED_ON_SHUTDOWN)]
    AbortedOnShutdown,
}

impl JobError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}
