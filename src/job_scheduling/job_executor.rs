//! Job bodies shipped with the service
//!
//! The scheduler treats these like any other [`JobBody`]: it only sees
//! success or failure. A `command` job runs an external program (typically a
//! scraper script that fetches a page, checks the price threshold and sends
//! the alert email itself). An `http` job GETs a URL.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use super::types::JobBody;
use crate::errors::{JobError, JobResult};

/// Lines of stderr kept in the recorded error
const STDERR_TAIL_LINES: usize = 5;

/// Runs an external program; exit status 0 is success
#[derive(Debug, Clone)]
pub struct CommandJob {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    env: BTreeMap<String, String>,
}

impl CommandJob {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            working_dir: None,
            env: BTreeMap::new(),
        }
    }

    pub fn with_working_dir(mut self, working_dir: Option<PathBuf>) -> Self {
        self.working_dir = working_dir;
        self
    }

    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    fn command_error(&self, message: String) -> JobError {
        JobError::Command {
            program: self.program.clone(),
            message,
        }
    }
}

#[async_trait]
impl JobBody for CommandJob {
    async fn run(&self) -> JobResult<()> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .envs(&self.env)
            .stdin(Stdio::null());
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        let output = command
            .output()
            .await
            .map_err(|e| self.command_error(format!("failed to spawn: {e}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        for line in stdout.lines() {
            debug!(program = %self.program, "{}", line);
        }

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail = stderr_tail(&stderr, STDERR_TAIL_LINES);
        let message = if tail.is_empty() {
            format!("exited with {}", output.status)
        } else {
            format!("exited with {}: {}", output.status, tail)
        };
        Err(self.command_error(message))
    }
}

fn stderr_tail(stderr: &str, lines: usize) -> String {
    let collected: Vec<&str> = stderr
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .collect();
    let start = collected.len().saturating_sub(lines);
    collected[start..].join(" | ")
}

/// GETs a URL; any 2xx status is success
#[derive(Debug, Clone)]
pub struct HttpCheckJob {
    url: String,
    client: reqwest::Client,
}

impl HttpCheckJob {
    pub fn new(url: impl Into<String>, timeout: Duration) -> JobResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[async_trait]
impl JobBody for HttpCheckJob {
    async fn run(&self) -> JobResult<()> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        debug!(url = %self.url, status = status.as_u16(), "HTTP check completed");

        if status.is_success() {
            Ok(())
        } else {
            Err(JobError::HttpStatus {
                url: self.url.clone(),
                status: status.as_u16(),
            })
        }
    }
}
