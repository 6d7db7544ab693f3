//! Pull request creation via the hosting CLI.
//!
//! The PR host is an opaque command (`gh pr create`) with a deterministic
//! exit code and captured output. Creation is bounded by a short timeout —
//! unlike code generation this is a single API round-trip, so a command
//! that takes a minute is stuck, not working.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::{info, warn};

/// Errors from PR creation.
#[derive(Debug, Error)]
pub enum PrError {
    /// The command reported failure; carries its diagnostic output.
    #[error("PR creation failed: {stderr}")]
    CommandFailed { stderr: String },

    /// The command exceeded its time budget and was killed.
    #[error("PR creation timed out after {}s", timeout.as_secs())]
    TimedOut { timeout: Duration },

    /// The command could not be launched at all.
    #[error("failed to launch {command:?}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// IO failure while waiting for the command.
    #[error("IO error while creating PR: {0}")]
    Io(#[from] std::io::Error),
}

/// Parameters for a pull request.
#[derive(Debug, Clone)]
pub struct PrRequest {
    pub title: String,
    pub body: String,
    /// Head branch (the one automation pushed).
    pub head: String,
    /// Base branch the PR targets.
    pub base: String,
}

/// A successfully created pull request.
#[derive(Debug, Clone)]
pub struct CreatedPr {
    pub url: String,
}

/// The seam between the orchestrator and the PR host.
///
/// Production uses [`GhCli`]; tests substitute recording fakes.
#[async_trait]
pub trait PrPublisher: Send + Sync {
    async fn create_pr(&self, workdir: &Path, request: &PrRequest) -> Result<CreatedPr, PrError>;
}

/// Shells out to the `gh` CLI.
pub struct GhCli {
    command: String,
    timeout: Duration,
}

impl GhCli {
    pub fn new(timeout: Duration) -> Self {
        GhCli {
            command: "gh".to_string(),
            timeout,
        }
    }
}

#[async_trait]
impl PrPublisher for GhCli {
    async fn create_pr(&self, workdir: &Path, request: &PrRequest) -> Result<CreatedPr, PrError> {
        let mut cmd = Command::new(&self.command);
        cmd.current_dir(workdir)
            .args(["pr", "create"])
            .arg("--title")
            .arg(&request.title)
            .arg("--body")
            .arg(&request.body)
            .arg("--head")
            .arg(&request.head)
            .arg("--base")
            .arg(&request.base)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        info!(head = %request.head, base = %request.base, "Creating pull request");

        let child = cmd.spawn().map_err(|source| PrError::Spawn {
            command: self.command.clone(),
            source,
        })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(timeout_secs = self.timeout.as_secs(), "PR creation timed out");
                return Err(PrError::TimedOut {
                    timeout: self.timeout,
                });
            }
        };

        if !output.status.success() {
            return Err(PrError::CommandFailed {
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let url = extract_pr_url(&stdout);
        info!(url = %url, "Pull request created");

        Ok(CreatedPr { url })
    }
}

/// Pulls the PR URL out of the command's output.
///
/// `gh pr create` prints the new PR's URL as the last line of stdout; fall
/// back to the whole trimmed output if no URL-shaped line is found.
fn extract_pr_url(stdout: &str) -> String {
    stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| line.starts_with("https://") || line.starts_with("http://"))
        .unwrap_or(stdout.trim())
        .to_string()
}
