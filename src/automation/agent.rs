//! Delegated coding agent invocation.
//!
//! The agent is an opaque command: it takes a natural-language instruction
//! and a working directory and reports success or failure plus captured
//! output. It is configured non-interactively from the start (explicit
//! flags, stdin closed), so there is no prompt-scanning protocol and the
//! command can never block waiting for input.
//!
//! Code generation may run for minutes; the invocation is bounded by a
//! configurable timeout and aborted by the process-wide shutdown token.
//! Both outcomes are reported distinctly from a command-reported error.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Errors that prevented the agent from reporting an outcome.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The agent exceeded its time budget and was killed.
    #[error("coding agent timed out after {}s", timeout.as_secs())]
    TimedOut { timeout: Duration },

    /// Shutdown was requested while the agent was running.
    #[error("coding agent cancelled by shutdown")]
    Cancelled,

    /// The agent command could not be launched at all.
    #[error("failed to launch coding agent {command:?}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// IO failure while waiting for the agent.
    #[error("IO error while running coding agent: {0}")]
    Io(#[from] std::io::Error),
}

/// What a completed agent run reported.
#[derive(Debug, Clone)]
pub struct AgentOutcome {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Configuration for the coding agent command.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Executable name or path (e.g. `aider`).
    pub command: String,

    /// Model identifier forwarded as `--model`, when set.
    pub model: Option<String>,

    /// Flags that force non-interactive operation.
    pub extra_args: Vec<String>,

    /// Wall-clock bound on a single invocation.
    pub timeout: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            command: "aider".to_string(),
            model: None,
            extra_args: vec!["--yes-always".to_string(), "--no-stream".to_string()],
            timeout: Duration::from_secs(300),
        }
    }
}

/// The seam between the orchestrator and the delegated agent.
///
/// Production uses [`AgentCommand`]; tests substitute recording fakes.
#[async_trait]
pub trait CodingAgent: Send + Sync {
    /// Runs the agent against `workdir` with the given instruction.
    ///
    /// `Ok` carries the command's own verdict (`success`, exit code,
    /// captured output); `Err` means the command never got to report one
    /// (launch failure, timeout, shutdown).
    async fn generate(&self, instruction: &str, workdir: &Path)
    -> Result<AgentOutcome, AgentError>;
}

/// Shells out to the configured agent command.
pub struct AgentCommand {
    config: AgentConfig,
    shutdown: CancellationToken,
}

impl AgentCommand {
    pub fn new(config: AgentConfig, shutdown: CancellationToken) -> Self {
        AgentCommand { config, shutdown }
    }
}

#[async_trait]
impl CodingAgent for AgentCommand {
    async fn generate(
        &self,
        instruction: &str,
        workdir: &Path,
    ) -> Result<AgentOutcome, AgentError> {
        let mut cmd = Command::new(&self.config.command);
        cmd.current_dir(workdir);
        if let Some(model) = &self.config.model {
            cmd.arg("--model").arg(model);
        }
        cmd.args(&self.config.extra_args);
        cmd.arg("--message").arg(instruction);

        // stdin is closed: a prompt the flags failed to suppress fails fast
        // instead of hanging until the timeout.
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        info!(
            command = %self.config.command,
            workdir = %workdir.display(),
            timeout_secs = self.config.timeout.as_secs(),
            "Invoking coding agent"
        );

        let child = cmd.spawn().map_err(|source| AgentError::Spawn {
            command: self.config.command.clone(),
            source,
        })?;

        // kill_on_drop reaps the child on the timeout and shutdown paths.
        tokio::select! {
            result = tokio::time::timeout(self.config.timeout, child.wait_with_output()) => {
                match result {
                    Ok(Ok(output)) => {
                        let outcome = AgentOutcome {
                            success: output.status.success(),
                            exit_code: output.status.code(),
                            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                        };
                        debug!(
                            success = outcome.success,
                            exit_code = ?outcome.exit_code,
                            "Coding agent finished"
                        );
                        Ok(outcome)
                    }
                    Ok(Err(e)) => Err(AgentError::Io(e)),
                    Err(_) => {
                        warn!(
                            timeout_secs = self.config.timeout.as_secs(),
                            "Coding agent timed out; killing"
                        );
                        Err(AgentError::TimedOut {
                            timeout: self.config.timeout,
                        })
                    }
                }
            }
            _ = self.shutdown.cancelled() => {
                warn!("Shutdown requested; aborting coding agent");
                Err(AgentError::Cancelled)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(command: &str, args: &[&str], timeout: Duration) -> AgentCommand {
        AgentCommand::new(
            AgentConfig {
                command: command.to_string(),
                model: None,
                extra_args: args.iter().map(|s| s.to_string()).collect(),
                timeout,
            },
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn successful_command_reports_outcome() {
        let dir = tempfile::tempdir().unwrap();
        // `true` ignores the --message argument and exits 0
        let agent = agent("true", &[], Duration::from_secs(5));

        let outcome = agent.generate("do things", dir.path()).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.exit_code, Some(0));
    }

    #[tokio::test]
    async fn failing_command_reports_failure_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let agent = agent("false", &[], Duration::from_secs(5));

        let outcome = agent.generate("do things", dir.path()).await.unwrap();
        assert!(!outcome.success);
        assert_ne!(outcome.exit_code, Some(0));
    }

    #[tokio::test]
    async fn missing_command_is_a_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let agent = agent(
            "definitely-not-a-real-command-xyz",
            &[],
            Duration::from_secs(5),
        );

        let result = agent.generate("do things", dir.path()).await;
        assert!(matches!(result, Err(AgentError::Spawn { .. })));
    }

    #[tokio::test]
    async fn overrunning_command_times_out() {
        let dir = tempfile::tempdir().unwrap();
        // The trailing --message argument becomes a positional parameter of
        // the -c script; the script itself just blocks past the 100ms budget.
        let agent = agent("sh", &["-c", "sleep 30"], Duration::from_millis(100));

        let result = agent.generate("unused", dir.path()).await;
        assert!(matches!(result, Err(AgentError::TimedOut { .. })));
    }

    #[tokio::test]
    async fn shutdown_cancels_running_agent() {
        let dir = tempfile::tempdir().unwrap();
        let token = CancellationToken::new();
        let agent = AgentCommand::new(
            AgentConfig {
                command: "sh".to_string(),
                model: None,
                extra_args: vec!["-c".to_string(), "sleep 30".to_string()],
                timeout: Duration::from_secs(60),
            },
            token.clone(),
        );

        let cancel = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            token.cancel();
        });

        let result = agent.generate("unused", dir.path()).await;
        assert!(matches!(result, Err(AgentError::Cancelled)));
        cancel.await.unwrap();
    }
}
