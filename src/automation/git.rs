//! Local git operations for the automation pipeline.
//!
//! All commands run with a clean git environment (no system/user config, no
//! terminal prompts) so behavior is reproducible across machines and a
//! misconfigured host can never hang the pipeline waiting for input.
//! Committer identity is passed per-command via `-c` flags; nothing is ever
//! written to the repository's own config.

use std::path::Path;
use std::process::Output;

use thiserror::Error;

/// Errors from git operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// Git command failed.
    #[error("git command failed: {command}\nstderr: {stderr}")]
    CommandFailed { command: String, stderr: String },

    /// The working directory does not exist.
    #[error("working directory does not exist: {0}")]
    WorkdirMissing(String),

    /// Push was rejected (non-fast-forward or remote refusal).
    #[error("push rejected: {details}")]
    PushRejected { details: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for git operations.
pub type GitResult<T> = std::result::Result<T, GitError>;

/// Identity used for creating commits.
///
/// Passed via `-c` flags to git commands, ensuring commits can be created
/// even when global/system git config is disabled.
#[derive(Debug, Clone)]
pub struct CommitIdentity {
    /// The committer/author name (git `user.name`).
    pub name: String,

    /// The committer/author email (git `user.email`).
    pub email: String,
}

impl Default for CommitIdentity {
    fn default() -> Self {
        CommitIdentity {
            name: "vibe-pilot".to_string(),
            email: "vibe-pilot@users.noreply.invalid".to_string(),
        }
    }
}

/// Create a git Command with clean environment (no system/user config).
fn git_command(workdir: &Path) -> std::process::Command {
    let mut cmd = std::process::Command::new("git");
    cmd.current_dir(workdir);

    // Disable system and user config for reproducible behavior
    cmd.env("GIT_CONFIG_NOSYSTEM", "1");
    cmd.env("GIT_CONFIG_GLOBAL", "/dev/null");

    // Disable terminal prompts
    cmd.env("GIT_TERMINAL_PROMPT", "0");

    cmd
}

/// Create a git Command configured for commit operations.
///
/// Extends [`git_command`] with identity config passed via `-c` flags, so
/// no persistent `.git/config` changes are required.
fn git_commit_command(workdir: &Path, identity: &CommitIdentity) -> std::process::Command {
    let mut cmd = git_command(workdir);

    cmd.arg("-c");
    cmd.arg(format!("user.name={}", identity.name));
    cmd.arg("-c");
    cmd.arg(format!("user.email={}", identity.email));

    cmd
}

/// Run a git command in the given working directory.
///
/// Returns the command output on success, or a [`GitError`] on failure.
pub fn run_git(workdir: &Path, args: &[&str]) -> GitResult<Output> {
    let output = git_command(workdir).args(args).output()?;

    if output.status.success() {
        Ok(output)
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let command = format!("git {}", args.join(" "));
        Err(GitError::CommandFailed { command, stderr })
    }
}

/// Run a git command and return trimmed stdout.
pub fn run_git_stdout(workdir: &Path, args: &[&str]) -> GitResult<String> {
    let output = run_git(workdir, args)?;
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Whether the working directory already has version-control metadata.
pub fn is_repo(workdir: &Path) -> bool {
    workdir.join(".git").exists()
}

/// Ensures the working directory is a git repository.
///
/// A missing directory is fatal. When no repository exists yet, initializes
/// one on `trunk_branch` and commits the existing tree as the initial
/// commit (allowed to be empty for a bare project directory).
pub fn ensure_repo(workdir: &Path, trunk_branch: &str, identity: &CommitIdentity) -> GitResult<()> {
    if !workdir.is_dir() {
        return Err(GitError::WorkdirMissing(workdir.display().to_string()));
    }

    if is_repo(workdir) {
        return Ok(());
    }

    run_git(workdir, &["init", "--initial-branch", trunk_branch])?;
    run_git(workdir, &["add", "-A"])?;

    let output = git_commit_command(workdir, identity)
        .args(["commit", "--allow-empty", "-m", "Initial commit"])
        .output()?;
    if !output.status.success() {
        return Err(GitError::CommandFailed {
            command: "git commit --allow-empty -m \"Initial commit\"".to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }

    Ok(())
}

/// Switches to the trunk branch, then creates and switches to `branch`.
///
/// Fails when the branch already exists or the checkout errors.
pub fn create_branch(workdir: &Path, trunk_branch: &str, branch: &str) -> GitResult<()> {
    run_git(workdir, &["checkout", trunk_branch])?;
    run_git(workdir, &["checkout", "-b", branch])?;
    Ok(())
}

/// Whether the working tree has any changes (staged, unstaged, or
/// untracked).
pub fn has_changes(workdir: &Path) -> GitResult<bool> {
    let status = run_git_stdout(workdir, &["status", "--porcelain"])?;
    Ok(!status.is_empty())
}

/// Stages everything and commits it with the given message.
pub fn commit_all(workdir: &Path, identity: &CommitIdentity, message: &str) -> GitResult<()> {
    run_git(workdir, &["add", "-A"])?;

    let output = git_commit_command(workdir, identity)
        .args(["commit", "-m", message])
        .output()?;
    if !output.status.success() {
        return Err(GitError::CommandFailed {
            command: format!("git commit -m {message:?}"),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }

    Ok(())
}

/// Pushes `branch` to origin, creating the upstream tracking reference.
pub fn push_branch(workdir: &Path, branch: &str) -> GitResult<()> {
    let output = git_command(workdir)
        .args(["push", "-u", "origin", branch])
        .output()?;

    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    if stderr.contains("non-fast-forward") || stderr.contains("rejected") {
        return Err(GitError::PushRejected { details: stderr });
    }

    Err(GitError::CommandFailed {
        command: format!("git push -u origin {branch}"),
        stderr,
    })
}

/// Returns the currently checked-out branch name.
pub fn current_branch(workdir: &Path) -> GitResult<String> {
    run_git_stdout(workdir, &["rev-parse", "--abbrev-ref", "HEAD"])
}
