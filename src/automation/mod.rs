//! Automation orchestration: from an accepted trigger to a pull request.
//!
//! The orchestrator sequences the stages
//!
//! ```text
//! RepoReady → BranchCreated → CodeGenerated → Committed? → Pushed → PrCreated
//! ```
//!
//! and records failures per stage instead of propagating them as errors:
//! the webhook delivery is acknowledged regardless, and the caller inspects
//! the returned [`AutomationRun`] to see how far the pipeline got.
//!
//! Failure semantics:
//! - RepoReady/BranchCreated failures abort the run.
//! - A CodeGenerated failure aborts before anything is committed; no push
//!   or PR creation is ever attempted.
//! - Committed is skipped entirely when the agent changed nothing (a PR
//!   with no diff is allowed).
//! - Pushed/PrCreated failures are reported without rollback: a branch or
//!   commit may be left on the remote with no PR. There is deliberately no
//!   compensating deletion.
//!
//! No stage mutates process-global state: every subprocess receives its
//! working directory explicitly, so the caller's environment is untouched
//! no matter which stage fails.

pub mod agent;
pub mod git;
pub mod pr;

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::types::EntityId;
use crate::webhooks::WebhookEnvelope;

pub use agent::{AgentCommand, AgentConfig, AgentError, AgentOutcome, CodingAgent};
pub use git::{CommitIdentity, GitError};
pub use pr::{CreatedPr, GhCli, PrError, PrPublisher, PrRequest};

/// The stages of an automation run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    RepoReady,
    BranchCreated,
    CodeGenerated,
    Committed,
    Pushed,
    PrCreated,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::RepoReady => "repo_ready",
            Stage::BranchCreated => "branch_created",
            Stage::CodeGenerated => "code_generated",
            Stage::Committed => "committed",
            Stage::Pushed => "pushed",
            Stage::PrCreated => "pr_created",
        };
        f.write_str(name)
    }
}

/// A failure captured at one stage.
#[derive(Debug, Clone, Serialize)]
pub struct StageFailure {
    pub stage: Stage,
    pub error: String,
}

/// The accumulated result of one automation run.
///
/// Built incrementally; serialized into the webhook response and logged,
/// never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct AutomationRun {
    pub branch_name: String,
    pub pr_title: String,
    pub pr_body: String,
    pub code_gen_success: bool,
    pub files_changed: bool,
    pub pr_url: Option<String>,
    pub stage_failures: Vec<StageFailure>,
}

impl AutomationRun {
    fn record_failure(&mut self, stage: Stage, error: impl ToString) {
        let error = error.to_string();
        warn!(stage = %stage, error = %error, "Automation stage failed");
        self.stage_failures.push(StageFailure { stage, error });
    }

    /// True when every attempted stage succeeded and a PR exists.
    pub fn completed(&self) -> bool {
        self.stage_failures.is_empty() && self.pr_url.is_some()
    }
}

/// The issue facts the orchestrator needs for naming and PR text.
#[derive(Debug, Clone)]
pub struct EntityInfo {
    pub id: EntityId,
    /// Human-facing identifier, e.g. "ENG-123". Falls back to the raw id.
    pub identifier: String,
    pub title: String,
    pub url: Option<String>,
}

impl EntityInfo {
    pub fn from_envelope(envelope: &WebhookEnvelope) -> Self {
        let id = envelope.entity_id();
        let identifier = envelope
            .data
            .get("identifier")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| id.as_str().to_string());
        let title = envelope
            .data
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or("Untitled")
            .to_string();
        let url = envelope
            .data
            .get("url")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| envelope.url.clone());

        EntityInfo {
            id,
            identifier,
            title,
            url,
        }
    }
}

/// Configuration for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Trunk branch automation branches from.
    pub trunk_branch: String,

    /// Base branch pull requests target (normally the trunk).
    pub pr_base: String,

    /// The trigger label; used as the branch-name prefix and in PR text.
    pub trigger_label: String,

    /// Committer identity for repo initialization and automated commits.
    pub identity: CommitIdentity,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        OrchestratorConfig {
            trunk_branch: "main".to_string(),
            pr_base: "main".to_string(),
            trigger_label: "vibe-coding".to_string(),
            identity: CommitIdentity::default(),
        }
    }
}

/// Drives the automation stages against a working directory.
pub struct Orchestrator {
    config: OrchestratorConfig,
    agent: Arc<dyn CodingAgent>,
    publisher: Arc<dyn PrPublisher>,
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        agent: Arc<dyn CodingAgent>,
        publisher: Arc<dyn PrPublisher>,
    ) -> Self {
        Orchestrator {
            config,
            agent,
            publisher,
        }
    }

    /// Branch name derived deterministically from the entity id,
    /// e.g. `vibe-coding-a41cdb5f`.
    pub fn branch_name(&self, entity: &EntityInfo) -> String {
        format!("{}-{}", self.config.trigger_label, entity.id.short())
    }

    /// Runs the full stage sequence. Never returns an error: every failure
    /// is captured into the returned [`AutomationRun`].
    pub async fn run(&self, workdir: &Path, entity: &EntityInfo, prompt: &str) -> AutomationRun {
        let branch_name = self.branch_name(entity);
        let pr_title = format!(
            "[{}] {}: {}",
            self.config.trigger_label, entity.identifier, entity.title
        );
        let pr_body = self.pr_body(entity, prompt);

        let mut run = AutomationRun {
            branch_name: branch_name.clone(),
            pr_title: pr_title.clone(),
            pr_body: pr_body.clone(),
            code_gen_success: false,
            files_changed: false,
            pr_url: None,
            stage_failures: Vec::new(),
        };

        info!(
            entity = %entity.identifier,
            branch = %branch_name,
            workdir = %workdir.display(),
            "Starting automation run"
        );

        // Stage 1: RepoReady
        {
            let workdir = workdir.to_path_buf();
            let trunk = self.config.trunk_branch.clone();
            let identity = self.config.identity.clone();
            if let Err(e) =
                git_stage(move || git::ensure_repo(&workdir, &trunk, &identity)).await
            {
                run.record_failure(Stage::RepoReady, e);
                return run;
            }
        }

        // Stage 2: BranchCreated
        {
            let workdir = workdir.to_path_buf();
            let trunk = self.config.trunk_branch.clone();
            let branch = branch_name.clone();
            if let Err(e) =
                git_stage(move || git::create_branch(&workdir, &trunk, &branch)).await
            {
                run.record_failure(Stage::BranchCreated, e);
                return run;
            }
        }

        // Stage 3: CodeGenerated. A failure here is recorded, not
        // propagated, but nothing downstream runs: no commit, no push,
        // no PR.
        match self.agent.generate(prompt, workdir).await {
            Ok(outcome) if outcome.success => {
                run.code_gen_success = true;
            }
            Ok(outcome) => {
                run.record_failure(
                    Stage::CodeGenerated,
                    format!(
                        "agent reported failure (exit code {:?}): {}",
                        outcome.exit_code,
                        tail(&outcome.stderr, 500)
                    ),
                );
                return run;
            }
            Err(e) => {
                run.record_failure(Stage::CodeGenerated, e);
                return run;
            }
        }

        // Stage 4: Committed — only when the agent changed something.
        // A clean tree is not an error; the PR may end up with no diff.
        {
            let workdir_buf = workdir.to_path_buf();
            match git_stage(move || git::has_changes(&workdir_buf)).await {
                Ok(changed) => run.files_changed = changed,
                Err(e) => {
                    run.record_failure(Stage::Committed, e);
                    return run;
                }
            }

            if run.files_changed {
                let workdir_buf = workdir.to_path_buf();
                let identity = self.config.identity.clone();
                let message = pr_title.clone();
                if let Err(e) =
                    git_stage(move || git::commit_all(&workdir_buf, &identity, &message)).await
                {
                    run.record_failure(Stage::Committed, e);
                    return run;
                }
            }
        }

        // Stage 5: Pushed
        {
            let workdir_buf = workdir.to_path_buf();
            let branch = branch_name.clone();
            if let Err(e) = git_stage(move || git::push_branch(&workdir_buf, &branch)).await {
                run.record_failure(Stage::Pushed, e);
                return run;
            }
        }

        // Stage 6: PrCreated
        let request = PrRequest {
            title: pr_title,
            body: pr_body,
            head: branch_name,
            base: self.config.pr_base.clone(),
        };
        match self.publisher.create_pr(workdir, &request).await {
            Ok(created) => {
                info!(url = %created.url, "Automation run completed");
                run.pr_url = Some(created.url);
            }
            Err(e) => run.record_failure(Stage::PrCreated, e),
        }

        run
    }

    fn pr_body(&self, entity: &EntityInfo, prompt: &str) -> String {
        let mut body = String::new();
        match &entity.url {
            Some(url) => body.push_str(&format!(
                "Automated change for [{}]({url}).\n",
                entity.identifier
            )),
            None => body.push_str(&format!("Automated change for {}.\n", entity.identifier)),
        }
        body.push_str("\n## Task\n\n");
        body.push_str(prompt);
        body.push_str(&format!(
            "\n\n---\n*This pull request was opened automatically by vibe-pilot \
             in response to the `{}` label. Review carefully before merging.*\n",
            self.config.trigger_label
        ));
        body
    }
}

/// Runs a synchronous git operation on the blocking pool.
async fn git_stage<T, F>(f: F) -> Result<T, String>
where
    T: Send + 'static,
    F: FnOnce() -> git::GitResult<T> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result.map_err(|e| e.to_string()),
        Err(e) => Err(format!("git task failed: {e}")),
    }
}

/// Last `max` characters of command output, for bounded error messages.
fn tail(s: &str, max: usize) -> &str {
    let count = s.chars().count();
    if count <= max {
        s
    } else {
        let (idx, _) = s.char_indices().nth(count - max).unwrap_or((0, ' '));
        &s[idx..]
    }
}
