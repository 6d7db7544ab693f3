//! Environment-sourced configuration.
//!
//! Everything is read once at startup into an explicit [`AppConfig`] value
//! that is passed into each component at construction time. There is no
//! ambient global configuration state and no hot reload; tests build
//! fixture configs (or use [`AppConfig::from_lookup`]) without touching the
//! process environment.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::automation::{AgentConfig, CommitIdentity, OrchestratorConfig};
use crate::trigger::TriggerConfig;

/// Errors from configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is not set.
    #[error("missing required environment variable: {0}")]
    MissingVar(&'static str),

    /// A variable is set but unparseable.
    #[error("invalid value for {var}: {detail}")]
    InvalidValue { var: &'static str, detail: String },
}

/// Complete service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Address the HTTP server binds.
    pub bind_addr: SocketAddr,

    /// SQLite database file for the event store.
    pub database_path: PathBuf,

    /// Shared secret for signature verification. `None` disables
    /// verification (a weak default meant for local development only).
    pub webhook_secret: Option<String>,

    /// Local checkout the orchestrator mutates.
    pub repo_path: PathBuf,

    pub trigger: TriggerConfig,
    pub agent: AgentConfig,
    pub orchestrator: OrchestratorConfig,

    /// Wall-clock bound on the PR-hosting command.
    pub pr_timeout: Duration,
}

impl AppConfig {
    /// Loads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Loads configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let host = get_or(&lookup, "HOST", "0.0.0.0");
        let port: u16 = parse_or(&lookup, "PORT", 8000)?;
        let bind_addr = format!("{host}:{port}")
            .parse()
            .map_err(|e| ConfigError::InvalidValue {
                var: "HOST",
                detail: format!("{host}:{port}: {e}"),
            })?;

        let repo_path = lookup("REPO_PATH")
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .ok_or(ConfigError::MissingVar("REPO_PATH"))?;

        let trunk_branch = get_or(&lookup, "TRUNK_BRANCH", "main");
        let trigger_label = get_or(&lookup, "TRIGGER_LABEL", "vibe-coding");

        let agent_defaults = AgentConfig::default();
        let extra_args = match lookup("AGENT_ARGS") {
            Some(args) => args.split_whitespace().map(str::to_string).collect(),
            None => agent_defaults.extra_args,
        };

        Ok(AppConfig {
            bind_addr,
            database_path: PathBuf::from(get_or(&lookup, "DATABASE_PATH", "vibe_pilot.db")),
            webhook_secret: lookup("WEBHOOK_SECRET").filter(|s| !s.is_empty()),
            repo_path,
            trigger: TriggerConfig {
                label: trigger_label.clone(),
                cooldown: Duration::from_secs(parse_or(&lookup, "COOLDOWN_SECONDS", 30)?),
            },
            agent: AgentConfig {
                command: get_or(&lookup, "AGENT_CMD", &agent_defaults.command),
                model: lookup("AGENT_MODEL").filter(|s| !s.is_empty()),
                extra_args,
                timeout: Duration::from_secs(parse_or(&lookup, "AGENT_TIMEOUT_SECONDS", 300)?),
            },
            orchestrator: OrchestratorConfig {
                pr_base: get_or(&lookup, "PR_BASE_BRANCH", &trunk_branch),
                trunk_branch,
                trigger_label,
                identity: CommitIdentity::default(),
            },
            pr_timeout: Duration::from_secs(parse_or(&lookup, "PR_TIMEOUT_SECONDS", 60)?),
        })
    }

    /// Whether inbound signatures are actually checked.
    pub fn signature_verification_active(&self) -> bool {
        self.webhook_secret.is_some()
    }
}

fn get_or(lookup: &impl Fn(&str) -> Option<String>, var: &str, default: &str) -> String {
    lookup(var)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var).filter(|s| !s.is_empty()) {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            var,
            detail: format!("{raw:?}: {e}"),
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var: &str| map.get(var).cloned()
    }

    #[test]
    fn defaults_match_reference_behavior() {
        let config =
            AppConfig::from_lookup(lookup_from(&[("REPO_PATH", "/srv/project")])).unwrap();

        assert_eq!(config.bind_addr.port(), 8000);
        assert_eq!(config.repo_path, PathBuf::from("/srv/project"));
        assert!(config.webhook_secret.is_none());
        assert!(!config.signature_verification_active());
        assert_eq!(config.trigger.label, "vibe-coding");
        assert_eq!(config.trigger.cooldown, Duration::from_secs(30));
        assert_eq!(config.agent.command, "aider");
        assert_eq!(config.agent.timeout, Duration::from_secs(300));
        assert_eq!(config.pr_timeout, Duration::from_secs(60));
        assert_eq!(config.orchestrator.trunk_branch, "main");
        assert_eq!(config.orchestrator.pr_base, "main");
    }

    #[test]
    fn missing_repo_path_is_an_error() {
        let result = AppConfig::from_lookup(lookup_from(&[]));
        assert!(matches!(result, Err(ConfigError::MissingVar("REPO_PATH"))));
    }

    #[test]
    fn overrides_are_honored() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("REPO_PATH", "/srv/project"),
            ("PORT", "9001"),
            ("WEBHOOK_SECRET", "s3cret"),
            ("TRIGGER_LABEL", "autocode"),
            ("COOLDOWN_SECONDS", "60"),
            ("TRUNK_BRANCH", "develop"),
            ("AGENT_CMD", "/opt/bin/agent"),
            ("AGENT_MODEL", "sonnet"),
            ("AGENT_ARGS", "--yes --quiet"),
            ("AGENT_TIMEOUT_SECONDS", "120"),
        ]))
        .unwrap();

        assert_eq!(config.bind_addr.port(), 9001);
        assert_eq!(config.webhook_secret.as_deref(), Some("s3cret"));
        assert!(config.signature_verification_active());
        assert_eq!(config.trigger.label, "autocode");
        assert_eq!(config.trigger.cooldown, Duration::from_secs(60));
        assert_eq!(config.orchestrator.trunk_branch, "develop");
        // PR base follows the trunk when not set explicitly
        assert_eq!(config.orchestrator.pr_base, "develop");
        assert_eq!(config.orchestrator.trigger_label, "autocode");
        assert_eq!(config.agent.command, "/opt/bin/agent");
        assert_eq!(config.agent.model.as_deref(), Some("sonnet"));
        assert_eq!(config.agent.extra_args, vec!["--yes", "--quiet"]);
        assert_eq!(config.agent.timeout, Duration::from_secs(120));
    }

    #[test]
    fn unparseable_numbers_are_rejected() {
        let result = AppConfig::from_lookup(lookup_from(&[
            ("REPO_PATH", "/srv/project"),
            ("COOLDOWN_SECONDS", "soon"),
        ]));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue {
                var: "COOLDOWN_SECONDS",
                ..
            })
        ));
    }

    #[test]
    fn empty_secret_means_verification_disabled() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("REPO_PATH", "/srv/project"),
            ("WEBHOOK_SECRET", ""),
        ]))
        .unwrap();
        assert!(!config.signature_verification_active());
    }
}
