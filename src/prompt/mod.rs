//! Prompt rendering: turning an entity snapshot into the coding agent's
//! task description.
//!
//! Rendering is pure string formatting and total: every nested lookup has a
//! default, so a sparse or drifted payload renders a sparser prompt instead
//! of failing. The dispatch is by entity kind, with a generic fallback for
//! kinds this service has no special rendering for.

use serde_json::{Map, Value};

use crate::webhooks::EventAction;

/// Maximum length of the parent-comment excerpt in reaction prompts.
const COMMENT_EXCERPT_CHARS: usize = 100;

/// Ellipsis marker appended to truncated excerpts.
const ELLIPSIS: &str = "...";

/// Fallback for absent string fields.
const UNKNOWN: &str = "Unknown";

/// The entity kinds with dedicated prompt rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Issue,
    Comment,
    Reaction,
    Other,
}

impl EntityKind {
    pub fn from_type(entity_type: &str) -> Self {
        match entity_type {
            "Issue" => EntityKind::Issue,
            "Comment" => EntityKind::Comment,
            "Reaction" => EntityKind::Reaction,
            _ => EntityKind::Other,
        }
    }
}

/// Renders the agent-facing task description for an event.
///
/// `trigger_label` is flagged specially in the label list so the agent can
/// see which label caused the automation to run.
pub fn render(
    entity_type: &str,
    action: EventAction,
    data: &Map<String, Value>,
    trigger_label: &str,
) -> String {
    match EntityKind::from_type(entity_type) {
        EntityKind::Issue => render_issue(data, trigger_label),
        EntityKind::Comment => render_comment(data),
        EntityKind::Reaction => render_reaction(data),
        EntityKind::Other => render_other(entity_type, action, data),
    }
}

fn render_issue(data: &Map<String, Value>, trigger_label: &str) -> String {
    let identifier = str_at(data, &["identifier"]).unwrap_or(UNKNOWN);
    let title = str_at(data, &["title"]).unwrap_or("Untitled");
    let team = str_at(data, &["team", "name"]).unwrap_or(UNKNOWN);
    let state = str_at(data, &["state", "name"]).unwrap_or(UNKNOWN);
    let url = str_at(data, &["url"]).unwrap_or(UNKNOWN);
    let description = str_at(data, &["description"]).unwrap_or("No description provided.");

    let mut prompt = String::new();
    prompt.push_str("You are implementing a tracked issue from the team's issue tracker.\n\n");
    prompt.push_str(&format!("Issue {identifier}: {title}\n"));
    prompt.push_str(&format!("Team: {team}\n"));
    prompt.push_str(&format!("State: {state}\n"));

    if let Some(assignee) = str_at(data, &["assignee", "name"]) {
        prompt.push_str(&format!("Assignee: {assignee}\n"));
    }

    let labels = label_list(data, trigger_label);
    if !labels.is_empty() {
        prompt.push_str(&format!("Labels: {}\n", labels.join(", ")));
    }

    prompt.push_str(&format!("URL: {url}\n"));
    prompt.push_str(&format!("\nDescription:\n{description}\n"));

    prompt.push_str(
        "\nImplement the change this issue describes. Work directly in the \
         repository you were given: keep the diff focused on the issue, follow \
         the project's existing conventions, and update or add tests where \
         behavior changes. Do not ask questions; make reasonable decisions and \
         note them in code comments only where genuinely needed.\n",
    );

    prompt
}

fn render_comment(data: &Map<String, Value>) -> String {
    let body = str_at(data, &["body"]).unwrap_or("(empty comment)");
    let author = str_at(data, &["user", "name"]).unwrap_or(UNKNOWN);

    let mut prompt = String::new();
    prompt.push_str(&format!("A comment by {author} requests a code change.\n"));

    // The parent issue is embedded when the upstream includes it.
    if let Some(Value::Object(issue)) = data.get("issue") {
        let identifier = str_at(issue, &["identifier"]).unwrap_or(UNKNOWN);
        let title = str_at(issue, &["title"]).unwrap_or("Untitled");
        let state = str_at(issue, &["state", "name"]).unwrap_or(UNKNOWN);
        let team = str_at(issue, &["team", "name"]).unwrap_or(UNKNOWN);
        prompt.push_str(&format!(
            "On issue {identifier}: {title} (state: {state}, team: {team})\n"
        ));
    }

    prompt.push_str(&format!("\nComment:\n{body}\n"));
    prompt
}

fn render_reaction(data: &Map<String, Value>) -> String {
    let emoji = str_at(data, &["emoji"]).unwrap_or(UNKNOWN);
    let author = str_at(data, &["user", "name"]).unwrap_or(UNKNOWN);

    let mut prompt = String::new();
    prompt.push_str(&format!("{author} reacted with :{emoji}:"));

    match str_at(data, &["comment", "body"]) {
        Some(body) => {
            prompt.push_str(&format!(
                " to the comment:\n\"{}\"\n",
                excerpt(body, COMMENT_EXCERPT_CHARS)
            ));
        }
        None => prompt.push('\n'),
    }

    prompt
}

fn render_other(entity_type: &str, action: EventAction, data: &Map<String, Value>) -> String {
    let dump = serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string());
    format!("Event {action} on {entity_type}:\n{dump}\n")
}

/// Follows a path of object keys, returning the string at the end.
fn str_at<'a>(data: &'a Map<String, Value>, path: &[&str]) -> Option<&'a str> {
    let (first, rest) = path.split_first()?;
    let mut current = data.get(*first)?;
    for key in rest {
        current = current.get(*key)?;
    }
    current.as_str()
}

/// Label names with the trigger label flagged.
fn label_list(data: &Map<String, Value>, trigger_label: &str) -> Vec<String> {
    let Some(Value::Array(labels)) = data.get("labels") else {
        return Vec::new();
    };

    labels
        .iter()
        .filter_map(|label| label.get("name").and_then(Value::as_str))
        .map(|name| {
            if name.eq_ignore_ascii_case(trigger_label) {
                format!("{name} (trigger)")
            } else {
                name.to_string()
            }
        })
        .collect()
}

/// Truncates to `max` characters, appending an ellipsis marker when
/// anything was cut. Operates on characters, not bytes, so multi-byte
/// content never splits.
fn excerpt(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{truncated}{ELLIPSIS}")
    }
}
