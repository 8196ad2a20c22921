//! Per-event-type decision and metadata extraction.
//!
//! Each event type gets its own narrow function rather than one large
//! match arm doing everything, so the "session_start resolves project
//! context, pre_tool_use applies policy, everything else just observes"
//! shape stays visible at a glance.

use std::path::Path;

use chronicle_protocol::{EventType, HookInput};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use crate::config::Config;
use crate::types::Decision;

pub struct Classified {
    pub decision: Decision,
    pub metadata: Map<String, Value>,
}

pub fn classify(event_type: EventType, input: &HookInput, config: &Config) -> Classified {
    match event_type {
        EventType::SessionStart => session_start(input),
        EventType::PreToolUse => pre_tool_use(input, config),
        EventType::PostToolUse => post_tool_use(input),
        EventType::UserPromptSubmit => user_prompt_submit(input),
        EventType::Stop => stop(input),
        EventType::SubagentStop => subagent_stop(input),
        EventType::PreCompact => pre_compact(input),
        EventType::Notification => notification(input),
        EventType::Error => error_event(input),
    }
}

/// Best-effort project context: path, detected git branch (read directly,
/// never shelled out to `git`), and a package-manifest type hint. Never
/// fails the hook — missing files just mean fewer metadata fields.
pub struct ProjectContext {
    pub project_path: Option<String>,
    pub git_branch: Option<String>,
    pub project_type_hint: Option<&'static str>,
}

pub fn resolve_project_context(cwd: Option<&str>) -> ProjectContext {
    let Some(cwd) = cwd else {
        return ProjectContext {
            project_path: None,
            git_branch: None,
            project_type_hint: None,
        };
    };

    let root = Path::new(cwd);
    ProjectContext {
        project_path: Some(cwd.to_string()),
        git_branch: read_git_branch(root),
        project_type_hint: detect_project_type(root),
    }
}

fn read_git_branch(root: &Path) -> Option<String> {
    let head = fs_err::read_to_string(root.join(".git").join("HEAD")).ok()?;
    let head = head.trim();
    head.strip_prefix("ref: refs/heads/").map(str::to_string)
}

fn detect_project_type(root: &Path) -> Option<&'static str> {
    if root.join("Cargo.toml").is_file() {
        Some("rust")
    } else if root.join("package.json").is_file() {
        Some("node")
    } else {
        None
    }
}

fn session_start(input: &HookInput) -> Classified {
    let context = resolve_project_context(input.cwd.as_deref());
    let mut metadata = Map::new();
    if let Some(hint) = context.project_type_hint {
        metadata.insert("project_type_hint".to_string(), Value::String(hint.to_string()));
    }
    if let Some(source) = &input.trigger {
        metadata.insert("source".to_string(), Value::String(source.clone()));
    }

    Classified {
        decision: Decision::Observe,
        metadata,
    }
}

static FORK_BOMB: Lazy<Regex> = Lazy::new(|| Regex::new(r":\(\)\s*\{\s*:\|:&\s*\};:").unwrap());
static ROOT_RM_RF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\brm\s+(-[a-zA-Z]*r[a-zA-Z]*f[a-zA-Z]*|-[a-zA-Z]*f[a-zA-Z]*r[a-zA-Z]*)\s+/(\s|$)").unwrap());
static FORCE_PUSH: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bgit\s+push\b.*--force\b").unwrap());

fn pre_tool_use(input: &HookInput, config: &Config) -> Classified {
    let mut metadata = Map::new();
    let Some(tool_name) = input.tool_name.clone() else {
        return Classified {
            decision: Decision::Observe,
            metadata,
        };
    };

    let base_name = mcp_base_tool_name(&tool_name);
    metadata.insert("tool_name".to_string(), Value::String(tool_name.clone()));
    if let Some(server) = mcp_server_name(&tool_name) {
        metadata.insert("mcp_server".to_string(), Value::String(server.to_string()));
    }

    if config.auto_approve_deny.iter().any(|n| n == base_name) {
        return Classified {
            decision: Decision::Deny {
                reason: format!("{base_name} is configured as always-deny"),
                blocking: true,
            },
            metadata,
        };
    }

    if let Some(command) = bash_command(input) {
        if FORK_BOMB.is_match(&command) || ROOT_RM_RF.is_match(&command) || FORCE_PUSH.is_match(&command) {
            metadata.insert("matched_high_risk_pattern".to_string(), Value::Bool(true));
            return Classified {
                decision: Decision::Deny {
                    reason: "command matches a high-risk destructive pattern".to_string(),
                    blocking: true,
                },
                metadata,
            };
        }
    }

    if config.auto_approve_allow.iter().any(|n| n == base_name) {
        return Classified {
            decision: Decision::Allow,
            metadata,
        };
    }

    Classified {
        decision: Decision::Observe,
        metadata,
    }
}

/// Strips the `mcp__<server>__` prefix so allow/deny lists can still match
/// on the underlying tool identity.
fn mcp_base_tool_name(tool_name: &str) -> &str {
    if let Some(rest) = tool_name.strip_prefix("mcp__") {
        rest.rsplit("__").next().unwrap_or(rest)
    } else {
        tool_name
    }
}

/// Parses the server segment out of an `mcp__<server>__<tool>` tool name.
fn mcp_server_name(tool_name: &str) -> Option<&str> {
    let rest = tool_name.strip_prefix("mcp__")?;
    let (server, _tool) = rest.split_once("__")?;
    Some(server)
}

fn bash_command(input: &HookInput) -> Option<String> {
    if input.tool_name.as_deref() != Some("Bash") {
        return None;
    }
    input
        .tool_input
        .as_ref()?
        .get("command")?
        .as_str()
        .map(str::to_string)
}

fn post_tool_use(input: &HookInput) -> Classified {
    let mut metadata = Map::new();
    if let Some(tool_name) = &input.tool_name {
        metadata.insert("tool_name".to_string(), Value::String(tool_name.clone()));
    }
    if let Some(response) = &input.tool_response {
        metadata.insert("tool_response".to_string(), response.clone());
    }
    if let Some(duration) = input.extra.get("duration_ms") {
        metadata.insert("duration_ms".to_string(), duration.clone());
    }

    Classified {
        decision: Decision::Observe,
        metadata,
    }
}

fn user_prompt_submit(input: &HookInput) -> Classified {
    let mut metadata = Map::new();
    if let Some(prompt) = &input.prompt {
        metadata.insert("prompt".to_string(), Value::String(prompt.clone()));
    }
    Classified {
        decision: Decision::Observe,
        metadata,
    }
}

fn stop(input: &HookInput) -> Classified {
    let mut metadata = Map::new();
    if let Some(reason) = &input.stop_reason {
        metadata.insert("stop_reason".to_string(), Value::String(reason.clone()));
    }
    // The host only tells us a conversation actually ended via stop_reason
    // being present; that's what flips the termination flag the backend
    // trigger looks for.
    metadata.insert(
        "session_termination".to_string(),
        Value::Bool(input.stop_reason.is_some()),
    );
    Classified {
        decision: Decision::Observe,
        metadata,
    }
}

fn subagent_stop(input: &HookInput) -> Classified {
    let mut metadata = Map::new();
    if let Some(duration) = input.extra.get("duration_ms") {
        metadata.insert("duration_ms".to_string(), duration.clone());
    }
    Classified {
        decision: Decision::Observe,
        metadata,
    }
}

fn pre_compact(input: &HookInput) -> Classified {
    let mut metadata = Map::new();
    if let Some(trigger) = &input.trigger {
        metadata.insert("trigger".to_string(), Value::String(trigger.clone()));
    }
    Classified {
        decision: Decision::Observe,
        metadata,
    }
}

fn notification(input: &HookInput) -> Classified {
    let mut metadata = Map::new();
    if let Some(message) = &input.message {
        metadata.insert("message".to_string(), Value::String(message.clone()));
    }
    Classified {
        decision: Decision::Observe,
        metadata,
    }
}

fn error_event(input: &HookInput) -> Classified {
    let mut metadata = Map::new();
    if let Some(message) = &input.message {
        metadata.insert("message".to_string(), Value::String(message.clone()));
    }
    Classified {
        decision: Decision::Observe,
        metadata,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronicle_protocol::HookInput;
    use serde_json::json;

    fn base_input(event_name: &str) -> HookInput {
        HookInput {
            session_id: Some("s1".to_string()),
            hook_event_name: event_name.to_string(),
            transcript_path: None,
            cwd: None,
            tool_name: None,
            tool_input: None,
            tool_response: None,
            prompt: None,
            message: None,
            stop_reason: None,
            trigger: None,
            extra: Map::new(),
        }
    }

    #[test]
    fn denies_root_rm_rf() {
        let mut input = base_input("PreToolUse");
        input.tool_name = Some("Bash".to_string());
        input.tool_input = Some(json!({ "command": "rm -rf /" }));
        let classified = pre_tool_use(&input, &Config::default());
        assert!(matches!(classified.decision, Decision::Deny { blocking: true, .. }));
    }

    #[test]
    fn denies_force_push() {
        let mut input = base_input("PreToolUse");
        input.tool_name = Some("Bash".to_string());
        input.tool_input = Some(json!({ "command": "git push origin main --force" }));
        let classified = pre_tool_use(&input, &Config::default());
        assert!(matches!(classified.decision, Decision::Deny { blocking: true, .. }));
    }

    #[test]
    fn allows_configured_auto_approve_tools() {
        let mut input = base_input("PreToolUse");
        input.tool_name = Some("Read".to_string());
        let classified = pre_tool_use(&input, &Config::default());
        assert_eq!(classified.decision, Decision::Allow);
    }

    #[test]
    fn mcp_prefixed_tool_matches_allow_list_by_base_name() {
        let mut config = Config::default();
        config.auto_approve_allow.push("search".to_string());
        let mut input = base_input("PreToolUse");
        input.tool_name = Some("mcp__docs__search".to_string());
        let classified = pre_tool_use(&input, &config);
        assert_eq!(classified.decision, Decision::Allow);
    }

    #[test]
    fn mcp_prefixed_tool_records_server_name_in_metadata() {
        let mut input = base_input("PreToolUse");
        input.tool_name = Some("mcp__docs__search".to_string());
        let classified = pre_tool_use(&input, &Config::default());
        assert_eq!(
            classified.metadata.get("mcp_server"),
            Some(&Value::String("docs".to_string()))
        );
    }

    #[test]
    fn plain_tool_name_has_no_mcp_server_metadata() {
        let mut input = base_input("PreToolUse");
        input.tool_name = Some("Bash".to_string());
        let classified = pre_tool_use(&input, &Config::default());
        assert!(!classified.metadata.contains_key("mcp_server"));
    }

    #[test]
    fn unmatched_tool_defaults_to_observe() {
        let mut input = base_input("PreToolUse");
        input.tool_name = Some("SomeOtherTool".to_string());
        let classified = pre_tool_use(&input, &Config::default());
        assert_eq!(classified.decision, Decision::Observe);
    }

    #[test]
    fn stop_with_reason_sets_termination_flag() {
        let mut input = base_input("Stop");
        input.stop_reason = Some("end_turn".to_string());
        let classified = stop(&input);
        assert_eq!(classified.metadata.get("session_termination"), Some(&Value::Bool(true)));
    }

    #[test]
    fn stop_without_reason_does_not_terminate() {
        let input = base_input("Stop");
        let classified = stop(&input);
        assert_eq!(classified.metadata.get("session_termination"), Some(&Value::Bool(false)));
    }
}
