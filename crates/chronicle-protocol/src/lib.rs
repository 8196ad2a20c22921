//! Wire schema for the hook stdin/stdout contract.
//!
//! This crate is shared by every consumer of the contract to prevent schema
//! drift: today that is the `chronicle-hook` binary, and per the core spec
//! it is also where a future HTTP middleware server would anchor its own
//! encoding of the same events. `chronicle-core` owns validation and
//! decision logic; this crate only owns the shapes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const MAX_STDIN_BYTES: usize = 10 * 1024 * 1024;
pub const MAX_ADDITIONAL_CONTEXT_BYTES: usize = 64 * 1024;

/// The closed set of event types the core persists and reasons about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    SessionStart,
    PreToolUse,
    PostToolUse,
    UserPromptSubmit,
    Stop,
    SubagentStop,
    PreCompact,
    Notification,
    Error,
}

impl EventType {
    /// Parses the host's CamelCase spelling (`PreToolUse`) into our closed enum.
    pub fn from_camel_case(name: &str) -> Option<Self> {
        match name {
            "SessionStart" => Some(Self::SessionStart),
            "PreToolUse" => Some(Self::PreToolUse),
            "PostToolUse" => Some(Self::PostToolUse),
            "UserPromptSubmit" => Some(Self::UserPromptSubmit),
            "Stop" => Some(Self::Stop),
            "SubagentStop" => Some(Self::SubagentStop),
            "PreCompact" => Some(Self::PreCompact),
            "Notification" => Some(Self::Notification),
            "Error" => Some(Self::Error),
            _ => None,
        }
    }

    /// The host's CamelCase spelling, for echoing back in `hookSpecificOutput.hookEventName`.
    pub fn to_camel_case(self) -> &'static str {
        match self {
            Self::SessionStart => "SessionStart",
            Self::PreToolUse => "PreToolUse",
            Self::PostToolUse => "PostToolUse",
            Self::UserPromptSubmit => "UserPromptSubmit",
            Self::Stop => "Stop",
            Self::SubagentStop => "SubagentStop",
            Self::PreCompact => "PreCompact",
            Self::Notification => "Notification",
            Self::Error => "Error",
        }
    }

    /// The column value persisted in `chronicle_events.event_type`.
    pub fn as_db_str(self) -> &'static str {
        match self {
            Self::SessionStart => "session_start",
            Self::PreToolUse => "pre_tool_use",
            Self::PostToolUse => "post_tool_use",
            Self::UserPromptSubmit => "user_prompt_submit",
            Self::Stop => "stop",
            Self::SubagentStop => "subagent_stop",
            Self::PreCompact => "pre_compact",
            Self::Notification => "notification",
            Self::Error => "error",
        }
    }
}

/// The JSON object the host feeds on stdin.
///
/// Fields the host sends that we don't model explicitly fall through into
/// `extra`, which the hook pipeline folds into event metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct HookInput {
    #[serde(default)]
    pub session_id: Option<String>,
    pub hook_event_name: String,
    #[serde(default)]
    pub transcript_path: Option<String>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub tool_input: Option<Value>,
    #[serde(default)]
    pub tool_response: Option<Value>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub trigger: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A hook's decision, produced by `chronicle_core::classify` and rendered
/// to stdout by `chronicle-hook`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionDecision {
    Allow,
    Deny,
    Ask,
}

impl PermissionDecision {
    fn as_str(self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
            Self::Ask => "ask",
        }
    }
}

/// The JSON object emitted on stdout.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HookOutput {
    #[serde(rename = "continue")]
    pub continue_: bool,
    pub suppress_output: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    pub hook_specific_output: HookSpecificOutput,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HookSpecificOutput {
    pub hook_event_name: &'static str,
    pub permission_decision: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permission_decision_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_context: Option<String>,
}

impl HookOutput {
    /// The default-allow safety net: used on parse failure, timeout, and any
    /// internal error the hook must never let escape to the host.
    pub fn default_allow(event_type: Option<EventType>) -> Self {
        Self {
            continue_: true,
            suppress_output: false,
            stop_reason: None,
            hook_specific_output: HookSpecificOutput {
                hook_event_name: event_type.map(EventType::to_camel_case).unwrap_or("Unknown"),
                permission_decision: "allow",
                permission_decision_reason: None,
                additional_context: None,
            },
        }
    }

    pub fn allow(event_type: EventType, additional_context: Option<String>) -> Self {
        Self {
            continue_: true,
            suppress_output: false,
            stop_reason: None,
            hook_specific_output: HookSpecificOutput {
                hook_event_name: event_type.to_camel_case(),
                permission_decision: PermissionDecision::Allow.as_str(),
                permission_decision_reason: None,
                additional_context,
            },
        }
    }

    pub fn observe(event_type: EventType, additional_context: Option<String>) -> Self {
        // Observational decisions ride the same envelope as `allow`; the hook
        // never blocks on an `observe` event type.
        Self::allow(event_type, additional_context)
    }

    pub fn deny(event_type: EventType, reason: String, blocking: bool) -> (Self, i32) {
        let output = Self {
            continue_: !blocking,
            suppress_output: false,
            stop_reason: if blocking { Some(reason.clone()) } else { None },
            hook_specific_output: HookSpecificOutput {
                hook_event_name: event_type.to_camel_case(),
                permission_decision: PermissionDecision::Deny.as_str(),
                permission_decision_reason: Some(reason),
                additional_context: None,
            },
        };
        (output, if blocking { 2 } else { 0 })
    }

    pub fn ask(event_type: EventType, reason: String) -> Self {
        Self {
            continue_: true,
            suppress_output: false,
            stop_reason: None,
            hook_specific_output: HookSpecificOutput {
                hook_event_name: event_type.to_camel_case(),
                permission_decision: PermissionDecision::Ask.as_str(),
                permission_decision_reason: Some(reason),
                additional_context: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_camel_case_event_names() {
        for event_type in [
            EventType::SessionStart,
            EventType::PreToolUse,
            EventType::PostToolUse,
            EventType::UserPromptSubmit,
            EventType::Stop,
            EventType::SubagentStop,
            EventType::PreCompact,
            EventType::Notification,
            EventType::Error,
        ] {
            let camel = event_type.to_camel_case();
            assert_eq!(EventType::from_camel_case(camel), Some(event_type));
        }
    }

    #[test]
    fn rejects_lowercase_event_name() {
        // The host rejects a lowercase event name; we must not silently
        // accept one either.
        assert_eq!(EventType::from_camel_case("pretooluse"), None);
    }

    #[test]
    fn default_allow_has_no_event_name_when_unclassified() {
        let output = HookOutput::default_allow(None);
        assert!(output.continue_);
        assert_eq!(output.hook_specific_output.permission_decision, "allow");
    }

    #[test]
    fn blocking_deny_uses_exit_code_two() {
        let (output, code) =
            HookOutput::deny(EventType::PreToolUse, "destructive command".into(), true);
        assert_eq!(code, 2);
        assert!(!output.continue_);
    }

    #[test]
    fn non_blocking_deny_uses_exit_code_zero() {
        let (output, code) =
            HookOutput::deny(EventType::PreToolUse, "soft deny".into(), false);
        assert_eq!(code, 0);
        assert!(output.continue_);
    }

    #[test]
    fn extra_fields_are_captured() {
        let raw = serde_json::json!({
            "hook_event_name": "PreToolUse",
            "session_id": "s1",
            "custom_field": "x",
        });
        let input: HookInput = serde_json::from_value(raw).unwrap();
        assert_eq!(
            input.extra.get("custom_field").and_then(Value::as_str),
            Some("x")
        );
    }
}
