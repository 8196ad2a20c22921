//! The session/event data model and the hook's decision type.
//!
//! The lingua franca shared by
//! every module in this crate (persistence, sanitizer, classify, engine).

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

use chronicle_protocol::EventType;

/// A single uninterrupted run of the agent.
///
/// The host session identifier is immutable once created; `end_time` is
/// mutated exclusively by the backend's termination trigger — nothing
/// in this crate ever sets it directly.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub claude_session_id: String,
    pub project_path: Option<String>,
    pub git_branch: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub metadata: Value,
}

/// Attributes supplied to `upsert_session`. `None` fields are
/// never used to overwrite an existing non-null value; `metadata` is merged
/// key-by-key, last-writer-wins.
#[derive(Debug, Clone, Default)]
pub struct SessionAttrs {
    pub project_path: Option<String>,
    pub git_branch: Option<String>,
    pub metadata: Map<String, Value>,
}

/// A single observation persisted under a session.
#[derive(Debug, Clone)]
pub struct EventRecord {
    pub id: Uuid,
    pub session_id: Uuid,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub tool_name: Option<String>,
    pub duration_ms: Option<i64>,
    pub metadata: Value,
}

impl EventRecord {
    /// Clears fields that don't apply to this event's type: `duration_ms`
    /// only makes sense on `post_tool_use`/`subagent_stop`; `tool_name` only
    /// on `pre_tool_use`/`post_tool_use` (nullable there too).
    pub fn enforce_type_field_coherence(&mut self) {
        if !matches!(
            self.event_type,
            EventType::PostToolUse | EventType::SubagentStop
        ) {
            self.duration_ms = None;
        }
        if !matches!(
            self.event_type,
            EventType::PreToolUse | EventType::PostToolUse
        ) {
            self.tool_name = None;
        }
    }

    /// True when `metadata.session_termination == true` and the event type
    /// is `stop` — the sole condition the termination trigger fires on.
    pub fn is_session_termination(&self) -> bool {
        self.event_type == EventType::Stop
            && self
                .metadata
                .get("session_termination")
                .and_then(Value::as_bool)
                .unwrap_or(false)
    }
}

/// The hook's decision for an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny { reason: String, blocking: bool },
    Ask { reason: String },
    Observe,
}

impl Decision {
    pub fn blocks(&self) -> bool {
        matches!(self, Decision::Deny { blocking: true, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_event(event_type: EventType) -> EventRecord {
        EventRecord {
            id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            event_type,
            timestamp: Utc::now(),
            tool_name: Some("Read".to_string()),
            duration_ms: Some(42),
            metadata: Value::Object(Map::new()),
        }
    }

    #[test]
    fn coherence_strips_duration_on_non_tool_events() {
        let mut event = base_event(EventType::SessionStart);
        event.enforce_type_field_coherence();
        assert!(event.duration_ms.is_none());
        assert!(event.tool_name.is_none());
    }

    #[test]
    fn coherence_keeps_duration_on_post_tool_use() {
        let mut event = base_event(EventType::PostToolUse);
        event.enforce_type_field_coherence();
        assert_eq!(event.duration_ms, Some(42));
        assert_eq!(event.tool_name.as_deref(), Some("Read"));
    }

    #[test]
    fn coherence_strips_duration_on_pre_tool_use() {
        let mut event = base_event(EventType::PreToolUse);
        event.enforce_type_field_coherence();
        assert!(event.duration_ms.is_none());
        assert_eq!(event.tool_name.as_deref(), Some("Read"));
    }

    #[test]
    fn detects_session_termination_flag() {
        let mut event = base_event(EventType::Stop);
        event.metadata = serde_json::json!({ "session_termination": true });
        assert!(event.is_session_termination());
    }

    #[test]
    fn stop_without_flag_is_not_termination() {
        let event = base_event(EventType::Stop);
        assert!(!event.is_session_termination());
    }

    #[test]
    fn non_stop_event_is_never_termination_even_with_flag() {
        let mut event = base_event(EventType::Notification);
        event.metadata = serde_json::json!({ "session_termination": true });
        assert!(!event.is_session_termination());
    }
}
