//! The hook pipeline: parse → resolve session → classify → persist → respond.
//!
//! `chronicle-hook`'s `main` is a thin wrapper around [`Engine::handle`]; all
//! the actual decision logic lives here and in `classify`, so unit tests can
//! drive the whole pipeline without spawning a process.

use std::sync::Arc;

use chronicle_protocol::{EventType, HookInput, HookOutput, MAX_STDIN_BYTES};
use serde_json::Value;
use uuid::Uuid;

use crate::classify::{self, Classified};
use crate::config::Config;
use crate::error::Result;
use crate::persistence::local::LocalBackend;
use crate::persistence::primary::{self, PrimaryBackend};
use crate::persistence::{Backend, DualWriter};
use crate::sanitizer::{self, SanitizeOptions};
use crate::types::{Decision, EventRecord, SessionAttrs};

pub struct Engine {
    config: Config,
    writer: DualWriter,
    sanitize_options: SanitizeOptions,
}

impl Engine {
    /// Loads config and wires up whichever backends are actually usable.
    /// A primary connection failure at startup degrades to local-only
    /// rather than failing the hook — losing the primary must never block
    /// the host.
    pub fn bootstrap() -> Result<Self> {
        let config = Config::load()?;

        let local: Option<Arc<dyn Backend>> = if config.local_enabled {
            match LocalBackend::open(&config.local_path) {
                Ok(backend) => Some(Arc::new(backend)),
                Err(err) => {
                    tracing::error!(error = %err, "Failed to open local backend");
                    None
                }
            }
        } else {
            None
        };

        let primary: Option<Arc<dyn Backend>> = if config.primary_configured() {
            match primary::build_pool(config.primary_url.as_deref().unwrap_or_default(), 4) {
                Ok(pool) => Some(Arc::new(PrimaryBackend::new(pool))),
                Err(err) => {
                    tracing::warn!(error = %err, "Failed to connect to primary backend, continuing local-only");
                    None
                }
            }
        } else {
            None
        };

        let breaker_path = crate::config::install_dir().map(|d| d.join("state").join("primary-breaker.json"));

        let sanitize_options = SanitizeOptions {
            extra_patterns: config
                .sanitize_patterns
                .iter()
                .filter_map(|p| regex::Regex::new(p).ok())
                .collect(),
            path_anon: config.sanitize_path_anon,
            max_payload_bytes: config.max_payload_bytes,
            home_dir: dirs::home_dir().map(|p| p.to_string_lossy().to_string()),
        };

        let writer = DualWriter::new(primary, local, breaker_path, config.hook_timeout_ms);

        Ok(Self {
            config,
            writer,
            sanitize_options,
        })
    }

    /// Runs the full pipeline on one hook invocation's raw stdin bytes,
    /// returning the stdout payload and the process exit code.
    pub fn handle(&self, raw_stdin: &[u8]) -> (HookOutput, i32) {
        if raw_stdin.len() > MAX_STDIN_BYTES {
            tracing::warn!(bytes = raw_stdin.len(), "Rejecting oversized hook input");
            return (HookOutput::default_allow(None), 0);
        }

        let input: HookInput = match serde_json::from_slice(raw_stdin) {
            Ok(input) => input,
            Err(err) => {
                tracing::warn!(error = %err, "Failed to parse hook input, defaulting to allow");
                return (HookOutput::default_allow(None), 0);
            }
        };

        let Some(event_type) = EventType::from_camel_case(&input.hook_event_name) else {
            tracing::warn!(event = %input.hook_event_name, "Unrecognized hook event name, defaulting to allow");
            return (HookOutput::default_allow(None), 0);
        };

        let Classified { decision, metadata } = classify::classify(event_type, &input, &self.config);

        self.persist(event_type, &input, &metadata);

        render(event_type, decision)
    }

    fn persist(&self, event_type: EventType, input: &HookInput, metadata: &serde_json::Map<String, Value>) {
        let (claude_session_id, orphan) = resolve_session_key(input);
        let mut metadata = metadata.clone();
        if orphan {
            metadata.insert("orphan".to_string(), Value::Bool(true));
        }

        let attrs = if event_type == EventType::SessionStart {
            SessionAttrs {
                project_path: input.cwd.clone(),
                git_branch: classify::resolve_project_context(input.cwd.as_deref()).git_branch,
                metadata: metadata.clone(),
            }
        } else {
            SessionAttrs::default()
        };

        let session_outcome = self.writer.upsert_session(&claude_session_id, &attrs);
        let Some(session) = session_outcome.value() else {
            tracing::error!(session = %claude_session_id, "Failed to persist session on both backends");
            return;
        };

        let (sanitized_metadata, report) = sanitizer::sanitize(&Value::Object(metadata.clone()), &self.sanitize_options);
        if report.warnings > 0 || report.truncated_fields > 0 {
            tracing::warn!(
                warnings = report.warnings,
                truncated_fields = report.truncated_fields,
                "Sanitizer applied best-effort fallback"
            );
        }

        let mut event = EventRecord {
            id: Uuid::new_v4(),
            session_id: session.id,
            event_type,
            timestamp: chrono::Utc::now(),
            tool_name: metadata.get("tool_name").and_then(Value::as_str).map(str::to_string),
            duration_ms: metadata.get("duration_ms").and_then(Value::as_i64),
            metadata: sanitized_metadata,
        };
        event.enforce_type_field_coherence();

        let outcome = self.writer.insert_event(&event);
        if !outcome.succeeded() {
            tracing::error!(event_id = %event.id, "Failed to persist event on both backends");
        }
    }
}

/// Resolves the session key a payload should be persisted under: the
/// payload's own `session_id`, then the `CLAUDE_SESSION_ID` environment
/// variable, then a freshly synthesized key for an event with no session
/// context at all (the caller marks these `orphan: true`).
fn resolve_session_key(input: &HookInput) -> (String, bool) {
    if let Some(session_id) = input.session_id.clone() {
        return (session_id, false);
    }
    if let Ok(session_id) = std::env::var("CLAUDE_SESSION_ID") {
        if !session_id.is_empty() {
            return (session_id, false);
        }
    }
    (Uuid::new_v4().to_string(), true)
}

fn render(event_type: EventType, decision: Decision) -> (HookOutput, i32) {
    match decision {
        Decision::Allow => (HookOutput::allow(event_type, None), 0),
        Decision::Observe => (HookOutput::observe(event_type, None), 0),
        Decision::Ask { reason } => (HookOutput::ask(event_type, reason), 0),
        Decision::Deny { reason, blocking } => HookOutput::deny(event_type, reason, blocking),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn engine_with_local_only(dir: &std::path::Path) -> Engine {
        let config = Config {
            local_path: dir.join("chronicle.db"),
            ..Config::default()
        };
        let local: Arc<dyn Backend> = Arc::new(LocalBackend::open(&config.local_path).unwrap());
        let writer = DualWriter::new(None, Some(local), None, config.hook_timeout_ms);
        let sanitize_options = SanitizeOptions {
            extra_patterns: Vec::new(),
            path_anon: config.sanitize_path_anon,
            max_payload_bytes: config.max_payload_bytes,
            home_dir: None,
        };
        Engine { config, writer, sanitize_options }
    }

    fn raw_input(event: &str, session_id: &str, extra: Value) -> Vec<u8> {
        let mut obj = json!({
            "hook_event_name": event,
            "session_id": session_id,
        });
        if let (Value::Object(base), Value::Object(extra)) = (&mut obj, extra) {
            for (k, v) in extra {
                base.insert(k, v);
            }
        }
        serde_json::to_vec(&obj).unwrap()
    }

    #[test]
    fn malformed_json_defaults_to_allow_without_panicking() {
        let dir = tempdir().unwrap();
        let engine = engine_with_local_only(dir.path());
        let (output, code) = engine.handle(b"not json");
        assert!(output.continue_);
        assert_eq!(code, 0);
    }

    #[test]
    fn unrecognized_event_name_defaults_to_allow() {
        let dir = tempdir().unwrap();
        let engine = engine_with_local_only(dir.path());
        let raw = raw_input("totally_unknown", "s1", json!({}));
        let (output, code) = engine.handle(&raw);
        assert!(output.continue_);
        assert_eq!(code, 0);
    }

    #[test]
    fn oversized_input_defaults_to_allow() {
        let dir = tempdir().unwrap();
        let engine = engine_with_local_only(dir.path());
        let huge = vec![b'x'; MAX_STDIN_BYTES + 1];
        let (output, code) = engine.handle(&huge);
        assert!(output.continue_);
        assert_eq!(code, 0);
    }

    #[test]
    fn session_start_persists_and_allows() {
        let dir = tempdir().unwrap();
        let engine = engine_with_local_only(dir.path());
        let raw = raw_input("SessionStart", "s1", json!({ "cwd": "/tmp" }));
        let (output, code) = engine.handle(&raw);
        assert!(output.continue_);
        assert_eq!(code, 0);
    }

    #[test]
    fn blocking_deny_returns_exit_code_two() {
        let dir = tempdir().unwrap();
        let engine = engine_with_local_only(dir.path());
        let raw = serde_json::to_vec(&json!({
            "hook_event_name": "PreToolUse",
            "session_id": "s1",
            "tool_name": "Bash",
            "tool_input": { "command": "rm -rf /" }
        }))
        .unwrap();
        let (output, code) = engine.handle(&raw);
        assert_eq!(code, 2);
        assert!(!output.continue_);
    }

    #[test]
    fn resolve_session_key_prefers_payload_session_id() {
        let mut input = json_input("SessionStart", Some("s1"));
        input.extra.insert("cwd".to_string(), Value::String("/tmp".to_string()));
        let (key, orphan) = resolve_session_key(&input);
        assert_eq!(key, "s1");
        assert!(!orphan);
    }

    #[test]
    fn missing_session_id_synthesizes_orphan_key_without_env_fallback() {
        std::env::remove_var("CLAUDE_SESSION_ID");
        let input = json_input("Notification", None);
        let (key, orphan) = resolve_session_key(&input);
        assert!(!key.is_empty());
        assert!(orphan);
    }

    #[test]
    fn orphan_event_is_still_persisted_and_allowed() {
        std::env::remove_var("CLAUDE_SESSION_ID");
        let dir = tempdir().unwrap();
        let engine = engine_with_local_only(dir.path());
        let raw = serde_json::to_vec(&json!({
            "hook_event_name": "Notification",
            "message": "orphaned event"
        }))
        .unwrap();
        let (output, code) = engine.handle(&raw);
        assert!(output.continue_);
        assert_eq!(code, 0);
    }

    fn json_input(event: &str, session_id: Option<&str>) -> HookInput {
        serde_json::from_value(json!({
            "hook_event_name": event,
            "session_id": session_id,
        }))
        .unwrap()
    }
}
