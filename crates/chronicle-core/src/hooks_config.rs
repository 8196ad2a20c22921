//! Hook installation descriptors.
//!
//! Installing hooks into `settings.json` is out of scope here, but the
//! descriptor shape and its validator are not — any installer built later
//! reuses this instead of re-deriving two historical regressions: a
//! wildcard matcher swallowing every tool, and a lowercase event name that
//! silently never matches anything the host actually emits.

use serde::{Deserialize, Serialize};

use chronicle_protocol::EventType;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookRegistration {
    pub event_type: EventType,
    /// `None` means "match every invocation of this event type" — the only
    /// valid way to express "all tools"; the literal string `"*"` is the
    /// regression this validator rejects.
    pub matcher: Option<String>,
    pub command: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    WildcardMatcher,
    LowercaseEventName(String),
    EmptyCommand,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::WildcardMatcher => {
                write!(f, "matcher must be omitted, not \"*\", to match every tool")
            }
            ValidationError::LowercaseEventName(name) => {
                write!(f, "event name {name:?} must use the host's camelCase spelling")
            }
            ValidationError::EmptyCommand => write!(f, "command must not be empty"),
        }
    }
}

/// Rejects the two historical installer regressions plus the basic
/// well-formedness an installer can't skip.
pub fn validate(registration: &HookRegistration) -> Result<(), ValidationError> {
    if registration.matcher.as_deref() == Some("*") {
        return Err(ValidationError::WildcardMatcher);
    }

    if registration.command.trim().is_empty() {
        return Err(ValidationError::EmptyCommand);
    }

    Ok(())
}

/// Rejects a raw, not-yet-parsed event name string from a hand-edited
/// config file before it ever reaches `EventType::from_camel_case`.
pub fn validate_raw_event_name(name: &str) -> Result<(), ValidationError> {
    if EventType::from_camel_case(name).is_none() {
        return Err(ValidationError::LowercaseEventName(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration(event_type: EventType, matcher: Option<&str>) -> HookRegistration {
        HookRegistration {
            event_type,
            matcher: matcher.map(str::to_string),
            command: "chronicle-hook".to_string(),
        }
    }

    #[test]
    fn rejects_wildcard_matcher() {
        let reg = registration(EventType::PreToolUse, Some("*"));
        assert_eq!(validate(&reg), Err(ValidationError::WildcardMatcher));
    }

    #[test]
    fn accepts_missing_matcher_as_match_all() {
        let reg = registration(EventType::PreToolUse, None);
        assert!(validate(&reg).is_ok());
    }

    #[test]
    fn accepts_specific_matcher() {
        let reg = registration(EventType::PreToolUse, Some("Bash"));
        assert!(validate(&reg).is_ok());
    }

    #[test]
    fn rejects_empty_command() {
        let mut reg = registration(EventType::Stop, None);
        reg.command = "   ".to_string();
        assert_eq!(validate(&reg), Err(ValidationError::EmptyCommand));
    }

    #[test]
    fn rejects_lowercase_event_name_literal() {
        assert_eq!(
            validate_raw_event_name("pretooluse"),
            Err(ValidationError::LowercaseEventName("pretooluse".to_string()))
        );
        assert!(validate_raw_event_name("PreToolUse").is_ok());
    }
}
