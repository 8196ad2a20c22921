//! Realtime fan-out contract for the primary backend.
//!
//! Chronicle itself never subscribes — hooks are short-lived processes that
//! exit as soon as they've persisted. This module documents and type-checks
//! the contract a separate dashboard process relies on: the channel names
//! `pg_notify` is wired to by `chronicle_migrations::PRIMARY_SCHEMA_SQL`, and
//! the shape of the payload each channel carries.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// `pg_notify` channel fired by the `AFTER INSERT` trigger on
/// `chronicle_events`. Must match the channel name literal in
/// `chronicle_migrations::PRIMARY_SCHEMA_SQL`'s `chronicle_notify_event`.
pub const EVENTS_CHANNEL: &str = "chronicle_events";

/// `pg_notify` channel fired by the `AFTER INSERT OR UPDATE` trigger on
/// `chronicle_sessions` — distinct from `EVENTS_CHANNEL` so a session's
/// `end_time` update (set by the termination trigger) is observable
/// independently of the `stop` event insert that caused it.
pub const SESSIONS_CHANNEL: &str = "chronicle_sessions";

/// Name of the logical replication publication `chronicle_migrations`
/// creates, covering both tables for a Supabase Realtime-style consumer.
pub const PUBLICATION_NAME: &str = "chronicle_realtime";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventNotification {
    pub id: Uuid,
    pub session_id: Uuid,
    pub event_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionNotification {
    pub id: Uuid,
    pub claude_session_id: String,
    pub end_time: Option<chrono::DateTime<chrono::Utc>>,
}

/// Minimal subscriber seam: a dashboard-side consumer implements this to
/// react to `LISTEN`-delivered payloads without this crate depending on any
/// particular async runtime or Postgres driver.
pub trait RealtimeSubscriber {
    fn on_event(&mut self, notification: EventNotification);
    fn on_session_update(&mut self, notification: SessionNotification);
}

/// Parses a raw `NOTIFY` payload for `EVENTS_CHANNEL`. Returns `None` rather
/// than panicking on malformed JSON — a subscriber should log and continue,
/// not crash a long-running listener over one bad payload.
pub fn parse_event_notification(payload: &str) -> Option<EventNotification> {
    serde_json::from_str(payload).ok()
}

pub fn parse_session_notification(payload: &str) -> Option<SessionNotification> {
    serde_json::from_str(payload).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_names_are_distinct() {
        assert_ne!(EVENTS_CHANNEL, SESSIONS_CHANNEL);
    }

    #[test]
    fn parses_well_formed_event_notification() {
        let payload = serde_json::json!({
            "id": Uuid::new_v4(),
            "session_id": Uuid::new_v4(),
            "event_type": "stop",
        })
        .to_string();
        assert!(parse_event_notification(&payload).is_some());
    }

    #[test]
    fn malformed_payload_does_not_panic() {
        assert!(parse_event_notification("not json").is_none());
        assert!(parse_session_notification("{}").is_none());
    }
}
