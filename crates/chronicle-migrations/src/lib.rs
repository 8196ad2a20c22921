//! Embedded SQL for the two Chronicle backends.
//!
//! Both schemas are kept in one crate so their parity (equivalent columns,
//! primary keys, and the session→event foreign key) is reviewed side by
//! side rather than drifting across two files in two different persistence
//! modules.
//!
//! The primary schema enforces `event_type` with a `CHECK` constraint; the
//! local schema deliberately does not. An over-restrictive CHECK constraint
//! can silently drop valid events it hasn't been taught about yet, so the
//! local fallback simply never had the constraint to begin with.

/// Postgres schema: tables, the session-termination trigger, and the
/// realtime publication. Idempotent — safe to run on every primary
/// connection at startup.
pub const PRIMARY_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS chronicle_sessions (
    id UUID PRIMARY KEY,
    claude_session_id TEXT UNIQUE NOT NULL,
    project_path TEXT,
    git_branch TEXT,
    start_time TIMESTAMPTZ NOT NULL,
    end_time TIMESTAMPTZ NULL,
    metadata JSONB,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS chronicle_events (
    id UUID PRIMARY KEY,
    session_id UUID NOT NULL REFERENCES chronicle_sessions(id),
    event_type TEXT NOT NULL CHECK (event_type IN (
        'session_start', 'pre_tool_use', 'post_tool_use', 'user_prompt_submit',
        'stop', 'subagent_stop', 'pre_compact', 'notification', 'error'
    )),
    timestamp TIMESTAMPTZ NOT NULL,
    metadata JSONB,
    tool_name TEXT NULL,
    duration_ms INTEGER NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX IF NOT EXISTS idx_events_session_timestamp
    ON chronicle_events(session_id, timestamp DESC);

CREATE OR REPLACE FUNCTION chronicle_set_session_end_time() RETURNS TRIGGER AS $$
BEGIN
    IF NEW.event_type = 'stop' AND (NEW.metadata ->> 'session_termination') = 'true' THEN
        UPDATE chronicle_sessions
        SET end_time = NEW.timestamp
        WHERE id = NEW.session_id AND end_time IS NULL;
    END IF;
    RETURN NEW;
END;
$$ LANGUAGE plpgsql;

DROP TRIGGER IF EXISTS chronicle_events_termination ON chronicle_events;
CREATE TRIGGER chronicle_events_termination
    AFTER INSERT ON chronicle_events
    FOR EACH ROW EXECUTE FUNCTION chronicle_set_session_end_time();

CREATE OR REPLACE FUNCTION chronicle_notify_event() RETURNS TRIGGER AS $$
BEGIN
    PERFORM pg_notify('chronicle_events', row_to_json(NEW)::text);
    RETURN NEW;
END;
$$ LANGUAGE plpgsql;

DROP TRIGGER IF EXISTS chronicle_events_notify ON chronicle_events;
CREATE TRIGGER chronicle_events_notify
    AFTER INSERT ON chronicle_events
    FOR EACH ROW EXECUTE FUNCTION chronicle_notify_event();

CREATE OR REPLACE FUNCTION chronicle_notify_session() RETURNS TRIGGER AS $$
BEGIN
    PERFORM pg_notify('chronicle_sessions', row_to_json(NEW)::text);
    RETURN NEW;
END;
$$ LANGUAGE plpgsql;

DROP TRIGGER IF EXISTS chronicle_sessions_notify ON chronicle_sessions;
CREATE TRIGGER chronicle_sessions_notify
    AFTER INSERT OR UPDATE ON chronicle_sessions
    FOR EACH ROW EXECUTE FUNCTION chronicle_notify_session();

DO $$
BEGIN
    IF NOT EXISTS (SELECT 1 FROM pg_publication WHERE pubname = 'chronicle_realtime') THEN
        CREATE PUBLICATION chronicle_realtime FOR TABLE chronicle_sessions, chronicle_events;
    END IF;
END
$$;
"#;

/// SQLite schema for the local fallback backend. WAL mode and
/// `synchronous=NORMAL` are set by the connection opener, not here (spec
/// §4.3) — this text only owns table/trigger/index shape.
pub const LOCAL_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS chronicle_sessions (
    id TEXT PRIMARY KEY,
    claude_session_id TEXT UNIQUE NOT NULL,
    project_path TEXT,
    git_branch TEXT,
    start_time TEXT NOT NULL,
    end_time TEXT NULL,
    metadata TEXT,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

CREATE TABLE IF NOT EXISTS chronicle_events (
    id TEXT PRIMARY KEY,
    session_id TEXT NOT NULL REFERENCES chronicle_sessions(id),
    event_type TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    metadata TEXT,
    tool_name TEXT NULL,
    duration_ms INTEGER NULL,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

CREATE INDEX IF NOT EXISTS idx_events_session_timestamp
    ON chronicle_events(session_id, timestamp DESC);

CREATE TRIGGER IF NOT EXISTS chronicle_events_termination
AFTER INSERT ON chronicle_events
WHEN NEW.event_type = 'stop'
    AND json_extract(NEW.metadata, '$.session_termination') = 1
BEGIN
    UPDATE chronicle_sessions
    SET end_time = NEW.timestamp
    WHERE id = NEW.session_id AND end_time IS NULL;
END;
"#;
