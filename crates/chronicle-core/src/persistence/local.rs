//! SQLite-backed local fallback.
//!
//! WAL journal mode, `synchronous = NORMAL`, and a `busy_timeout` so
//! concurrent short-lived hook processes don't trip over each other's
//! writes without paying for full durability on every call.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chronicle_migrations::LOCAL_SCHEMA_SQL;
use chronicle_protocol::EventType;

use crate::error::{ChronicleError, Result};
use crate::persistence::Backend;
use crate::types::{EventRecord, Session, SessionAttrs};

pub struct LocalBackend {
    path: PathBuf,
    // rusqlite::Connection isn't Sync; one mutex-guarded connection per
    // hook process keeps this backend safe to call from the dual-write
    // thread while still only opening the file once.
    conn: Mutex<Connection>,
}

impl LocalBackend {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let conn = open_connection(&path)?;
        conn.execute_batch(LOCAL_SCHEMA_SQL)
            .map_err(|err| sqlite_error("local", "failed to apply schema", err))?;
        Ok(Self {
            path,
            conn: Mutex::new(conn),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Backend for LocalBackend {
    fn name(&self) -> &'static str {
        "local"
    }

    fn upsert_session(&self, claude_session_id: &str, attrs: &SessionAttrs) -> Result<Session> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| ChronicleError::Internal("local connection mutex poisoned".to_string()))?;

        let existing = conn
            .query_row(
                "SELECT id, claude_session_id, project_path, git_branch, start_time, end_time, metadata \
                 FROM chronicle_sessions WHERE claude_session_id = ?1",
                params![claude_session_id],
                row_to_session,
            )
            .ok();

        let now = Utc::now();
        if let Some(mut session) = existing {
            let project_path = attrs.project_path.clone().or(session.project_path.clone());
            let git_branch = attrs.git_branch.clone().or(session.git_branch.clone());
            let metadata = merge_metadata(&session.metadata, &attrs.metadata);

            conn.execute(
                "UPDATE chronicle_sessions SET project_path = ?1, git_branch = ?2, metadata = ?3 \
                 WHERE id = ?4",
                params![
                    project_path,
                    git_branch,
                    serde_json::to_string(&metadata).unwrap_or_default(),
                    session.id.to_string()
                ],
            )
            .map_err(|err| sqlite_error("local", "failed to update session", err))?;

            session.project_path = project_path;
            session.git_branch = git_branch;
            session.metadata = metadata;
            return Ok(session);
        }

        let id = uuid::Uuid::new_v4();
        let metadata = merge_metadata(&serde_json::json!({}), &attrs.metadata);
        conn.execute(
            "INSERT INTO chronicle_sessions \
                (id, claude_session_id, project_path, git_branch, start_time, end_time, metadata) \
             VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6) \
             ON CONFLICT(claude_session_id) DO NOTHING",
            params![
                id.to_string(),
                claude_session_id,
                attrs.project_path,
                attrs.git_branch,
                now.to_rfc3339(),
                serde_json::to_string(&metadata).unwrap_or_default(),
            ],
        )
        .map_err(|err| sqlite_error("local", "failed to insert session", err))?;

        conn.query_row(
            "SELECT id, claude_session_id, project_path, git_branch, start_time, end_time, metadata \
             FROM chronicle_sessions WHERE claude_session_id = ?1",
            params![claude_session_id],
            row_to_session,
        )
        .map_err(|err| sqlite_error("local", "failed to read back inserted session", err))
    }

    fn insert_event(&self, event: &EventRecord) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| ChronicleError::Internal("local connection mutex poisoned".to_string()))?;

        conn.execute(
            "INSERT INTO chronicle_events \
                (id, session_id, event_type, timestamp, metadata, tool_name, duration_ms) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
             ON CONFLICT(id) DO NOTHING",
            params![
                event.id.to_string(),
                event.session_id.to_string(),
                event.event_type.as_db_str(),
                event.timestamp.to_rfc3339(),
                serde_json::to_string(&event.metadata).unwrap_or_default(),
                event.tool_name,
                event.duration_ms,
            ],
        )
        .map_err(|err| sqlite_error("local", "failed to insert event", err))?;

        Ok(())
    }
}

fn merge_metadata(base: &serde_json::Value, overlay: &serde_json::Map<String, serde_json::Value>) -> serde_json::Value {
    let mut merged = base.as_object().cloned().unwrap_or_default();
    for (k, v) in overlay {
        merged.insert(k.clone(), v.clone());
    }
    serde_json::Value::Object(merged)
}

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<Session> {
    let id: String = row.get(0)?;
    let claude_session_id: String = row.get(1)?;
    let start_time: String = row.get(4)?;
    let end_time: Option<String> = row.get(5)?;
    let metadata: String = row.get(6)?;

    Ok(Session {
        id: parse_uuid(&id),
        claude_session_id,
        project_path: row.get(2)?,
        git_branch: row.get(3)?,
        start_time: parse_rfc3339(&start_time),
        end_time: end_time.map(|s| parse_rfc3339(&s)),
        metadata: serde_json::from_str(&metadata).unwrap_or_else(|_| serde_json::json!({})),
    })
}

fn parse_uuid(s: &str) -> uuid::Uuid {
    uuid::Uuid::parse_str(s).unwrap_or_else(|_| uuid::Uuid::nil())
}

fn parse_rfc3339(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn open_connection(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        fs_err::create_dir_all(parent)
            .map_err(|err| ChronicleError::Io { context: "creating local backend data dir".to_string(), source: err })?;
    }

    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;

    let conn = Connection::open_with_flags(path, flags)
        .map_err(|err| sqlite_error("local", "failed to open database", err))?;

    conn.pragma_update(None, "journal_mode", "WAL")
        .map_err(|err| sqlite_error("local", "failed to enable WAL", err))?;
    conn.pragma_update(None, "synchronous", "NORMAL")
        .map_err(|err| sqlite_error("local", "failed to set synchronous mode", err))?;
    conn.pragma_update(None, "busy_timeout", 5000)
        .map_err(|err| sqlite_error("local", "failed to set busy_timeout", err))?;

    Ok(conn)
}

fn sqlite_error(backend: &'static str, context: &str, err: rusqlite::Error) -> ChronicleError {
    ChronicleError::PermanentBackend {
        backend,
        details: format!("{context}: {err}"),
    }
}

// Every `EventType` must round-trip to the same column value both backends
// write, or the termination trigger's `event_type = 'stop'` comparison in
// `chronicle_migrations::LOCAL_SCHEMA_SQL` silently stops matching.
const _: fn() -> &'static str = || EventType::Stop.as_db_str();
