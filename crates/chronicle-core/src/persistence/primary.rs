//! Postgres-backed primary store.
//!
//! Uses `diesel` with an r2d2 pool, but raw `diesel::sql_query` /
//! `QueryableByName` rather than `table!`-generated query DSL, since the
//! schema here is owned by `chronicle_migrations`, not by a `schema.rs`
//! checked into this crate.

use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::r2d2::{self, ConnectionManager};
use diesel::sql_types::{Nullable, Text, Timestamptz};
use diesel::{QueryableByName, RunQueryDsl};
use serde_json::Value;
use std::sync::Mutex;

use chronicle_migrations::PRIMARY_SCHEMA_SQL;

use crate::error::{ChronicleError, Result};
use crate::persistence::Backend;
use crate::types::{EventRecord, Session, SessionAttrs};

pub type PgPool = r2d2::Pool<ConnectionManager<PgConnection>>;

#[derive(QueryableByName)]
struct SessionRow {
    #[diesel(sql_type = Text)]
    id: String,
    #[diesel(sql_type = Text)]
    claude_session_id: String,
    #[diesel(sql_type = Nullable<Text>)]
    project_path: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    git_branch: Option<String>,
    #[diesel(sql_type = Timestamptz)]
    start_time: DateTime<Utc>,
    #[diesel(sql_type = diesel::sql_types::Nullable<Timestamptz>)]
    end_time: Option<DateTime<Utc>>,
    #[diesel(sql_type = diesel::sql_types::Jsonb)]
    metadata: Value,
}

impl From<SessionRow> for Session {
    fn from(row: SessionRow) -> Self {
        Session {
            id: uuid::Uuid::parse_str(&row.id).unwrap_or_else(|_| uuid::Uuid::nil()),
            claude_session_id: row.claude_session_id,
            project_path: row.project_path,
            git_branch: row.git_branch,
            start_time: row.start_time,
            end_time: row.end_time,
            metadata: row.metadata,
        }
    }
}

/// Builds an r2d2 pool for `database_url` and applies the primary schema
/// once via the first checked-out connection.
pub fn build_pool(database_url: &str, max_size: u32) -> Result<PgPool> {
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = r2d2::Pool::builder()
        .max_size(max_size.max(1))
        .build(manager)
        .map_err(|err| ChronicleError::TransientBackend {
            backend: "primary",
            details: format!("failed to build connection pool: {err}"),
        })?;

    let mut conn = pool.get().map_err(|err| ChronicleError::TransientBackend {
        backend: "primary",
        details: format!("failed to check out connection for migration: {err}"),
    })?;
    diesel::sql_query(PRIMARY_SCHEMA_SQL)
        .execute(&mut conn)
        .map_err(|err| classify_pg_error(err))?;

    Ok(pool)
}

pub struct PrimaryBackend {
    pool: Mutex<PgPool>,
}

impl PrimaryBackend {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Mutex::new(pool) }
    }
}

impl Backend for PrimaryBackend {
    fn name(&self) -> &'static str {
        "primary"
    }

    fn upsert_session(&self, claude_session_id: &str, attrs: &SessionAttrs) -> Result<Session> {
        let pool = self
            .pool
            .lock()
            .map_err(|_| ChronicleError::Internal("primary pool mutex poisoned".to_string()))?;
        let mut conn = pool.get().map_err(|err| ChronicleError::TransientBackend {
            backend: "primary",
            details: format!("pool exhausted: {err}"),
        })?;

        let metadata = Value::Object(attrs.metadata.clone());
        let id = uuid::Uuid::new_v4();

        let rows: Vec<SessionRow> = diesel::sql_query(
            "INSERT INTO chronicle_sessions (id, claude_session_id, project_path, git_branch, start_time, metadata) \
             VALUES ($1, $2, $3, $4, now(), $5) \
             ON CONFLICT (claude_session_id) DO UPDATE SET \
                project_path = COALESCE(EXCLUDED.project_path, chronicle_sessions.project_path), \
                git_branch = COALESCE(EXCLUDED.git_branch, chronicle_sessions.git_branch), \
                metadata = chronicle_sessions.metadata || EXCLUDED.metadata \
             RETURNING id::text, claude_session_id, project_path, git_branch, start_time, end_time, metadata",
        )
        .bind::<diesel::sql_types::Uuid, _>(id)
        .bind::<Text, _>(claude_session_id)
        .bind::<Nullable<Text>, _>(attrs.project_path.clone())
        .bind::<Nullable<Text>, _>(attrs.git_branch.clone())
        .bind::<diesel::sql_types::Jsonb, _>(metadata)
        .load(&mut conn)
        .map_err(classify_pg_error)?;

        rows.into_iter()
            .next()
            .map(Session::from)
            .ok_or_else(|| ChronicleError::Internal("upsert_session returned no row".to_string()))
    }

    fn insert_event(&self, event: &EventRecord) -> Result<()> {
        let pool = self
            .pool
            .lock()
            .map_err(|_| ChronicleError::Internal("primary pool mutex poisoned".to_string()))?;
        let mut conn = pool.get().map_err(|err| ChronicleError::TransientBackend {
            backend: "primary",
            details: format!("pool exhausted: {err}"),
        })?;

        diesel::sql_query(
            "INSERT INTO chronicle_events (id, session_id, event_type, timestamp, metadata, tool_name, duration_ms) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (id) DO NOTHING",
        )
        .bind::<diesel::sql_types::Uuid, _>(event.id)
        .bind::<diesel::sql_types::Uuid, _>(event.session_id)
        .bind::<Text, _>(event.event_type.as_db_str())
        .bind::<Timestamptz, _>(event.timestamp)
        .bind::<diesel::sql_types::Jsonb, _>(event.metadata.clone())
        .bind::<Nullable<Text>, _>(event.tool_name.clone())
        .bind::<Nullable<diesel::sql_types::BigInt>, _>(event.duration_ms)
        .execute(&mut conn)
        .map_err(classify_pg_error)?;

        Ok(())
    }
}

/// Collapses `diesel::result::Error` onto our error kinds: connection/pool
/// issues and serialization conflicts are transient; schema and constraint
/// violations are permanent.
fn classify_pg_error(err: diesel::result::Error) -> ChronicleError {
    use diesel::result::DatabaseErrorKind;
    use diesel::result::Error as DieselError;

    match &err {
        DieselError::DatabaseError(DatabaseErrorKind::SerializationFailure, _)
        | DieselError::DatabaseError(DatabaseErrorKind::UnableToSendCommand, _) => {
            ChronicleError::TransientBackend {
                backend: "primary",
                details: err.to_string(),
            }
        }
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
            ChronicleError::TransientBackend {
                backend: "primary",
                details: err.to_string(),
            }
        }
        DieselError::NotFound => ChronicleError::PermanentBackend {
            backend: "primary",
            details: "no matching row".to_string(),
        },
        _ => ChronicleError::PermanentBackend {
            backend: "primary",
            details: err.to_string(),
        },
    }
}
