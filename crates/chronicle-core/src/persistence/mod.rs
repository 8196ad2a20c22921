//! Dual-backend persistence.
//!
//! Every session/event write fans out to the primary (Postgres) and local
//! (SQLite) backends in parallel, on native threads — both drivers are
//! synchronous, so there is no async runtime here. The primary call is guarded by a
//! [`CircuitBreaker`] and a bounded retry; the local call is not, since it's
//! the fallback of last resort and must not itself depend on anything that
//! can be circuit-broken.
//!
//! A write is considered durable if *either* backend accepted it — losing
//! the primary must never lose data as long as the local disk is writable.

pub mod local;
pub mod primary;

use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::circuit_breaker::CircuitBreaker;
use crate::error::{ChronicleError, Result};
use crate::types::{EventRecord, Session, SessionAttrs};

const RETRY_ATTEMPTS: u32 = 3;
const RETRY_BASE_MS: u64 = 50;
const RETRY_CAP_MS: u64 = 500;

/// The seam both backend implementations and tests sit behind.
pub trait Backend: Send + Sync {
    fn name(&self) -> &'static str;
    fn upsert_session(&self, claude_session_id: &str, attrs: &SessionAttrs) -> Result<Session>;
    fn insert_event(&self, event: &EventRecord) -> Result<()>;
}

/// Retries `op` on retryable errors only, with exponential backoff capped
/// at `RETRY_CAP_MS`.
pub fn with_retry<T>(mut op: impl FnMut() -> Result<T>) -> Result<T> {
    let mut attempt: u32 = 0;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt + 1 < RETRY_ATTEMPTS => {
                let backoff_ms = RETRY_BASE_MS.saturating_mul(1u64 << attempt).min(RETRY_CAP_MS);
                thread::sleep(Duration::from_millis(backoff_ms));
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Outcome of a dual write: each side is `None` when that backend isn't
/// configured at all (e.g. primary unset, or local disabled).
#[derive(Debug)]
pub struct WriteOutcome<T> {
    pub primary: Option<Result<T>>,
    pub local: Option<Result<T>>,
}

impl<T> WriteOutcome<T> {
    pub fn succeeded(&self) -> bool {
        matches!(self.primary, Some(Ok(_))) || matches!(self.local, Some(Ok(_)))
    }

    /// The first successful value, preferring primary for read-your-writes
    /// consistency (primary carries the authoritative `start_time`/id if
    /// both resolved the same upsert).
    pub fn value(self) -> Option<T> {
        match self.primary {
            Some(Ok(v)) => Some(v),
            _ => match self.local {
                Some(Ok(v)) => Some(v),
                _ => None,
            },
        }
    }
}

pub struct DualWriter {
    primary: Option<Arc<dyn Backend>>,
    local: Option<Arc<dyn Backend>>,
    breaker_path: Option<PathBuf>,
    hook_timeout: Duration,
}

impl DualWriter {
    pub fn new(
        primary: Option<Arc<dyn Backend>>,
        local: Option<Arc<dyn Backend>>,
        breaker_path: Option<PathBuf>,
        hook_timeout_ms: u64,
    ) -> Self {
        Self {
            primary,
            local,
            breaker_path,
            hook_timeout: Duration::from_millis(hook_timeout_ms),
        }
    }

    pub fn upsert_session(&self, claude_session_id: &str, attrs: &SessionAttrs) -> WriteOutcome<Session> {
        let claude_session_id = claude_session_id.to_string();
        let attrs = attrs.clone();
        self.dual_write(move |backend| backend.upsert_session(&claude_session_id, &attrs))
    }

    pub fn insert_event(&self, event: &EventRecord) -> WriteOutcome<()> {
        let event = event.clone();
        self.dual_write(move |backend| backend.insert_event(&event))
    }

    fn dual_write<T>(&self, op: impl Fn(&dyn Backend) -> Result<T> + Send + Sync + 'static) -> WriteOutcome<T>
    where
        T: Send + 'static,
    {
        let op = Arc::new(op);
        let (tx, rx) = mpsc::channel::<(Side, Result<T>)>();
        let mut expected = 0;

        if let Some(primary) = self.primary.clone() {
            expected += 1;
            let tx = tx.clone();
            let op = Arc::clone(&op);
            let breaker_path = self.breaker_path.clone();
            thread::spawn(move || {
                let result = run_guarded(&*primary, breaker_path, &*op);
                let _ = tx.send((Side::Primary, result));
            });
        }

        if let Some(local) = self.local.clone() {
            expected += 1;
            let tx = tx.clone();
            let op = Arc::clone(&op);
            thread::spawn(move || {
                let result = with_retry(|| op(local.as_ref()));
                let _ = tx.send((Side::Local, result));
            });
        }
        drop(tx);

        let mut outcome = WriteOutcome { primary: None, local: None };
        let deadline = self.hook_timeout;
        for _ in 0..expected {
            match rx.recv_timeout(deadline) {
                Ok((Side::Primary, result)) => outcome.primary = Some(result),
                Ok((Side::Local, result)) => outcome.local = Some(result),
                Err(_) => break,
            }
        }
        outcome
    }
}

enum Side {
    Primary,
    Local,
}

fn run_guarded<T>(
    backend: &dyn Backend,
    breaker_path: Option<PathBuf>,
    op: &(dyn Fn(&dyn Backend) -> Result<T> + Send + Sync),
) -> Result<T> {
    let Some(breaker_path) = breaker_path else {
        return with_retry(|| op(backend));
    };

    let mut breaker = CircuitBreaker::load(&breaker_path);
    if !breaker.allow_attempt() {
        return Err(ChronicleError::TransientBackend {
            backend: backend.name(),
            details: "circuit breaker open".to_string(),
        });
    }

    let result = with_retry(|| op(backend));
    match &result {
        Ok(_) => breaker.record_success(),
        Err(err) if err.is_retryable() => breaker.record_failure(),
        Err(_) => {}
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    struct CountingBackend {
        name: &'static str,
        fail_times: usize,
        attempts: AtomicUsize,
    }

    impl Backend for CountingBackend {
        fn name(&self) -> &'static str {
            self.name
        }

        fn upsert_session(&self, claude_session_id: &str, _attrs: &SessionAttrs) -> Result<Session> {
            let n = self.attempts.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_times {
                return Err(ChronicleError::TransientBackend {
                    backend: self.name,
                    details: "simulated".to_string(),
                });
            }
            Ok(Session {
                id: Uuid::new_v4(),
                claude_session_id: claude_session_id.to_string(),
                project_path: None,
                git_branch: None,
                start_time: Utc::now(),
                end_time: None,
                metadata: serde_json::json!({}),
            })
        }

        fn insert_event(&self, _event: &EventRecord) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn succeeds_when_local_only_configured() {
        let local = Arc::new(CountingBackend {
            name: "local",
            fail_times: 0,
            attempts: AtomicUsize::new(0),
        });
        let writer = DualWriter::new(None, Some(local), None, 500);
        let outcome = writer.upsert_session("abc", &SessionAttrs::default());
        assert!(outcome.succeeded());
        assert!(outcome.primary.is_none());
    }

    #[test]
    fn primary_retries_transient_failures_before_succeeding() {
        let primary = Arc::new(CountingBackend {
            name: "primary",
            fail_times: 2,
            attempts: AtomicUsize::new(0),
        });
        let writer = DualWriter::new(Some(primary), None, None, 500);
        let outcome = writer.upsert_session("abc", &SessionAttrs::default());
        assert!(outcome.succeeded());
    }

    #[test]
    fn local_success_survives_primary_failure() {
        let primary = Arc::new(CountingBackend {
            name: "primary",
            fail_times: 10,
            attempts: AtomicUsize::new(0),
        });
        let local = Arc::new(CountingBackend {
            name: "local",
            fail_times: 0,
            attempts: AtomicUsize::new(0),
        });
        let writer = DualWriter::new(Some(primary), Some(local), None, 500);
        let outcome = writer.upsert_session("abc", &SessionAttrs::default());
        assert!(outcome.succeeded());
        assert!(outcome.primary.is_some_and(|r| r.is_err()));
    }
}
