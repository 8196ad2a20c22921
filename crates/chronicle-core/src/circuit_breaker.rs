//! Persisted circuit breaker for the primary backend.
//!
//! Each hook invocation is a fresh process, so the breaker's state has to
//! outlive it: load a small JSON file, mutate it, write-then-rename it
//! back atomically.

use chrono::{DateTime, Utc};
use fs_err as fs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

const FAILURE_THRESHOLD: u32 = 5;
const OPEN_DURATION_SECS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PersistedState {
    consecutive_failures: u32,
    opened_at: Option<DateTime<Utc>>,
    /// Set while a half-open probe is in flight, so a second concurrent hook
    /// process doesn't also treat itself as the probe.
    probe_in_flight: bool,
}

/// File-backed breaker for one backend. `path` is typically
/// `<install>/state/<backend>-breaker.json`.
pub struct CircuitBreaker {
    path: PathBuf,
    state: PersistedState,
}

impl CircuitBreaker {
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = load_state(&path).unwrap_or_default();
        Self { path, state }
    }

    /// Decides whether a call to the guarded backend should even be
    /// attempted right now, per the open/half-open/closed model.
    pub fn current_state(&self) -> BreakerState {
        match self.state.opened_at {
            None => BreakerState::Closed,
            Some(opened_at) => {
                let elapsed = Utc::now().signed_duration_since(opened_at).num_seconds();
                if elapsed < OPEN_DURATION_SECS {
                    BreakerState::Open
                } else if self.state.probe_in_flight {
                    BreakerState::Open
                } else {
                    BreakerState::HalfOpen
                }
            }
        }
    }

    /// Whether the caller should attempt the guarded operation at all.
    /// `HalfOpen` permits exactly one caller through as the probe.
    pub fn allow_attempt(&mut self) -> bool {
        match self.current_state() {
            BreakerState::Closed => true,
            BreakerState::Open => false,
            BreakerState::HalfOpen => {
                self.state.probe_in_flight = true;
                self.persist();
                true
            }
        }
    }

    pub fn record_success(&mut self) {
        self.state.consecutive_failures = 0;
        self.state.opened_at = None;
        self.state.probe_in_flight = false;
        self.persist();
    }

    pub fn record_failure(&mut self) {
        self.state.consecutive_failures += 1;
        self.state.probe_in_flight = false;
        if self.state.consecutive_failures >= FAILURE_THRESHOLD && self.state.opened_at.is_none() {
            self.state.opened_at = Some(Utc::now());
        } else if self.state.opened_at.is_some() {
            // A failed half-open probe re-opens the breaker for another
            // full duration rather than accumulating toward a fresh threshold.
            self.state.opened_at = Some(Utc::now());
        }
        self.persist();
    }

    fn persist(&self) {
        if let Err(err) = save_state(&self.path, &self.state) {
            warn!(error = %err, path = %self.path.display(), "Failed to persist circuit breaker state");
        }
    }
}

fn load_state(path: &Path) -> Option<PersistedState> {
    match fs::read(path) {
        Ok(data) => serde_json::from_slice(&data).ok(),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Some(PersistedState::default()),
        Err(err) => {
            warn!(error = %err, path = %path.display(), "Failed to read circuit breaker state");
            Some(PersistedState::default())
        }
    }
}

fn save_state(path: &Path, state: &PersistedState) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let payload = serde_json::to_vec_pretty(state)
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err))?;
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, payload)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn breaker_at(dir: &Path) -> CircuitBreaker {
        CircuitBreaker::load(dir.join("primary-breaker.json"))
    }

    #[test]
    fn starts_closed() {
        let dir = tempdir().unwrap();
        let mut breaker = breaker_at(dir.path());
        assert_eq!(breaker.current_state(), BreakerState::Closed);
        assert!(breaker.allow_attempt());
    }

    #[test]
    fn opens_after_threshold_consecutive_failures() {
        let dir = tempdir().unwrap();
        let mut breaker = breaker_at(dir.path());
        for _ in 0..FAILURE_THRESHOLD {
            breaker.record_failure();
        }
        assert_eq!(breaker.current_state(), BreakerState::Open);
        assert!(!breaker.allow_attempt());
    }

    #[test]
    fn success_resets_failure_count() {
        let dir = tempdir().unwrap();
        let mut breaker = breaker_at(dir.path());
        for _ in 0..FAILURE_THRESHOLD - 1 {
            breaker.record_failure();
        }
        breaker.record_success();
        assert_eq!(breaker.state.consecutive_failures, 0);
        assert_eq!(breaker.current_state(), BreakerState::Closed);
    }

    #[test]
    fn state_survives_reload_from_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("primary-breaker.json");
        {
            let mut breaker = CircuitBreaker::load(&path);
            for _ in 0..FAILURE_THRESHOLD {
                breaker.record_failure();
            }
        }
        let reloaded = CircuitBreaker::load(&path);
        assert_eq!(reloaded.current_state(), BreakerState::Open);
    }

    #[test]
    fn half_open_after_duration_elapses() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("primary-breaker.json");
        let mut breaker = CircuitBreaker::load(&path);
        for _ in 0..FAILURE_THRESHOLD {
            breaker.record_failure();
        }
        breaker.state.opened_at = Some(Utc::now() - chrono::Duration::seconds(OPEN_DURATION_SECS + 1));
        assert_eq!(breaker.current_state(), BreakerState::HalfOpen);
        assert!(breaker.allow_attempt());
    }
}
