//! File-only logging for the hook binary.
//!
//! The hook's stdout and stderr both carry meaning to the host: stdout is
//! the JSON decision payload, stderr is surfaced to the user verbatim on a
//! blocking deny. Nothing here may write to either, so every log line goes
//! to a rolling file under the install directory instead.

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use chronicle_core::Config;

/// Must be kept alive for the life of the process; dropping it stops the
/// background writer thread before buffered lines are flushed.
pub struct LoggingGuard {
    _guard: WorkerGuard,
}

pub fn init(config: &Config) -> Option<LoggingGuard> {
    if config.log_silent {
        return None;
    }

    let log_dir = log_dir();
    if let Err(err) = fs_err::create_dir_all(&log_dir) {
        eprintln!("chronicle-hook: failed to create log directory: {err}");
        return None;
    }

    let file_appender = tracing_appender::rolling::daily(&log_dir, "chronicle-hook.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    let result = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .try_init();

    if result.is_err() {
        // Already initialized (e.g. a test harness set a subscriber first).
        return None;
    }

    Some(LoggingGuard { _guard: guard })
}

fn log_dir() -> PathBuf {
    chronicle_core::config::install_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("logs")
}
