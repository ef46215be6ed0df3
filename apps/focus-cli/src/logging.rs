//! Logging initialization and trace file management.
//!
//! Interactive commands own the terminal, so their tracing output goes to a
//! JSON file at `~/.focusforge/trace/<timestamp>.log`. Every other command
//! logs human-readable lines to stderr.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Maximum age of trace files before cleanup, in days.
const LOG_RETENTION_DAYS: u64 = 3;

/// Initialize the tracing subscriber.
///
/// With `to_file` set, events are written as JSON to a new file under
/// `<home>/trace/`; otherwise they go to stderr.
///
/// Returns an optional [`WorkerGuard`] that must be held for the
/// lifetime of the program to ensure all buffered logs are flushed.
///
/// # Errors
///
/// Returns an error if the trace directory or file cannot be created.
pub fn init_tracing(home: &Path, to_file: bool) -> Result<Option<WorkerGuard>> {
    if !to_file {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .init();
        return Ok(None);
    }

    let (non_blocking, guard) = open_log_writer(home)?;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(filter()),
        )
        .init();
    Ok(Some(guard))
}

/// `RUST_LOG` when set, `info` otherwise.
fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Create the trace directory and file, returning a non-blocking writer and
/// guard.
fn open_log_writer(home: &Path) -> Result<(NonBlocking, WorkerGuard)> {
    let log_path = build_log_path(home, SystemTime::now());
    let log_dir = log_path.parent().context(format!(
        "failed to resolve parent directory for log path: {}",
        log_path.display(),
    ))?;

    fs::create_dir_all(log_dir)
        .with_context(|| format!("failed to create log directory: {}", log_dir.display()))?;

    let log_file = fs::File::create(&log_path)
        .with_context(|| format!("failed to create log file: {}", log_path.display()))?;

    Ok(tracing_appender::non_blocking(log_file))
}

/// Remove trace files older than 3 days from `<home>/trace/`.
///
/// Best-effort: failures on individual files are reported with `eprintln!`
/// (tracing is not initialized yet) and never abort the command.
pub fn cleanup_old_logs(home: &Path) {
    let trace_dir = home.join("trace");
    if !trace_dir.is_dir() {
        return;
    }

    let cutoff = SystemTime::now() - Duration::from_secs(LOG_RETENTION_DAYS * 24 * 60 * 60);
    remove_old_log_files(&trace_dir, cutoff);
}

/// `<home>/trace/<YYYYMMDD_HHMMSS>.log`, in UTC.
fn build_log_path(home: &Path, now: SystemTime) -> PathBuf {
    let timestamp = DateTime::<Utc>::from(now).format("%Y%m%d_%H%M%S");
    home.join("trace").join(format!("{timestamp}.log"))
}

fn remove_old_log_files(dir: &Path, cutoff: SystemTime) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            eprintln!(
                "warning: failed to read trace directory {}: {e}",
                dir.display()
            );
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("log") {
            continue;
        }

        let modified = match fs::metadata(&path).and_then(|m| m.modified()) {
            Ok(t) => t,
            Err(e) => {
                eprintln!(
                    "warning: failed to read metadata for {}: {e}",
                    path.display()
                );
                continue;
            }
        };

        if modified < cutoff
            && let Err(e) = fs::remove_file(&path)
        {
            eprintln!(
                "warning: failed to remove old trace file {}: {e}",
                path.display(),
            );
        }
    }
}
