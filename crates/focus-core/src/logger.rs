//! Durable per-day session log.
//!
//! Every finished session appends one JSON line to
//! `~/.focusforge/logs/YYYY-MM-DD.jsonl`, keyed by the UTC date the session
//! ended. Lines are written with a single `write_all` on a file opened in
//! append mode, so concurrent appenders never interleave partial lines.

use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::error::FocusError;
use crate::session::{FocusSession, SessionOutcome, SessionState};

/// One line of the session log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionLogEntry {
    pub session_id: String,
    pub title: String,
    pub tag: String,
    pub preset: String,
    pub note_path: PathBuf,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub expected_seconds: u64,
    pub actual_seconds: u64,
    pub interruption_count: u32,
    pub interruption_seconds: u64,
    pub outcome: SessionOutcome,
}

impl SessionLogEntry {
    /// Build the entry for a session in a terminal state.
    ///
    /// Returns `None` while the session is still live.
    pub fn from_session(session: &FocusSession) -> Option<Self> {
        let outcome = match session.state() {
            SessionState::Completed => SessionOutcome::Completed,
            SessionState::StoppedEarly => SessionOutcome::StoppedEarly,
            _ => return None,
        };
        let started_at = session.started_at()?;
        let ended_at = session.ended_at().unwrap_or_else(|| session.wall_time());

        Some(Self {
            session_id: session.id().to_owned(),
            title: session.display_title().to_owned(),
            tag: session.tag().to_owned(),
            preset: session.preset().label(),
            note_path: session.target_path().to_path_buf(),
            started_at,
            ended_at,
            expected_seconds: session.total_seconds(),
            actual_seconds: session.elapsed_seconds(),
            interruption_count: session.interruption_count(),
            interruption_seconds: session.interruption_seconds(),
            outcome,
        })
    }
}

/// Appends [`SessionLogEntry`] lines to per-day JSONL files.
#[derive(Debug, Clone)]
pub struct SessionLogger {
    dir: PathBuf,
}

impl SessionLogger {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the log file for `date`.
    pub fn day_path(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("{}.jsonl", date.format("%Y-%m-%d")))
    }

    /// Append one entry, creating the directory and file on first use.
    ///
    /// # Errors
    ///
    /// Returns `FocusError::LogWrite` if the line cannot be written. Callers
    /// treat this as a warning; it never affects the session outcome.
    #[instrument(skip(self, entry), fields(session_id = %entry.session_id))]
    pub fn append(&self, entry: &SessionLogEntry) -> Result<PathBuf, FocusError> {
        let path = self.day_path(entry.ended_at.date_naive());

        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        write_line(&self.dir, &path, &line).map_err(|source| FocusError::LogWrite {
            path: path.clone(),
            source,
        })?;

        debug!(path = %path.display(), "appended session log entry");
        Ok(path)
    }

    /// Read back every entry logged for `date`. Malformed lines are skipped.
    ///
    /// # Errors
    ///
    /// Returns `FocusError::Io` if the file exists but cannot be read.
    pub fn read_day(&self, date: NaiveDate) -> Result<Vec<SessionLogEntry>, FocusError> {
        let path = self.day_path(date);
        let file = match fs::File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(
                    path = %path.display(),
                    line = index + 1,
                    error = %e,
                    "skipping malformed session log line"
                ),
            }
        }
        Ok(entries)
    }
}

fn write_line(dir: &Path, path: &Path, line: &str) -> io::Result<()> {
    fs::create_dir_all(dir)?;
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(line.as_bytes())
}
