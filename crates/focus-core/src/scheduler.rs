//! Autosave scheduling.
//!
//! [`AutoSaveScheduler`] only decides; it performs no I/O. The engine asks
//! [`AutoSaveScheduler::check_due`] on every tick and brackets each write with
//! [`begin_flush`](AutoSaveScheduler::begin_flush) /
//! [`finish_flush`](AutoSaveScheduler::finish_flush), which is how the
//! at-most-one-write-in-flight rule is enforced.
//!
//! Periodic flushes are measured in focus (running) seconds, so they are
//! naturally suppressed while a session is paused. The pause boundary flush
//! is requested by the engine directly.

use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::session::{FocusSession, SessionState};

/// Why a flush was requested.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FlushReason {
    Periodic,
    Pause,
    Resume,
    Stop,
    Complete,
    Shutdown,
}

impl FlushReason {
    /// Final flushes decide whether a terminal transition commits.
    pub fn is_final(self) -> bool {
        matches!(
            self,
            FlushReason::Stop | FlushReason::Complete | FlushReason::Shutdown
        )
    }
}

impl fmt::Display for FlushReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FlushReason::Periodic => "periodic",
            FlushReason::Pause => "pause",
            FlushReason::Resume => "resume",
            FlushReason::Stop => "stop",
            FlushReason::Complete => "complete",
            FlushReason::Shutdown => "shutdown",
        };
        f.write_str(s)
    }
}

/// Decides when a session's note should be flushed.
#[derive(Debug, Clone)]
pub struct AutoSaveScheduler {
    interval: u64,
    /// Elapsed focus seconds when the last flush started.
    baseline: u64,
    in_flight: bool,
    cancelled: bool,
    coalesced: u64,
}

impl AutoSaveScheduler {
    /// Create a scheduler flushing every `interval_seconds` of focus time.
    pub fn new(interval_seconds: u64) -> Self {
        Self {
            interval: interval_seconds.max(1),
            baseline: 0,
            in_flight: false,
            cancelled: false,
            coalesced: 0,
        }
    }

    /// Returns `Some(FlushReason::Periodic)` when a periodic flush should start
    /// now. A flush that comes due while another is in flight is skipped, not
    /// queued; the next check looks at the then-current state.
    pub fn check_due(&mut self, session: &FocusSession) -> Option<FlushReason> {
        if self.cancelled || session.state() != SessionState::Running {
            return None;
        }
        if session.elapsed_seconds().saturating_sub(self.baseline) < self.interval {
            return None;
        }
        if self.in_flight {
            self.coalesced += 1;
            debug!(
                session_id = session.id(),
                elapsed = session.elapsed_seconds(),
                "periodic flush coalesced with in-flight write"
            );
            return None;
        }
        Some(FlushReason::Periodic)
    }

    /// Mark a flush as started. Returns `false` if one is already in flight.
    pub fn begin_flush(&mut self, session: &FocusSession) -> bool {
        if self.in_flight {
            return false;
        }
        self.in_flight = true;
        self.baseline = session.elapsed_seconds();
        true
    }

    /// Mark the in-flight flush as done, whatever its result.
    pub fn finish_flush(&mut self) {
        self.in_flight = false;
    }

    /// Stop periodic flushes. Lifecycle flushes are still allowed.
    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    /// Re-enable periodic flushes after a cancelled stop did not commit.
    pub fn reactivate(&mut self) {
        self.cancelled = false;
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn interval(&self) -> u64 {
        self.interval
    }

    /// Focus second at which the next periodic flush comes due.
    pub fn next_due_at(&self) -> u64 {
        self.baseline.saturating_add(self.interval)
    }

    /// Number of periodic flushes skipped because a write was in flight.
    pub fn coalesced(&self) -> u64 {
        self.coalesced
    }
}
