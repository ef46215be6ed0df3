//! Event types for host consumption.
//!
//! The engine reports what happened during a session through a
//! [`FocusStream`]. The host reads it to redraw the timer, ring the alarm and
//! show non-blocking warnings such as a failed autosave.

use std::path::PathBuf;

use tokio::sync::mpsc;

use crate::config::AlarmProfile;
use crate::logger::SessionLogEntry;
use crate::scheduler::FlushReason;
use crate::session::{SessionState, SessionTick};

/// Handle for consuming engine events.
#[derive(Debug)]
pub struct FocusStream {
    event_rx: mpsc::UnboundedReceiver<FocusEvent>,
}

impl FocusStream {
    pub(crate) fn new(event_rx: mpsc::UnboundedReceiver<FocusEvent>) -> Self {
        Self { event_rx }
    }

    /// Get the next event.
    ///
    /// Returns `None` once the engine has been dropped.
    pub async fn next(&mut self) -> Option<FocusEvent> {
        self.event_rx.recv().await
    }

    /// Get an already queued event without waiting.
    pub fn try_next(&mut self) -> Option<FocusEvent> {
        self.event_rx.try_recv().ok()
    }
}

/// Sending half kept by the engine. Emitting without a subscriber is a no-op.
#[derive(Debug, Default)]
pub(crate) struct EventSink {
    tx: Option<mpsc::UnboundedSender<FocusEvent>>,
}

impl EventSink {
    /// Replace any previous subscriber with a fresh stream.
    pub(crate) fn subscribe(&mut self) -> FocusStream {
        let (tx, rx) = mpsc::unbounded_channel();
        self.tx = Some(tx);
        FocusStream::new(rx)
    }

    pub(crate) fn emit(&self, event: FocusEvent) {
        if let Some(tx) = &self.tx {
            // A closed receiver only means nobody is listening any more.
            let _ = tx.send(event);
        }
    }
}

/// Events emitted while a session runs.
#[derive(Debug, Clone)]
pub enum FocusEvent {
    /// Progress after an `advance` call.
    Tick(SessionTick),

    /// The session moved to a new state.
    StateChanged {
        session_id: String,
        state: SessionState,
    },

    /// A flush reached the note.
    Flushed { reason: FlushReason },

    /// A non-final flush failed. The session keeps going and the next
    /// scheduled flush retries.
    AutosaveFailed {
        reason: FlushReason,
        message: String,
    },

    /// The session log line could not be written.
    LogFailed { message: String },

    /// The countdown finished and the user asked to be alerted.
    Alarm {
        profile: AlarmProfile,
        sound: Option<PathBuf>,
    },

    /// The session reached a terminal state and was released.
    SessionEnded(SessionLogEntry),
}
