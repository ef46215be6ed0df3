mod clock;
mod config;
mod engine;
mod error;
mod events;
mod guard;
mod logger;
mod note;
mod scheduler;
mod session;
mod storage;

pub use clock::{ClockStatus, ClockTick, TimerClock};
pub use config::{
    AlarmProfile, DEFAULT_AUTOSAVE_INTERVAL_SECS, EngineConfig, MIN_AUTOSAVE_INTERVAL_SECS,
    SettingsStore, TimerSettings, focusforge_home,
};
pub use engine::{FocusEngine, StartRequest};
pub use error::FocusError;
pub use events::{FocusEvent, FocusStream};
pub use guard::{ActiveSessionGuard, SessionToken};
pub use logger::{SessionLogEntry, SessionLogger};
pub use note::{SessionNoteWriter, format_duration, note_path_for, slugify};
pub use scheduler::{AutoSaveScheduler, FlushReason};
pub use session::{
    ColorState, FocusSession, SessionAction, SessionOutcome, SessionPreset, SessionState,
    SessionTick,
};
pub use storage::{AtomicWriter, FsAtomicWriter};
