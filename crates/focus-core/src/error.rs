use std::path::PathBuf;

use thiserror::Error;

use crate::session::{SessionAction, SessionState};

#[derive(Debug, Error)]
pub enum FocusError {
    #[error("cannot {action} a session that is {from}")]
    InvalidStateTransition {
        from: SessionState,
        action: SessionAction,
    },

    #[error("invalid preset '{0}', expected WORK/BREAK in minutes (e.g. 25/5)")]
    InvalidPreset(String),

    #[error("a focus session is already active")]
    AlreadyActive,

    #[error("no focus session is active")]
    NoActiveSession,

    #[error("autosave to {} failed: {source}", path.display())]
    AutosaveWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("final save to {} failed: {source}", path.display())]
    FinalSave {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to append session log {}: {source}", path.display())]
    LogWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("template error: {0}")]
    Template(#[from] focus_tpl::TplError),

    #[error("config error: {0}")]
    Config(#[from] serde_yaml::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("background flush task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl FocusError {
    /// Returns whether the error leaves the session usable, so the caller
    /// can keep ticking and let the next flush retry.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            FocusError::AutosaveWrite { .. } | FocusError::LogWrite { .. }
        )
    }
}
