//! Configuration types for focus-core.
//!
//! This module defines [`EngineConfig`] (host-level wiring for the engine)
//! and [`TimerSettings`] (user preferences, persisted in
//! `~/.focusforge/config.yaml` by [`SettingsStore`]). Settings are read when a
//! session starts; changing them mid-session has no effect on that session.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use typed_builder::TypedBuilder;

use crate::error::FocusError;
use crate::storage::{AtomicWriter, FsAtomicWriter, read_or_empty};

/// Shortest autosave interval accepted, in seconds.
pub const MIN_AUTOSAVE_INTERVAL_SECS: u64 = 60;

/// Autosave interval used when none is configured, in seconds.
pub const DEFAULT_AUTOSAVE_INTERVAL_SECS: u64 = 120;

/// Returns the FocusForge data directory, `~/.focusforge`.
///
/// Falls back to `./.focusforge` when no home directory can be resolved.
pub fn focusforge_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".focusforge")
}

// ── Engine Configuration (host-level) ────────────────────────

/// Engine configuration provided by the host.
///
/// # Examples
///
/// ```
/// use focus_core::{EngineConfig, TimerSettings};
///
/// let config = EngineConfig::builder()
///     .settings(TimerSettings::default())
///     .log_dir("/tmp/focus-logs")
///     .build();
/// assert_eq!(config.log_dir().to_str(), Some("/tmp/focus-logs"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
pub struct EngineConfig {
    /// Timer preferences snapshot used for sessions started by the engine.
    #[builder(default)]
    settings: TimerSettings,

    /// Directory holding the per-day session logs.
    #[builder(default = focusforge_home().join("logs"), setter(into))]
    log_dir: PathBuf,

    /// Directory with note template overrides.
    #[builder(default, setter(strip_option, into))]
    #[serde(skip_serializing_if = "Option::is_none")]
    template_dir: Option<PathBuf>,
}

impl EngineConfig {
    /// Returns the timer settings.
    pub fn settings(&self) -> &TimerSettings {
        &self.settings
    }

    /// Returns the session log directory.
    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Returns the template override directory, if set.
    pub fn template_dir(&self) -> Option<&Path> {
        self.template_dir.as_deref()
    }
}

// ── Timer Settings (~/.focusforge/config.yaml) ───────────────

/// User preferences for focus sessions.
///
/// All fields have serde defaults so that missing keys in the YAML file
/// produce valid settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TimerSettings {
    /// Seconds of focus time between periodic autosaves.
    #[serde(default = "default_autosave_interval")]
    pub autosave_interval_seconds: u64,

    /// What happens when a session runs to completion.
    #[serde(default)]
    pub alarm_profile: AlarmProfile,

    /// Sound file played by the `custom` alarm profile.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_sound_path: Option<PathBuf>,

    /// Folder for new session notes when the host does not pick one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_folder: Option<PathBuf>,
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self {
            autosave_interval_seconds: default_autosave_interval(),
            alarm_profile: AlarmProfile::default(),
            custom_sound_path: None,
            default_folder: None,
        }
    }
}

impl TimerSettings {
    /// Effective autosave interval, never below [`MIN_AUTOSAVE_INTERVAL_SECS`].
    pub fn autosave_interval(&self) -> u64 {
        self.autosave_interval_seconds.max(MIN_AUTOSAVE_INTERVAL_SECS)
    }

    /// Set the autosave interval in whole minutes (at least one).
    pub fn set_autosave_minutes(&mut self, minutes: u64) {
        self.autosave_interval_seconds = minutes.max(1).saturating_mul(60);
    }
}

/// Alarm played when a session completes naturally.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum AlarmProfile {
    /// No alarm (default).
    #[default]
    Off,
    /// Terminal bell.
    Bell,
    /// Play the file at `customSoundPath`.
    Custom,
}

fn default_autosave_interval() -> u64 {
    DEFAULT_AUTOSAVE_INTERVAL_SECS
}

// ── Settings store ───────────────────────────────────────────

/// Loads and saves [`TimerSettings`] as YAML.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
    writer: Arc<dyn AtomicWriter>,
}

impl SettingsStore {
    /// Create a store for the YAML file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_writer(path, Arc::new(FsAtomicWriter))
    }

    /// Create a store that persists through a custom writer.
    pub fn with_writer(path: impl Into<PathBuf>, writer: Arc<dyn AtomicWriter>) -> Self {
        Self {
            path: path.into(),
            writer,
        }
    }

    /// Store at the default location, `~/.focusforge/config.yaml`.
    pub fn open_default() -> Self {
        Self::new(focusforge_home().join("config.yaml"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load settings. A missing or empty file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns `FocusError::Io` if the file exists but cannot be read.
    /// Returns `FocusError::Config` if the file contains invalid YAML.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn load(&self) -> Result<TimerSettings, FocusError> {
        let content = read_or_empty(&self.path)?;
        if content.trim().is_empty() {
            debug!("no settings file, using defaults");
            return Ok(TimerSettings::default());
        }
        Ok(serde_yaml::from_str(&content)?)
    }

    /// Persist settings, creating the parent directory when needed.
    ///
    /// # Errors
    ///
    /// Returns `FocusError::Io` if the directory or file cannot be written.
    #[instrument(skip(self, settings), fields(path = %self.path.display()))]
    pub fn save(&self, settings: &TimerSettings) -> Result<(), FocusError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let yaml = serde_yaml::to_string(settings)?;
        self.writer.write_atomic(&self.path, &yaml)?;
        debug!("saved timer settings");
        Ok(())
    }
}
