use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use focus_core::{
    ActiveSessionGuard, AlarmProfile, EngineConfig, FocusEngine, FsAtomicWriter, SessionLogEntry,
    SessionLogger, SessionPreset, SessionState, SettingsStore, StartRequest, TimerSettings, format_duration,
};
use tracing::info;

use crate::tui::App;

#[derive(Debug, Parser)]
#[command(
    name = "focus",
    version,
    about = "Focus timer that keeps your session notes up to date"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start a focus session in the terminal timer
    Start {
        /// Session title
        #[arg(short, long, default_value = "")]
        title: String,

        /// Free-form tag, e.g. a course code
        #[arg(long, default_value = "")]
        tag: String,

        /// Preset as WORK/BREAK minutes (25/5, 50/10 or custom)
        #[arg(short, long, conflicts_with = "work")]
        preset: Option<SessionPreset>,

        /// Custom work minutes
        #[arg(long, requires = "break_minutes")]
        work: Option<u64>,

        /// Custom break minutes
        #[arg(long = "break", id = "break_minutes", requires = "work")]
        break_minutes: Option<u64>,

        /// Folder for the new session note
        #[arg(long, conflicts_with = "note")]
        folder: Option<PathBuf>,

        /// Write the summary into an existing note
        #[arg(long)]
        note: Option<PathBuf>,
    },

    /// Show or change timer settings
    Settings {
        /// Minutes of focus time between autosaves (at least 1)
        #[arg(long)]
        autosave_minutes: Option<u64>,

        /// Folder for new session notes
        #[arg(long)]
        default_folder: Option<PathBuf>,

        /// Alarm played when a session completes
        #[arg(long)]
        alarm: Option<AlarmArg>,

        /// Sound file for the custom alarm
        #[arg(long)]
        sound: Option<PathBuf>,
    },

    /// Show the sessions logged for a day
    Log {
        /// Day to show, YYYY-MM-DD (defaults to today, UTC)
        #[arg(short, long)]
        date: Option<NaiveDate>,

        /// Print raw JSON lines
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum AlarmArg {
    Off,
    Bell,
    Custom,
}

impl From<AlarmArg> for AlarmProfile {
    fn from(arg: AlarmArg) -> Self {
        match arg {
            AlarmArg::Off => AlarmProfile::Off,
            AlarmArg::Bell => AlarmProfile::Bell,
            AlarmArg::Custom => AlarmProfile::Custom,
        }
    }
}

impl Cli {
    /// Returns whether the command takes over the terminal.
    pub fn is_interactive(&self) -> bool {
        matches!(self.command, Commands::Start { .. })
    }

    pub async fn run(self, home: &Path) -> Result<()> {
        let store = SettingsStore::new(home.join("config.yaml"));

        match self.command {
            Commands::Start {
                title,
                tag,
                preset,
                work,
                break_minutes,
                folder,
                note,
            } => {
                let preset = match (work, break_minutes) {
                    (Some(work), Some(rest)) => SessionPreset::from_minutes(work, rest),
                    _ => preset.unwrap_or_default(),
                };
                let mut request = StartRequest::builder()
                    .title(title)
                    .tag(tag)
                    .preset(preset)
                    .build();
                request.folder = folder;
                request.existing_note = note;

                let settings = store
                    .load()
                    .with_context(|| format!("failed to load {}", store.path().display()))?;
                start(home, settings, request).await
            }
            Commands::Settings {
                autosave_minutes,
                default_folder,
                alarm,
                sound,
            } => {
                let mut settings = store
                    .load()
                    .with_context(|| format!("failed to load {}", store.path().display()))?;
                let changed = apply_settings(&mut settings, autosave_minutes, default_folder, alarm, sound);
                if changed {
                    store
                        .save(&settings)
                        .with_context(|| format!("failed to save {}", store.path().display()))?;
                    info!(path = %store.path().display(), "settings updated");
                }
                print!("{}", describe_settings(&settings));
                Ok(())
            }
            Commands::Log { date, json } => {
                let date = date.unwrap_or_else(|| Utc::now().date_naive());
                let logger = SessionLogger::new(home.join("logs"));
                let entries = logger.read_day(date)?;

                if json {
                    for entry in &entries {
                        println!("{}", serde_json::to_string(entry)?);
                    }
                } else {
                    print!("{}", describe_day(date, &entries));
                }
                Ok(())
            }
        }
    }
}

async fn start(home: &Path, settings: TimerSettings, request: StartRequest) -> Result<()> {
    let templates = home.join("templates");
    let config = if templates.is_dir() {
        EngineConfig::builder()
            .settings(settings)
            .log_dir(home.join("logs"))
            .template_dir(templates)
            .build()
    } else {
        EngineConfig::builder()
            .settings(settings)
            .log_dir(home.join("logs"))
            .build()
    };

    let mut engine = FocusEngine::new(config, Arc::new(FsAtomicWriter), ActiveSessionGuard::new())?;
    let events = engine.subscribe();
    let session = engine.start(request).await.context("failed to start session")?;

    let app = App::new(engine, events, &session);
    let mut terminal = ratatui::init();
    let result = app.run(&mut terminal).await;
    ratatui::restore();

    if let Some(entry) = result? {
        print!("{}", describe_entry(&entry));
    }
    Ok(())
}

fn apply_settings(
    settings: &mut TimerSettings,
    autosave_minutes: Option<u64>,
    default_folder: Option<PathBuf>,
    alarm: Option<AlarmArg>,
    sound: Option<PathBuf>,
) -> bool {
    let before = settings.clone();
    if let Some(minutes) = autosave_minutes {
        settings.set_autosave_minutes(minutes);
    }
    if let Some(folder) = default_folder {
        settings.default_folder = Some(folder);
    }
    if let Some(alarm) = alarm {
        settings.alarm_profile = alarm.into();
    }
    if let Some(sound) = sound {
        settings.custom_sound_path = Some(sound);
    }
    *settings != before
}

fn describe_settings(settings: &TimerSettings) -> String {
    let path = |p: &Option<PathBuf>| {
        p.as_ref()
            .map_or_else(|| "-".to_owned(), |p| p.display().to_string())
    };
    format!(
        "autosave:       every {}\nalarm:          {:?}\nsound:          {}\ndefault folder: {}\n",
        format_duration(settings.autosave_interval()),
        settings.alarm_profile,
        path(&settings.custom_sound_path),
        path(&settings.default_folder),
    )
}

fn describe_entry(entry: &SessionLogEntry) -> String {
    let tag = if entry.tag.is_empty() {
        String::new()
    } else {
        format!(" [{}]", entry.tag)
    };
    format!(
        "{}  {:<13} {}{}  {} of {}, {} interruptions ({})\n",
        entry.started_at.with_timezone(&Local).format("%H:%M"),
        SessionState::from(entry.outcome).as_str(),
        entry.title,
        tag,
        format_duration(entry.actual_seconds),
        format_duration(entry.expected_seconds),
        entry.interruption_count,
        format_duration(entry.interruption_seconds),
    )
}

fn describe_day(date: NaiveDate, entries: &[SessionLogEntry]) -> String {
    if entries.is_empty() {
        return format!("No sessions logged for {date}.\n");
    }
    let focused: u64 = entries.iter().map(|e| e.actual_seconds).sum();
    let mut out = format!(
        "{date}: {} sessions, {} focused\n",
        entries.len(),
        format_duration(focused)
    );
    for entry in entries {
        out.push_str(&describe_entry(entry));
    }
    out
}
