//! Terminal timer.
//!
//! [`App`] owns the engine for the duration of one session and drives it
//! once per second from a tokio interval, handling keys from crossterm's
//! async event stream in the same `select!` loop.

use std::io::{self, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::{DateTime, Local};
use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use focus_core::{
    AlarmProfile, ColorState, FocusEngine, FocusError, FocusEvent, FocusSession, FocusStream,
    SessionLogEntry, SessionState, SessionTick, format_duration,
};
use futures::StreamExt;
use ratatui::DefaultTerminal;
use ratatui::Frame;
use ratatui::layout::{Constraint, Layout};
use ratatui::style::{Color, Style, Stylize};
use ratatui::text::Line;
use ratatui::widgets::{Block, Gauge, Paragraph};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{info, warn};

/// What a key press asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    TogglePause,
    Stop,
    Discard,
    Quit,
    None,
}

fn key_action(key: KeyEvent) -> Action {
    if key.kind != KeyEventKind::Press {
        return Action::None;
    }
    match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Action::Quit,
        KeyCode::Char('p') | KeyCode::Char(' ') => Action::TogglePause,
        KeyCode::Char('s') => Action::Stop,
        KeyCode::Char('d') => Action::Discard,
        KeyCode::Char('q') | KeyCode::Esc => Action::Quit,
        _ => Action::None,
    }
}

fn gauge_color(color: ColorState) -> Color {
    match color {
        ColorState::Normal => Color::Green,
        ColorState::Warning => Color::Yellow,
        ColorState::Final => Color::Red,
    }
}

/// Turns wall-clock gaps between interval ticks into whole seconds,
/// carrying the fraction over to the next tick.
#[derive(Debug)]
struct TickAccumulator {
    last: Instant,
    carry: Duration,
}

impl TickAccumulator {
    fn new(now: Instant) -> Self {
        Self {
            last: now,
            carry: Duration::ZERO,
        }
    }

    fn seconds_since_last(&mut self, now: Instant) -> u64 {
        let total = self.carry + now.saturating_duration_since(self.last);
        self.last = now;
        let whole = total.as_secs();
        self.carry = total - Duration::from_secs(whole);
        whole
    }
}

/// Main TUI application state.
pub struct App {
    engine: FocusEngine,
    events: FocusStream,
    title: String,
    tag: String,
    preset: String,
    note: PathBuf,
    tick: SessionTick,
    interruptions: u32,
    last_saved: Option<DateTime<Local>>,
    status: Option<(String, Color)>,
    ended: Option<SessionLogEntry>,
    running: bool,
}

impl App {
    pub fn new(engine: FocusEngine, events: FocusStream, session: &FocusSession) -> Self {
        Self {
            engine,
            events,
            title: session.display_title().to_owned(),
            tag: session.tag().to_owned(),
            preset: session.preset().label(),
            note: session.target_path().to_path_buf(),
            tick: session.tick(),
            interruptions: session.interruption_count(),
            last_saved: None,
            status: None,
            ended: None,
            running: true,
        }
    }

    /// Run the TUI event loop until the user quits.
    ///
    /// Returns the log entry of the finished session, if it ended.
    pub async fn run(mut self, terminal: &mut DefaultTerminal) -> Result<Option<SessionLogEntry>> {
        let mut keys = EventStream::new();
        let mut ticker = interval(Duration::from_secs(1));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut clock = TickAccumulator::new(Instant::now());

        while self.running {
            terminal.draw(|frame| self.draw(frame))?;

            tokio::select! {
                _ = ticker.tick() => {
                    let delta = clock.seconds_since_last(Instant::now());
                    self.on_tick(delta).await;
                }
                event = keys.next() => match event {
                    Some(Ok(Event::Key(key))) => self.on_action(key_action(key)).await,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                    None => self.quit().await,
                },
            }

            self.drain_events();
        }
        Ok(self.ended)
    }

    async fn on_tick(&mut self, delta: u64) {
        if self.engine.session().is_none() || delta == 0 {
            return;
        }
        match self.engine.advance(delta).await {
            Ok(tick) => self.tick = tick,
            Err(e) => self.report(&e),
        }
        if let Some(session) = self.engine.session() {
            self.interruptions = session.interruption_count();
        }
    }

    async fn on_action(&mut self, action: Action) {
        let Some(state) = self.engine.session().map(FocusSession::state) else {
            if action == Action::Quit {
                self.running = false;
            }
            return;
        };

        let result = match action {
            Action::TogglePause if state == SessionState::Running => self.engine.pause().await,
            Action::TogglePause if state == SessionState::Paused => self.engine.resume().await,
            Action::Stop => self.engine.stop().await.map(|_| ()),
            Action::Discard if self.engine.final_save_failed() => {
                self.engine.discard().await.map(|_| ())
            }
            Action::Discard => {
                self.status = Some(("Nothing to discard.".to_owned(), Color::DarkGray));
                Ok(())
            }
            Action::Quit => {
                self.quit().await;
                Ok(())
            }
            _ => Ok(()),
        };

        if let Err(e) = result {
            self.report(&e);
        }
        if let Some(session) = self.engine.session() {
            self.tick = session.tick();
            self.interruptions = session.interruption_count();
        }
    }

    /// Forced stop: the final save is attempted, the session ends either way.
    async fn quit(&mut self) {
        match self.engine.shutdown().await {
            Ok(Some(session)) => {
                info!(session_id = session.id(), "session closed on quit");
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "final save on quit failed"),
        }
        self.running = false;
    }

    fn report(&mut self, e: &FocusError) {
        let message = match e {
            FocusError::FinalSave { .. } => {
                format!("{e}. Press s to retry or d to discard.")
            }
            _ => e.to_string(),
        };
        self.status = Some((message, Color::Red));
    }

    fn drain_events(&mut self) {
        while let Some(event) = self.events.try_next() {
            match event {
                FocusEvent::Tick(tick) => self.tick = tick,
                FocusEvent::StateChanged { .. } => {}
                FocusEvent::Flushed { .. } => {
                    self.last_saved = Some(Local::now());
                    if matches!(self.status, Some((_, Color::Yellow))) {
                        self.status = None;
                    }
                }
                FocusEvent::AutosaveFailed { reason, message } => {
                    self.status = Some((
                        format!("Autosave ({reason}) failed, will retry: {message}"),
                        Color::Yellow,
                    ));
                }
                FocusEvent::LogFailed { message } => {
                    self.status = Some((format!("Session log not written: {message}"), Color::Yellow));
                }
                FocusEvent::Alarm { profile, sound } => ring(profile, sound),
                FocusEvent::SessionEnded(entry) => {
                    self.tick.state = SessionState::from(entry.outcome);
                    self.status = Some(("Session saved. Press q to quit.".to_owned(), Color::Green));
                    self.ended = Some(entry);
                }
            }
        }
    }

    fn draw(&self, frame: &mut Frame) {
        let [header, gauge, details, status, help] = Layout::vertical([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .areas(frame.area());

        let heading = if self.tag.is_empty() {
            format!("{}  ({})", self.title, self.preset)
        } else {
            format!("{}  [{}]  ({})", self.title, self.tag, self.preset)
        };
        frame.render_widget(
            Paragraph::new(Line::from(heading).bold()).block(Block::bordered().title(" focus ")),
            header,
        );

        let tick = &self.tick;
        let ratio = if tick.total_seconds == 0 {
            1.0
        } else {
            tick.elapsed_seconds as f64 / tick.total_seconds as f64
        };
        frame.render_widget(
            Gauge::default()
                .block(Block::bordered().title(format!(" {} ", tick.state)))
                .gauge_style(Style::default().fg(gauge_color(tick.color)).bg(Color::DarkGray))
                .ratio(ratio.clamp(0.0, 1.0))
                .label(format!("{} left", clock_label(tick.remaining_seconds))),
            gauge,
        );

        let saved = self
            .last_saved
            .map_or_else(|| "not yet".to_owned(), |t| t.format("%H:%M:%S").to_string());
        let lines = vec![
            Line::from(format!(
                "Focused {} of {} | interruptions {}",
                format_duration(tick.elapsed_seconds),
                format_duration(tick.total_seconds),
                self.interruptions
            )),
            Line::from(format!("Note {} | last saved {saved}", self.note.display())).dark_gray(),
        ];
        frame.render_widget(Paragraph::new(lines).block(Block::bordered()), details);

        if let Some((message, color)) = &self.status {
            frame.render_widget(Paragraph::new(message.as_str()).fg(*color), status);
        }

        frame.render_widget(
            Paragraph::new("p pause/resume  s stop & save  d discard  q quit").dark_gray(),
            help,
        );
    }
}

fn clock_label(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

fn ring(profile: AlarmProfile, sound: Option<PathBuf>) {
    if profile == AlarmProfile::Off {
        return;
    }
    if let Some(sound) = sound {
        // No audio backend: custom sounds fall back to the terminal bell.
        info!(sound = %sound.display(), "alarm sound requested");
    }
    let mut stdout = io::stdout();
    if let Err(e) = stdout.write_all(b"\x07").and_then(|()| stdout.flush()) {
        warn!(error = %e, "failed to ring terminal bell");
    }
}
