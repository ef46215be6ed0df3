//! Focus session state machine.
//!
//! A [`FocusSession`] moves through `Idle -> Running <-> Paused` and ends in
//! one of the terminal states `Completed` or `StoppedEarly`. Every illegal
//! ordering is rejected with [`FocusError::InvalidStateTransition`] and
//! leaves the session untouched.
//!
//! Terminal transitions are two-phase. [`FocusSession::prepare_finish`]
//! returns the terminal snapshot without mutating the live session, so the
//! caller can persist it first and only then commit it. A failed final save
//! therefore keeps the session in its pre-terminal state.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::TimerClock;
use crate::error::FocusError;

// ── Presets ──────────────────────────────────────────────────

/// Work/break durations chosen when a session starts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionPreset {
    pub work_seconds: u64,
    pub break_seconds: u64,
    pub is_custom: bool,
}

impl SessionPreset {
    /// Classic 25 minutes of work, 5 minutes of break.
    pub const POMODORO: SessionPreset = SessionPreset {
        work_seconds: 25 * 60,
        break_seconds: 5 * 60,
        is_custom: false,
    };

    /// 50 minutes of work, 10 minutes of break.
    pub const LONG_FOCUS: SessionPreset = SessionPreset {
        work_seconds: 50 * 60,
        break_seconds: 10 * 60,
        is_custom: false,
    };

    pub const BUILTIN: [SessionPreset; 2] = [Self::POMODORO, Self::LONG_FOCUS];

    /// Build a preset from minutes. Pairs that match a built-in preset are
    /// returned as that preset.
    pub fn from_minutes(work_minutes: u64, break_minutes: u64) -> Self {
        let work_seconds = work_minutes.saturating_mul(60);
        let break_seconds = break_minutes.saturating_mul(60);
        Self::BUILTIN
            .into_iter()
            .find(|p| p.work_seconds == work_seconds && p.break_seconds == break_seconds)
            .unwrap_or(SessionPreset {
                work_seconds,
                break_seconds,
                is_custom: true,
            })
    }

    /// Countdown length. A zero-length preset still runs for one second.
    pub fn total_seconds(&self) -> u64 {
        self.work_seconds.max(1)
    }

    /// Label in minutes, e.g. `25/5`.
    pub fn label(&self) -> String {
        format!("{}/{}", self.work_seconds / 60, self.break_seconds / 60)
    }
}

impl Default for SessionPreset {
    fn default() -> Self {
        Self::LONG_FOCUS
    }
}

impl FromStr for SessionPreset {
    type Err = FocusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || FocusError::InvalidPreset(s.to_owned());

        let (work, rest) = s.split_once('/').ok_or_else(invalid)?;
        let work: u64 = work.trim().parse().map_err(|_| invalid())?;
        let rest: u64 = rest.trim().parse().map_err(|_| invalid())?;
        if work == 0 {
            return Err(invalid());
        }
        Ok(Self::from_minutes(work, rest))
    }
}

// ── States ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Running,
    Paused,
    Completed,
    StoppedEarly,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Completed | SessionState::StoppedEarly)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Running => "running",
            SessionState::Paused => "paused",
            SessionState::Completed => "completed",
            SessionState::StoppedEarly => "stopped_early",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The operation that was attempted, carried by
/// [`FocusError::InvalidStateTransition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    Start,
    Pause,
    Resume,
    Complete,
    Stop,
}

impl fmt::Display for SessionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionAction::Start => "start",
            SessionAction::Pause => "pause",
            SessionAction::Resume => "resume",
            SessionAction::Complete => "complete",
            SessionAction::Stop => "stop",
        };
        f.write_str(s)
    }
}

/// How a session ended.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    Completed,
    StoppedEarly,
}

impl SessionOutcome {
    fn action(self) -> SessionAction {
        match self {
            SessionOutcome::Completed => SessionAction::Complete,
            SessionOutcome::StoppedEarly => SessionAction::Stop,
        }
    }
}

impl From<SessionOutcome> for SessionState {
    fn from(outcome: SessionOutcome) -> Self {
        match outcome {
            SessionOutcome::Completed => SessionState::Completed,
            SessionOutcome::StoppedEarly => SessionState::StoppedEarly,
        }
    }
}

// ── Color state ──────────────────────────────────────────────

/// Display band derived from the fraction of time remaining.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ColorState {
    /// At least half of the session remains.
    Normal,
    /// Between 15% (inclusive) and 50% remains.
    Warning,
    /// Less than 15% remains.
    Final,
}

impl ColorState {
    /// Band for `elapsed` out of `total` seconds. Compared in integers so the
    /// band edges are exact.
    pub fn from_progress(elapsed: u64, total: u64) -> Self {
        if total == 0 {
            return ColorState::Final;
        }
        let remaining = u128::from(total.saturating_sub(elapsed));
        let total = u128::from(total);

        if remaining * 100 >= total * 50 {
            ColorState::Normal
        } else if remaining * 100 >= total * 15 {
            ColorState::Warning
        } else {
            ColorState::Final
        }
    }
}

// ── Session ──────────────────────────────────────────────────

/// What the host learns from one [`FocusSession::advance`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTick {
    pub state: SessionState,
    pub elapsed_seconds: u64,
    pub remaining_seconds: u64,
    pub total_seconds: u64,
    pub color: ColorState,
    /// The countdown reached zero and the session still has to be finished
    /// as `Completed`.
    pub completion_due: bool,
}

/// One timed work block from start to a terminal state.
#[derive(Debug, Clone)]
pub struct FocusSession {
    id: String,
    title: String,
    tag: String,
    preset: SessionPreset,
    target_path: PathBuf,
    state: SessionState,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    clock: TimerClock,
    /// Session-relative wall clock, advanced by every tick including paused ones.
    wall_seconds: u64,
    /// Wall offset at which the current pause began.
    paused_at: Option<u64>,
    interruption_count: u32,
    interruption_seconds: u64,
    last_flush_at: Option<DateTime<Utc>>,
}

impl FocusSession {
    /// Create an idle session.
    pub fn new(
        id: impl Into<String>,
        title: &str,
        tag: &str,
        preset: SessionPreset,
        target_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.trim().to_owned(),
            tag: tag.trim().to_owned(),
            preset,
            target_path: target_path.into(),
            state: SessionState::Idle,
            started_at: None,
            ended_at: None,
            clock: TimerClock::new(),
            wall_seconds: 0,
            paused_at: None,
            interruption_count: 0,
            interruption_seconds: 0,
            last_flush_at: None,
        }
    }

    /// Generate a session id such as `20260103T091500123456-4f2a`.
    pub fn generate_id(now: DateTime<Utc>) -> String {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        format!("{}-{}", now.format("%Y%m%dT%H%M%S%6f"), &suffix[..4])
    }

    /// `Idle -> Running`.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), FocusError> {
        self.expect_state(SessionAction::Start, &[SessionState::Idle])?;

        self.started_at = Some(now);
        self.ended_at = None;
        self.wall_seconds = 0;
        self.paused_at = None;
        self.interruption_count = 0;
        self.interruption_seconds = 0;
        self.last_flush_at = None;
        self.clock.start(self.preset.total_seconds());
        self.state = SessionState::Running;
        Ok(())
    }

    /// `Running -> Paused`.
    pub fn pause(&mut self) -> Result<(), FocusError> {
        self.expect_state(SessionAction::Pause, &[SessionState::Running])?;

        self.clock.pause();
        self.paused_at = Some(self.wall_seconds);
        self.state = SessionState::Paused;
        Ok(())
    }

    /// `Paused -> Running`, charging the pause to the interruption counters.
    pub fn resume(&mut self) -> Result<(), FocusError> {
        self.expect_state(SessionAction::Resume, &[SessionState::Paused])?;

        let paused_at = self.paused_at.take().unwrap_or(self.wall_seconds);
        self.interruption_seconds += self.wall_seconds.saturating_sub(paused_at);
        self.interruption_count += 1;
        self.clock.resume();
        self.state = SessionState::Running;
        Ok(())
    }

    /// Move time forward by `delta_seconds`.
    ///
    /// Focus time only accrues while running; the wall clock that measures
    /// pauses accrues in both live states. Idle and terminal sessions are
    /// left as they are.
    pub fn advance(&mut self, delta_seconds: u64) -> SessionTick {
        if matches!(self.state, SessionState::Running | SessionState::Paused) {
            self.wall_seconds = self.wall_seconds.saturating_add(delta_seconds);
            self.clock.advance(delta_seconds);
        }
        self.tick()
    }

    /// Current progress without moving time.
    pub fn tick(&self) -> SessionTick {
        SessionTick {
            state: self.state,
            elapsed_seconds: self.elapsed_seconds(),
            remaining_seconds: self.remaining_seconds(),
            total_seconds: self.total_seconds(),
            color: self.color(),
            completion_due: self.is_completion_due(),
        }
    }

    /// Build the terminal snapshot for `outcome` without touching `self`.
    ///
    /// `Completed` is only reachable from `Running` once the countdown hit
    /// zero; `StoppedEarly` from `Running` or `Paused`. A pause still open at
    /// the stop adds its time to `interruption_seconds` but, never having
    /// resumed, does not bump `interruption_count`.
    pub fn prepare_finish(&self, outcome: SessionOutcome) -> Result<FocusSession, FocusError> {
        let action = outcome.action();
        match outcome {
            SessionOutcome::Completed => {
                self.expect_state(action, &[SessionState::Running])?;
                if !self.clock.is_completed() {
                    return Err(self.invalid(action));
                }
            }
            SessionOutcome::StoppedEarly => {
                self.expect_state(action, &[SessionState::Running, SessionState::Paused])?;
            }
        }

        let mut finished = self.clone();
        finished.clock.cancel();
        if let Some(paused_at) = finished.paused_at.take() {
            finished.interruption_seconds += finished.wall_seconds.saturating_sub(paused_at);
        }
        finished.ended_at = Some(self.wall_time());
        finished.state = outcome.into();
        Ok(finished)
    }

    /// Prepare and commit a terminal transition in one step.
    pub fn finish(&mut self, outcome: SessionOutcome) -> Result<(), FocusError> {
        *self = self.prepare_finish(outcome)?;
        Ok(())
    }

    /// Record a successful flush at the current session wall time.
    pub fn mark_flushed(&mut self) {
        self.last_flush_at = Some(self.wall_time());
    }

    /// `started_at` plus the session-relative wall clock.
    pub fn wall_time(&self) -> DateTime<Utc> {
        let started = self.started_at.unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        i64::try_from(self.wall_seconds)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|offset| started.checked_add_signed(offset))
            .unwrap_or(started)
    }

    pub fn is_completion_due(&self) -> bool {
        self.state == SessionState::Running && self.clock.is_completed()
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Title for display; falls back to `Focus Session` when empty.
    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            "Focus Session"
        } else {
            &self.title
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn preset(&self) -> SessionPreset {
        self.preset
    }

    pub fn target_path(&self) -> &Path {
        &self.target_path
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.clock.elapsed()
    }

    pub fn total_seconds(&self) -> u64 {
        self.preset.total_seconds()
    }

    pub fn remaining_seconds(&self) -> u64 {
        self.total_seconds().saturating_sub(self.elapsed_seconds())
    }

    pub fn interruption_count(&self) -> u32 {
        self.interruption_count
    }

    pub fn interruption_seconds(&self) -> u64 {
        self.interruption_seconds
    }

    pub fn last_flush_at(&self) -> Option<DateTime<Utc>> {
        self.last_flush_at
    }

    pub fn color(&self) -> ColorState {
        ColorState::from_progress(self.elapsed_seconds(), self.total_seconds())
    }

    fn expect_state(
        &self,
        action: SessionAction,
        allowed: &[SessionState],
    ) -> Result<(), FocusError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(self.invalid(action))
        }
    }

    fn invalid(&self, action: SessionAction) -> FocusError {
        FocusError::InvalidStateTransition {
            from: self.state,
            action,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
    }

    fn running(preset: SessionPreset) -> FocusSession {
        let mut session = FocusSession::new("s-1", "Deep work", "rust", preset, "/tmp/note.md");
        session.start(t0()).expect("should start");
        session
    }

    #[test]
    fn test_should_complete_pomodoro_without_pauses() {
        let mut session = running(SessionPreset::POMODORO);
        assert_eq!(session.total_seconds(), 1500);

        for _ in 0..1499 {
            assert!(!session.advance(1).completion_due);
        }
        let tick = session.advance(1);
        assert!(tick.completion_due);
        assert_eq!(tick.remaining_seconds, 0);

        session.finish(SessionOutcome::Completed).expect("should complete");
        assert_eq!(session.state(), SessionState::Completed);
        assert_eq!(session.interruption_count(), 0);
        assert_eq!(session.interruption_seconds(), 0);
        assert_eq!(session.ended_at(), Some(t0() + Duration::seconds(1500)));
    }

    #[test]
    fn test_should_account_pause_as_interruption() {
        let mut session = running(SessionPreset::POMODORO);
        session.advance(300);
        session.pause().expect("should pause");
        session.advance(60);
        assert_eq!(session.elapsed_seconds(), 300);

        session.resume().expect("should resume");
        assert_eq!(session.interruption_count(), 1);
        assert_eq!(session.interruption_seconds(), 60);
        assert_eq!(session.state(), SessionState::Running);
    }

    #[test]
    fn test_should_accumulate_each_interruption_exactly() {
        let mut session = running(SessionPreset::LONG_FOCUS);
        let pauses = [5_u64, 0, 42, 7];
        let mut expected = 0;

        for (i, pause) in pauses.iter().enumerate() {
            session.advance(30);
            session.pause().unwrap();
            session.advance(*pause);
            let before = (session.interruption_count(), session.interruption_seconds());
            session.resume().unwrap();
            expected += pause;

            assert_eq!(session.interruption_count(), before.0 + 1);
            assert_eq!(session.interruption_seconds(), before.1 + pause);
            assert_eq!(session.interruption_count() as usize, i + 1);
        }
        assert_eq!(session.interruption_seconds(), expected);
    }

    #[test]
    fn test_should_keep_elapsed_within_bounds_for_any_ticks() {
        let presets = [
            SessionPreset::POMODORO,
            SessionPreset::LONG_FOCUS,
            SessionPreset::from_minutes(1, 1),
            SessionPreset::from_minutes(0, 0),
        ];
        let deltas = [0_u64, 1, 7, 59, 600, 10_000];

        for preset in presets {
            let mut session = running(preset);
            for (i, delta) in deltas.iter().cycle().take(40).enumerate() {
                if i % 5 == 3 {
                    let _ = session.pause();
                } else if i % 5 == 4 {
                    let _ = session.resume();
                }
                let tick = session.advance(*delta);
                assert!(tick.elapsed_seconds <= tick.total_seconds);
                assert_eq!(
                    tick.elapsed_seconds + tick.remaining_seconds,
                    tick.total_seconds
                );
            }
        }
    }

    #[test]
    fn test_should_reject_transitions_from_terminal_state() {
        let mut session = running(SessionPreset::POMODORO);
        session.finish(SessionOutcome::StoppedEarly).expect("should stop");
        let before = session.clone();

        for result in [
            session.pause(),
            session.resume(),
            session.start(t0()),
            session.finish(SessionOutcome::StoppedEarly),
            session.finish(SessionOutcome::Completed),
        ] {
            assert!(matches!(
                result,
                Err(FocusError::InvalidStateTransition {
                    from: SessionState::StoppedEarly,
                    ..
                })
            ));
        }
        assert_eq!(session.state(), before.state());
        assert_eq!(session.elapsed_seconds(), before.elapsed_seconds());
        assert_eq!(session.ended_at(), before.ended_at());
    }

    #[test]
    fn test_should_reject_illegal_orderings() {
        let mut idle = FocusSession::new("s", "t", "", SessionPreset::POMODORO, "/tmp/n.md");
        assert!(matches!(
            idle.pause(),
            Err(FocusError::InvalidStateTransition {
                from: SessionState::Idle,
                action: SessionAction::Pause
            })
        ));

        let mut session = running(SessionPreset::POMODORO);
        assert!(session.resume().is_err());
        session.pause().unwrap();
        assert!(session.pause().is_err());
        assert!(session.finish(SessionOutcome::Completed).is_err());
        assert_eq!(session.state(), SessionState::Paused);
    }

    #[test]
    fn test_should_not_complete_before_countdown_ends() {
        let mut session = running(SessionPreset::POMODORO);
        session.advance(100);
        let err = session.prepare_finish(SessionOutcome::Completed).unwrap_err();
        assert!(matches!(
            err,
            FocusError::InvalidStateTransition { action: SessionAction::Complete, .. }
        ));
        assert_eq!(session.state(), SessionState::Running);
    }

    #[test]
    fn test_should_prepare_finish_without_mutating() {
        let mut session = running(SessionPreset::POMODORO);
        session.advance(120);
        session.pause().unwrap();
        session.advance(30);

        let finished = session
            .prepare_finish(SessionOutcome::StoppedEarly)
            .expect("should prepare");
        assert_eq!(finished.state(), SessionState::StoppedEarly);
        assert_eq!(finished.interruption_count(), 0);
        assert_eq!(finished.interruption_seconds(), 30);
        assert_eq!(finished.ended_at(), Some(t0() + Duration::seconds(150)));

        assert_eq!(session.state(), SessionState::Paused);
        assert_eq!(session.interruption_seconds(), 0);
        assert!(session.ended_at().is_none());
    }

    #[test]
    fn test_should_count_open_pause_time_when_stopped_while_paused() {
        let mut session = running(SessionPreset::POMODORO);
        session.advance(300);
        session.pause().unwrap();
        session.advance(60);
        session.resume().unwrap();
        session.advance(100);
        session.pause().unwrap();
        session.advance(600);

        session.finish(SessionOutcome::StoppedEarly).unwrap();

        assert_eq!(session.interruption_count(), 1);
        assert_eq!(session.interruption_seconds(), 660);
        assert_eq!(session.elapsed_seconds(), 400);
    }

    #[test]
    fn test_should_stop_advancing_after_terminal_state() {
        let mut session = running(SessionPreset::POMODORO);
        session.advance(10);
        session.finish(SessionOutcome::StoppedEarly).unwrap();
        let tick = session.advance(500);
        assert_eq!(tick.elapsed_seconds, 10);
        assert!(!tick.completion_due);
    }

    #[test]
    fn test_should_derive_color_bands_at_boundaries() {
        // Fraction remaining = 0.50
        assert_eq!(ColorState::from_progress(5_000, 10_000), ColorState::Normal);
        // 0.4999
        assert_eq!(ColorState::from_progress(5_001, 10_000), ColorState::Warning);
        // 0.15
        assert_eq!(ColorState::from_progress(8_500, 10_000), ColorState::Warning);
        // 0.1499
        assert_eq!(ColorState::from_progress(8_501, 10_000), ColorState::Final);
        assert_eq!(ColorState::from_progress(0, 1500), ColorState::Normal);
        assert_eq!(ColorState::from_progress(1500, 1500), ColorState::Final);
    }

    #[test]
    fn test_should_parse_presets() {
        let pomodoro: SessionPreset = "25/5".parse().expect("should parse");
        assert_eq!(pomodoro, SessionPreset::POMODORO);
        assert!(!pomodoro.is_custom);

        let long: SessionPreset = "50 / 10".parse().expect("should parse");
        assert_eq!(long, SessionPreset::LONG_FOCUS);

        let custom: SessionPreset = "40/8".parse().expect("should parse");
        assert!(custom.is_custom);
        assert_eq!(custom.work_seconds, 2400);
        assert_eq!(custom.label(), "40/8");

        assert!("abc".parse::<SessionPreset>().is_err());
        assert!("0/5".parse::<SessionPreset>().is_err());
        assert!("25".parse::<SessionPreset>().is_err());
    }

    #[test]
    fn test_should_generate_timestamped_session_id() {
        let id = FocusSession::generate_id(t0());
        assert!(id.starts_with("20260302T090000000000-"));
        let suffix = &id["20260302T090000000000-".len()..];
        assert_eq!(suffix.len(), 4);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_should_fall_back_to_default_title() {
        let session = FocusSession::new("s", "   ", " tag ", SessionPreset::POMODORO, "/tmp/n.md");
        assert_eq!(session.display_title(), "Focus Session");
        assert_eq!(session.tag(), "tag");
    }
}
