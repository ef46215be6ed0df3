//! Core session engine.
//!
//! The [`FocusEngine`] is the main entry point for hosts. It owns the single
//! active [`FocusSession`], drives it from host ticks, hands autosave writes
//! to the blocking pool and performs the final save, log append and guard
//! release when a session ends.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use typed_builder::TypedBuilder;

use focus_tpl::TemplateManager;

use crate::config::{AlarmProfile, EngineConfig, TimerSettings};
use crate::error::FocusError;
use crate::events::{EventSink, FocusEvent, FocusStream};
use crate::guard::{ActiveSessionGuard, SessionToken};
use crate::logger::{SessionLogEntry, SessionLogger};
use crate::note::{SessionNoteWriter, note_path_for};
use crate::scheduler::{AutoSaveScheduler, FlushReason};
use crate::session::{FocusSession, SessionOutcome, SessionPreset, SessionState, SessionTick};
use crate::storage::AtomicWriter;

/// What the host asks for when starting a session.
///
/// # Examples
///
/// ```
/// use focus_core::{SessionPreset, StartRequest};
///
/// let request = StartRequest::builder()
///     .title("Write release notes")
///     .tag("docs")
///     .preset(SessionPreset::POMODORO)
///     .build();
/// assert!(request.existing_note.is_none());
/// ```
#[derive(Debug, Clone, TypedBuilder)]
pub struct StartRequest {
    #[builder(default, setter(into))]
    pub title: String,

    #[builder(default, setter(into))]
    pub tag: String,

    #[builder(default)]
    pub preset: SessionPreset,

    /// Folder for a newly scaffolded note. Falls back to the configured
    /// default folder, then the current directory.
    #[builder(default, setter(strip_option, into))]
    pub folder: Option<PathBuf>,

    /// Write the summary into this note instead of scaffolding a new one.
    #[builder(default, setter(strip_option, into))]
    pub existing_note: Option<PathBuf>,
}

#[derive(Debug)]
struct InFlightFlush {
    reason: FlushReason,
    handle: JoinHandle<Result<(), FocusError>>,
}

#[derive(Debug)]
struct ActiveSession {
    session: FocusSession,
    token: SessionToken,
    scheduler: AutoSaveScheduler,
    /// Settings snapshot taken at start.
    settings: TimerSettings,
    in_flight: Option<InFlightFlush>,
    /// Outcome of the last failed final save. Cleared by a resume or a
    /// successful flush. A failed completion is not retried by `advance`.
    failed_final: Option<SessionOutcome>,
}

impl ActiveSession {
    /// Terminal outcome a stop request resolves to.
    fn stop_outcome(&self) -> SessionOutcome {
        if self.session.is_completion_due() {
            SessionOutcome::Completed
        } else {
            SessionOutcome::StoppedEarly
        }
    }
}

/// Drives one focus session at a time.
///
/// Every method takes `&mut self`, so the host serializes calls. Autosave
/// writes run on tokio's blocking pool and never delay [`advance`].
///
/// [`advance`]: FocusEngine::advance
#[derive(Debug)]
pub struct FocusEngine {
    config: EngineConfig,
    guard: ActiveSessionGuard,
    notes: Arc<SessionNoteWriter>,
    logger: SessionLogger,
    active: Option<ActiveSession>,
    events: EventSink,
}

impl FocusEngine {
    /// Create an engine writing notes through `writer`.
    ///
    /// # Errors
    ///
    /// Returns `FocusError::Template` if the template override directory
    /// cannot be loaded.
    #[instrument(skip_all)]
    pub fn new(
        config: EngineConfig,
        writer: Arc<dyn AtomicWriter>,
        guard: ActiveSessionGuard,
    ) -> Result<Self, FocusError> {
        let mut templates = TemplateManager::with_builtins()?;
        if let Some(dir) = config.template_dir() {
            let count = templates.load_dir(dir)?;
            info!(dir = %dir.display(), count, "loaded note template overrides");
        }

        Ok(Self {
            logger: SessionLogger::new(config.log_dir()),
            notes: Arc::new(SessionNoteWriter::with_templates(templates, writer)),
            config,
            guard,
            active: None,
            events: EventSink::default(),
        })
    }

    /// Stream of engine events. Subscribing again replaces the previous
    /// stream.
    pub fn subscribe(&mut self) -> FocusStream {
        self.events.subscribe()
    }

    /// Start a session.
    ///
    /// # Errors
    ///
    /// Returns `FocusError::AlreadyActive` if a session holds the guard.
    /// Returns `FocusError::Io` or `FocusError::Template` if the note
    /// scaffold cannot be written.
    #[instrument(skip(self, request), fields(title = %request.title))]
    pub async fn start(&mut self, request: StartRequest) -> Result<FocusSession, FocusError> {
        if self.active.is_some() {
            return Err(FocusError::AlreadyActive);
        }
        let token = self.guard.try_acquire()?;
        let settings = self.config.settings().clone();

        let now = Utc::now();
        let id = FocusSession::generate_id(now);
        let (target, scaffold) = match request.existing_note {
            Some(path) => (path, false),
            None => {
                let folder = request
                    .folder
                    .or_else(|| settings.default_folder.clone())
                    .unwrap_or_else(|| PathBuf::from("."));
                (note_path_for(&folder, &id, &request.title), true)
            }
        };

        let mut session = FocusSession::new(id, &request.title, &request.tag, request.preset, target);
        session.start(now)?;

        if scaffold {
            let notes = Arc::clone(&self.notes);
            let snapshot = session.clone();
            tokio::task::spawn_blocking(move || notes.create_note(&snapshot)).await??;
        }

        info!(
            session_id = session.id(),
            note = %session.target_path().display(),
            preset = %session.preset().label(),
            "focus session started"
        );
        self.events.emit(FocusEvent::StateChanged {
            session_id: session.id().to_owned(),
            state: session.state(),
        });

        self.active = Some(ActiveSession {
            scheduler: AutoSaveScheduler::new(settings.autosave_interval()),
            session: session.clone(),
            token,
            settings,
            in_flight: None,
            failed_final: None,
        });
        Ok(session)
    }

    /// Move the active session forward by `delta_seconds`.
    ///
    /// Surfaces the result of a finished background flush, completes the
    /// session when the countdown reaches zero and starts a periodic flush
    /// when one is due. Never waits on autosave I/O except to finish a
    /// completed session.
    ///
    /// # Errors
    ///
    /// Returns `FocusError::NoActiveSession` without an active session.
    /// Returns `FocusError::FinalSave` if completing the session could not
    /// save the note; the session then stays `Running` until [`stop`] or
    /// [`discard`].
    ///
    /// [`stop`]: FocusEngine::stop
    /// [`discard`]: FocusEngine::discard
    pub async fn advance(&mut self, delta_seconds: u64) -> Result<SessionTick, FocusError> {
        let active = self.active.as_mut().ok_or(FocusError::NoActiveSession)?;
        let tick = active.session.advance(delta_seconds);

        if active
            .in_flight
            .as_ref()
            .is_some_and(|flush| flush.handle.is_finished())
        {
            self.settle().await;
        }

        let complete = tick.completion_due
            && self
                .active
                .as_ref()
                .is_some_and(|active| active.failed_final != Some(SessionOutcome::Completed));
        if complete {
            let finished = self
                .finish(SessionOutcome::Completed, FlushReason::Complete)
                .await?;
            let tick = finished.tick();
            self.events.emit(FocusEvent::Tick(tick));
            return Ok(tick);
        }

        if let Some(active) = self.active.as_mut()
            && let Some(reason) = active.scheduler.check_due(&active.session)
        {
            spawn_flush(&self.notes, active, reason);
        }

        self.events.emit(FocusEvent::Tick(tick));
        Ok(tick)
    }

    /// Pause the active session and flush the pause boundary.
    ///
    /// # Errors
    ///
    /// Returns `FocusError::InvalidStateTransition` unless the session is
    /// running.
    #[instrument(skip(self))]
    pub async fn pause(&mut self) -> Result<(), FocusError> {
        let active = self.active.as_mut().ok_or(FocusError::NoActiveSession)?;
        active.session.pause()?;
        self.after_boundary(FlushReason::Pause).await;
        Ok(())
    }

    /// Resume the paused session and flush the resume boundary.
    ///
    /// # Errors
    ///
    /// Returns `FocusError::InvalidStateTransition` unless the session is
    /// paused.
    #[instrument(skip(self))]
    pub async fn resume(&mut self) -> Result<(), FocusError> {
        let active = self.active.as_mut().ok_or(FocusError::NoActiveSession)?;
        active.session.resume()?;
        active.failed_final = None;
        self.after_boundary(FlushReason::Resume).await;
        Ok(())
    }

    /// Stop & Save.
    ///
    /// Cancels periodic autosave, waits for an in-flight flush, saves the
    /// final summary and only then commits the terminal state. A session
    /// whose countdown already reached zero is completed rather than stopped.
    ///
    /// # Errors
    ///
    /// Returns `FocusError::FinalSave` if the note could not be written; the
    /// session stays live and periodic autosave resumes.
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> Result<FocusSession, FocusError> {
        let active = self.active.as_ref().ok_or(FocusError::NoActiveSession)?;
        let outcome = active.stop_outcome();
        let reason = match outcome {
            SessionOutcome::Completed => FlushReason::Complete,
            SessionOutcome::StoppedEarly => FlushReason::Stop,
        };
        self.finish(outcome, reason).await
    }

    /// End the session without writing the note, typically after a failed
    /// final save.
    ///
    /// # Errors
    ///
    /// Returns `FocusError::NoActiveSession` without an active session.
    #[instrument(skip(self))]
    pub async fn discard(&mut self) -> Result<FocusSession, FocusError> {
        let active = self.active.as_mut().ok_or(FocusError::NoActiveSession)?;
        let finished = active.session.prepare_finish(active.stop_outcome())?;
        active.scheduler.cancel();
        self.settle().await;

        warn!(session_id = finished.id(), "session discarded without final save");
        Ok(self.commit(finished))
    }

    /// Forced stop on process exit.
    ///
    /// The final save is attempted once and the session is committed and
    /// logged whatever its result. Returns `Ok(None)` when no session was
    /// active.
    ///
    /// # Errors
    ///
    /// Returns `FocusError::FinalSave` if the note could not be written. The
    /// session has still ended.
    #[instrument(skip(self))]
    pub async fn shutdown(&mut self) -> Result<Option<FocusSession>, FocusError> {
        let Some(active) = self.active.as_mut() else {
            return Ok(None);
        };
        let finished = active.session.prepare_finish(active.stop_outcome())?;
        active.scheduler.cancel();
        self.settle().await;

        let mut finished = finished;
        let saved = self.final_save(&finished, FlushReason::Shutdown).await;
        if saved.is_ok() {
            finished.mark_flushed();
        }
        let finished = self.commit(finished);
        saved.map(|()| Some(finished))
    }

    /// Wait for the in-flight flush, if any, and report its result.
    pub async fn settle(&mut self) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        let Some(flush) = active.in_flight.take() else {
            return;
        };

        let result = match flush.handle.await {
            Ok(result) => result,
            Err(e) => Err(e.into()),
        };
        active.scheduler.finish_flush();

        match result {
            Ok(()) => {
                active.session.mark_flushed();
                active.failed_final = None;
                debug!(session_id = active.session.id(), reason = %flush.reason, "flush finished");
                self.events.emit(FocusEvent::Flushed {
                    reason: flush.reason,
                });
            }
            Err(e) => {
                warn!(
                    session_id = active.session.id(),
                    reason = %flush.reason,
                    error = %e,
                    "autosave failed, will retry on next flush"
                );
                self.events.emit(FocusEvent::AutosaveFailed {
                    reason: flush.reason,
                    message: e.to_string(),
                });
            }
        }
    }

    /// The active session, if any.
    pub fn session(&self) -> Option<&FocusSession> {
        self.active.as_ref().map(|active| &active.session)
    }

    /// Returns whether the last final save failed for the active session and
    /// nothing has been saved or resumed since.
    pub fn final_save_failed(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| active.failed_final.is_some())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn logger(&self) -> &SessionLogger {
        &self.logger
    }

    /// Pause/resume boundary: wait for the previous write, then start the
    /// boundary flush in the background.
    async fn after_boundary(&mut self, reason: FlushReason) {
        self.settle().await;
        if let Some(active) = self.active.as_mut() {
            self.events.emit(FocusEvent::StateChanged {
                session_id: active.session.id().to_owned(),
                state: active.session.state(),
            });
            spawn_flush(&self.notes, active, reason);
        }
    }

    /// Two-phase terminal transition: save the terminal snapshot, then
    /// commit it.
    async fn finish(
        &mut self,
        outcome: SessionOutcome,
        reason: FlushReason,
    ) -> Result<FocusSession, FocusError> {
        let active = self.active.as_mut().ok_or(FocusError::NoActiveSession)?;
        let finished = active.session.prepare_finish(outcome)?;
        active.scheduler.cancel();
        self.settle().await;

        if let Err(e) = self.final_save(&finished, reason).await {
            if let Some(active) = self.active.as_mut() {
                active.failed_final = Some(outcome);
                active.scheduler.reactivate();
            }
            return Err(e);
        }
        let mut finished = finished;
        finished.mark_flushed();
        Ok(self.commit(finished))
    }

    async fn final_save(&mut self, finished: &FocusSession, reason: FlushReason) -> Result<(), FocusError> {
        let notes = Arc::clone(&self.notes);
        let snapshot = finished.clone();

        if let Some(active) = self.active.as_mut() {
            active.scheduler.begin_flush(finished);
        }
        let result = tokio::task::spawn_blocking(move || notes.flush(&snapshot, reason)).await;
        if let Some(active) = self.active.as_mut() {
            active.scheduler.finish_flush();
        }

        match result.map_err(FocusError::from).and_then(|r| r) {
            Ok(()) => {
                self.events.emit(FocusEvent::Flushed { reason });
                Ok(())
            }
            Err(e) => {
                warn!(session_id = finished.id(), reason = %reason, error = %e, "final save failed");
                Err(e)
            }
        }
    }

    /// Make `finished` the session's final state, release the guard and log
    /// the outcome.
    fn commit(&mut self, finished: FocusSession) -> FocusSession {
        let Some(active) = self.active.take() else {
            return finished;
        };
        self.guard.release(active.token);

        info!(
            session_id = finished.id(),
            state = %finished.state(),
            elapsed = finished.elapsed_seconds(),
            interruptions = finished.interruption_count(),
            "focus session ended"
        );
        self.events.emit(FocusEvent::StateChanged {
            session_id: finished.id().to_owned(),
            state: finished.state(),
        });

        if finished.state() == SessionState::Completed
            && active.settings.alarm_profile != AlarmProfile::Off
        {
            self.events.emit(FocusEvent::Alarm {
                profile: active.settings.alarm_profile,
                sound: active.settings.custom_sound_path.clone(),
            });
        }

        if let Some(entry) = SessionLogEntry::from_session(&finished) {
            if let Err(e) = self.logger.append(&entry) {
                warn!(session_id = finished.id(), error = %e, "failed to log session");
                self.events.emit(FocusEvent::LogFailed {
                    message: e.to_string(),
                });
            }
            self.events.emit(FocusEvent::SessionEnded(entry));
        }
        finished
    }
}

fn spawn_flush(notes: &Arc<SessionNoteWriter>, active: &mut ActiveSession, reason: FlushReason) {
    if !active.scheduler.begin_flush(&active.session) {
        return;
    }
    let notes = Arc::clone(notes);
    let snapshot = active.session.clone();
    debug!(session_id = snapshot.id(), reason = %reason, "starting flush");

    let handle = tokio::task::spawn_blocking(move || notes.flush(&snapshot, reason));
    active.in_flight = Some(InFlightFlush { reason, handle });
}
