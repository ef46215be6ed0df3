//! Session summary block inside the target note.
//!
//! The summary is a Markdown region delimited by
//! `<!-- focus-session:{id} -->` and `<!-- /focus-session:{id} -->`. It holds a
//! human-readable recap and, hidden in an HTML comment, a `focus-meta` fenced
//! block of `key: value` pairs for tooling.
//!
//! [`SessionNoteWriter::write`] is a pure text transform: it replaces the
//! session's region in place when present and appends it otherwise, so
//! repeated flushes of an unchanged session leave the note byte-identical.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::SecondsFormat;
use focus_tpl::{SCAFFOLD_TEMPLATE, SUMMARY_TEMPLATE, TemplateManager};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, instrument};

use crate::error::FocusError;
use crate::scheduler::FlushReason;
use crate::session::FocusSession;
use crate::storage::{AtomicWriter, read_or_empty};

/// One `key: value` line of the `focus-meta` block.
#[derive(Debug, Serialize)]
struct MetaField {
    key: &'static str,
    value: String,
}

/// Renders session summaries and merges them into notes.
#[derive(Debug)]
pub struct SessionNoteWriter {
    templates: TemplateManager,
    writer: Arc<dyn AtomicWriter>,
}

impl SessionNoteWriter {
    /// Create a writer using the built-in note templates.
    pub fn new(writer: Arc<dyn AtomicWriter>) -> Result<Self, FocusError> {
        Ok(Self::with_templates(TemplateManager::with_builtins()?, writer))
    }

    /// Create a writer with a prepared template manager.
    pub fn with_templates(templates: TemplateManager, writer: Arc<dyn AtomicWriter>) -> Self {
        Self { templates, writer }
    }

    /// Render the summary block for `session`.
    ///
    /// The template renders the body only; the session markers are always
    /// added here, so overridden templates still yield one block per session.
    /// Output depends only on the session's fields, so an unchanged session
    /// always renders to the same bytes.
    pub fn render(&self, session: &FocusSession) -> Result<String, FocusError> {
        let ctx = json!({
            "session_id": session.id(),
            "title": single_line(session.display_title()),
            "tag": display_tag(session.tag()),
            "preset": session.preset().label(),
            "status": session.state().as_str(),
            "elapsed": format_duration(session.elapsed_seconds()),
            "expected": format_duration(session.total_seconds()),
            "interruption_count": session.interruption_count(),
            "interruption_time": format_duration(session.interruption_seconds()),
            "meta": meta_fields(session),
        });
        let body = self.templates.render(SUMMARY_TEMPLATE, &ctx)?;
        Ok(wrap_block(session.id(), &body))
    }

    /// Merge `block` into `content` for `session_id`.
    ///
    /// An existing region is replaced in place with every other byte kept;
    /// otherwise the block is appended after a blank line. A start marker
    /// without its end marker is treated as a truncated block that runs to
    /// the end of the content.
    pub fn write(content: &str, block: &str, session_id: &str) -> String {
        let start_marker = start_marker(session_id);
        let end_marker = end_marker(session_id);

        let Some(start) = content.find(&start_marker) else {
            return append_block(content, block);
        };

        let mut out = String::with_capacity(content.len() + block.len());
        out.push_str(&content[..start]);

        match content[start..].find(&end_marker) {
            Some(offset) => {
                let mut end = start + offset + end_marker.len();
                let trailing_newline = content[end..].starts_with('\n');
                if trailing_newline {
                    end += 1;
                    out.push_str(block);
                } else {
                    out.push_str(block.strip_suffix('\n').unwrap_or(block));
                }
                out.push_str(&content[end..]);
            }
            None => out.push_str(block),
        }
        out
    }

    /// Render the session and write it into its target note.
    ///
    /// # Errors
    ///
    /// Returns `FocusError::FinalSave` for final reasons and
    /// `FocusError::AutosaveWrite` otherwise when the note cannot be read or
    /// written. Returns `FocusError::Template` if rendering fails.
    #[instrument(skip(self, session), fields(session_id = session.id(), reason = %reason))]
    pub fn flush(&self, session: &FocusSession, reason: FlushReason) -> Result<(), FocusError> {
        let path = session.target_path();
        let io_error = |source: std::io::Error| {
            let path = path.to_path_buf();
            if reason.is_final() {
                FocusError::FinalSave { path, source }
            } else {
                FocusError::AutosaveWrite { path, source }
            }
        };

        let block = self.render(session)?;
        let content = read_or_empty(path).map_err(io_error)?;
        let updated = Self::write(&content, &block, session.id());

        self.writer.write_atomic(path, &updated).map_err(io_error)?;
        debug!(path = %path.display(), "flushed session summary");
        Ok(())
    }

    /// Write the note scaffold for a new session at its target path.
    ///
    /// Existing files are left untouched.
    ///
    /// # Errors
    ///
    /// Returns `FocusError::Io` if the folder or file cannot be created.
    #[instrument(skip(self, session), fields(session_id = session.id()))]
    pub fn create_note(&self, session: &FocusSession) -> Result<(), FocusError> {
        let path = session.target_path();
        if path.exists() {
            debug!(path = %path.display(), "note already exists, not scaffolding");
            return Ok(());
        }
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let ctx = json!({
            "session_id": session.id(),
            "started_at": session
                .started_at()
                .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
                .unwrap_or_default(),
            "preset": session.preset().label(),
            "tag": single_line(session.tag()),
            "title": single_line(session.display_title()),
        });
        let body = self.templates.render(SCAFFOLD_TEMPLATE, &ctx)?;
        self.writer.write_atomic(path, &body)?;
        debug!(path = %path.display(), "created session note");
        Ok(())
    }
}

/// Path of a new note for a session: `{folder}/{session_id}-{slug}.md`.
pub fn note_path_for(folder: &Path, session_id: &str, title: &str) -> PathBuf {
    folder.join(format!("{session_id}-{}.md", slugify(title)))
}

/// Lowercase alphanumerics with every other run of characters collapsed to
/// a single `-`. Empty results become `focus-session`.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut prev_dash = false;

    for ch in text.chars().flat_map(char::to_lowercase) {
        if ch.is_alphanumeric() {
            slug.push(ch);
            prev_dash = false;
        } else if !prev_dash {
            slug.push('-');
            prev_dash = true;
        }
    }

    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "focus-session".to_owned()
    } else {
        slug.to_owned()
    }
}

/// `1h 05m 00s`, `25m 00s`, `0m 07s`.
pub fn format_duration(seconds: u64) -> String {
    let (h, m, s) = (seconds / 3600, (seconds % 3600) / 60, seconds % 60);
    if h > 0 {
        format!("{h}h {m:02}m {s:02}s")
    } else {
        format!("{m}m {s:02}s")
    }
}

fn start_marker(session_id: &str) -> String {
    format!("<!-- focus-session:{session_id} -->")
}

fn end_marker(session_id: &str) -> String {
    format!("<!-- /focus-session:{session_id} -->")
}

/// Surround `body` with the session markers, dropping any copies of the
/// markers the template emitted itself.
fn wrap_block(session_id: &str, body: &str) -> String {
    let start = start_marker(session_id);
    let end = end_marker(session_id);
    let body = body.replace(&start, "").replace(&end, "");
    let body = body.trim_matches('\n');

    if body.is_empty() {
        format!("{start}\n{end}\n")
    } else {
        format!("{start}\n{body}\n{end}\n")
    }
}

fn append_block(content: &str, block: &str) -> String {
    let separator = if content.is_empty() || content.ends_with("\n\n") {
        ""
    } else if content.ends_with('\n') {
        "\n"
    } else {
        "\n\n"
    };
    format!("{content}{separator}{block}")
}

fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn display_tag(tag: &str) -> String {
    if tag.is_empty() {
        "-".to_owned()
    } else {
        single_line(tag)
    }
}

/// Meta values live inside an HTML comment, which any `--` would end early.
fn comment_safe(text: &str) -> String {
    let mut text = single_line(text);
    while text.contains("--") {
        text = text.replace("--", "- -");
    }
    text
}

fn meta_fields(session: &FocusSession) -> Vec<MetaField> {
    let timestamp = |t: chrono::DateTime<chrono::Utc>| t.to_rfc3339_opts(SecondsFormat::Secs, true);

    let mut fields = vec![
        MetaField { key: "session_id", value: session.id().to_owned() },
        MetaField { key: "title", value: comment_safe(session.display_title()) },
        MetaField { key: "tag", value: comment_safe(session.tag()) },
        MetaField { key: "preset", value: session.preset().label() },
        MetaField { key: "state", value: session.state().as_str().to_owned() },
    ];
    if let Some(started) = session.started_at() {
        fields.push(MetaField { key: "started_at", value: timestamp(started) });
    }
    if let Some(ended) = session.ended_at() {
        fields.push(MetaField { key: "ended_at", value: timestamp(ended) });
    }
    fields.extend([
        MetaField { key: "elapsed_seconds", value: session.elapsed_seconds().to_string() },
        MetaField { key: "total_seconds", value: session.total_seconds().to_string() },
        MetaField { key: "interruption_count", value: session.interruption_count().to_string() },
        MetaField { key: "interruption_seconds", value: session.interruption_seconds().to_string() },
    ]);
    fields
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::io;
    use std::sync::Mutex;

    use chrono::{TimeZone, Utc};

    use focus_tpl::NoteTemplate;

    use super::*;
    use crate::session::{SessionOutcome, SessionPreset};
    use crate::storage::FsAtomicWriter;

    fn writer() -> SessionNoteWriter {
        SessionNoteWriter::new(Arc::new(FsAtomicWriter)).expect("should load templates")
    }

    fn session_at(path: impl Into<PathBuf>) -> FocusSession {
        let mut session = FocusSession::new(
            "20260302T090000000000-ab12",
            "Deep work",
            "rust",
            SessionPreset::POMODORO,
            path,
        );
        session
            .start(Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap())
            .unwrap();
        session
    }

    #[derive(Debug, Default)]
    struct RecordingWriter {
        writes: Mutex<Vec<String>>,
    }

    impl AtomicWriter for RecordingWriter {
        fn write_atomic(&self, _path: &Path, content: &str) -> io::Result<()> {
            self.writes.lock().unwrap().push(content.to_owned());
            Ok(())
        }
    }

    #[derive(Debug)]
    struct FailingWriter;

    impl AtomicWriter for FailingWriter {
        fn write_atomic(&self, _path: &Path, _content: &str) -> io::Result<()> {
            Err(io::Error::other("disk full"))
        }
    }

    #[test]
    fn test_should_render_summary_fields() {
        let mut session = session_at("/tmp/n.md");
        session.advance(300);
        session.pause().unwrap();
        session.advance(60);
        session.resume().unwrap();

        let block = writer().render(&session).expect("should render");

        assert!(block.starts_with("<!-- focus-session:20260302T090000000000-ab12 -->\n"));
        assert!(block.contains("## Focus session: Deep work\n"));
        assert!(block.contains("- Tag: rust\n"));
        assert!(block.contains("- Preset: 25/5\n"));
        assert!(block.contains("- Status: running\n"));
        assert!(block.contains("- Focused: 5m 00s of 25m 00s\n"));
        assert!(block.contains("- Interruptions: 1 (1m 00s paused)\n"));
        assert!(block.contains("<!--\n```focus-meta\nsession_id: 20260302T090000000000-ab12\n"));
        assert!(block.contains("started_at: 2026-03-02T09:00:00Z\n"));
        assert!(block.contains("interruption_seconds: 60\n```\n-->\n"));
        assert!(!block.contains("ended_at"));
        assert!(block.ends_with("<!-- /focus-session:20260302T090000000000-ab12 -->\n"));
    }

    #[test]
    fn test_should_keep_one_block_with_markerless_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.md");
        fs::write(&path, "# Note\n").unwrap();

        let mut templates = TemplateManager::with_builtins().unwrap();
        templates
            .add_template(NoteTemplate::new(SUMMARY_TEMPLATE, "## {{ title }}: {{ elapsed }}"))
            .unwrap();
        let writer = SessionNoteWriter::with_templates(templates, Arc::new(FsAtomicWriter));
        let mut session = session_at(&path);

        for _ in 0..3 {
            session.advance(120);
            writer.flush(&session, FlushReason::Periodic).expect("should flush");
        }

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "# Note\n\n<!-- focus-session:20260302T090000000000-ab12 -->\n\
             ## Deep work: 6m 00s\n\
             <!-- /focus-session:20260302T090000000000-ab12 -->\n"
        );
    }

    #[test]
    fn test_should_not_duplicate_markers_emitted_by_override() {
        let mut templates = TemplateManager::with_builtins().unwrap();
        templates
            .add_template(NoteTemplate::new(
                SUMMARY_TEMPLATE,
                "<!-- focus-session:{{ session_id }} -->\nbody\n<!-- /focus-session:{{ session_id }} -->\n",
            ))
            .unwrap();
        let writer = SessionNoteWriter::with_templates(templates, Arc::new(FsAtomicWriter));

        let block = writer.render(&session_at("/tmp/n.md")).unwrap();
        assert_eq!(
            block,
            "<!-- focus-session:20260302T090000000000-ab12 -->\nbody\n\
             <!-- /focus-session:20260302T090000000000-ab12 -->\n"
        );
    }

    #[test]
    fn test_should_keep_meta_comment_closed_for_hostile_titles() {
        let mut session = FocusSession::new(
            "20260302T090000000000-ab12",
            "oops --> shown",
            "a--b",
            SessionPreset::POMODORO,
            "/tmp/n.md",
        );
        session.start(Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()).unwrap();

        let block = writer().render(&session).unwrap();
        let meta_start = block.find("<!--\n```focus-meta").expect("should have meta comment");
        let meta = &block[meta_start + 4..];
        let close = meta.find("-->").expect("should close meta comment");

        assert!(meta[..close].contains("title: oops - -> shown\n"));
        assert!(meta[..close].contains("tag: a- -b\n"));
        assert!(meta[..close].contains("interruption_seconds: 0\n```\n"));
    }

    #[test]
    fn test_should_render_idempotently() {
        let session = session_at("/tmp/n.md");
        let writer = writer();
        assert_eq!(writer.render(&session).unwrap(), writer.render(&session).unwrap());
    }

    #[test]
    fn test_should_render_end_time_for_finished_session() {
        let mut session = session_at("/tmp/n.md");
        session.advance(90);
        session.finish(SessionOutcome::StoppedEarly).unwrap();

        let block = writer().render(&session).unwrap();
        assert!(block.contains("- Status: stopped_early\n"));
        assert!(block.contains("ended_at: 2026-03-02T09:01:30Z\n"));
    }

    #[test]
    fn test_should_append_block_with_blank_line() {
        let block = "<!-- focus-session:a -->\nbody\n<!-- /focus-session:a -->\n";

        assert_eq!(SessionNoteWriter::write("", block, "a"), block);
        assert_eq!(
            SessionNoteWriter::write("# Note\n", block, "a"),
            format!("# Note\n\n{block}")
        );
        assert_eq!(
            SessionNoteWriter::write("# Note", block, "a"),
            format!("# Note\n\n{block}")
        );
        assert_eq!(
            SessionNoteWriter::write("# Note\n\n", block, "a"),
            format!("# Note\n\n{block}")
        );
    }

    #[test]
    fn test_should_replace_block_in_place() {
        let old = "<!-- focus-session:a -->\nold\n<!-- /focus-session:a -->\n";
        let new = "<!-- focus-session:a -->\nnew body\n<!-- /focus-session:a -->\n";
        let content = format!("# Title\n\nintro\n\n{old}\n## After\ntext\n");

        let updated = SessionNoteWriter::write(&content, new, "a");
        assert_eq!(updated, format!("# Title\n\nintro\n\n{new}\n## After\ntext\n"));
    }

    #[test]
    fn test_should_keep_missing_trailing_newline_at_eof() {
        let content = "# T\n\n<!-- focus-session:a -->\nold\n<!-- /focus-session:a -->";
        let new = "<!-- focus-session:a -->\nnew\n<!-- /focus-session:a -->\n";

        let updated = SessionNoteWriter::write(content, new, "a");
        assert_eq!(updated, "# T\n\n<!-- focus-session:a -->\nnew\n<!-- /focus-session:a -->");
    }

    #[test]
    fn test_should_leave_other_sessions_blocks_alone() {
        let other = "<!-- focus-session:b -->\nb\n<!-- /focus-session:b -->\n";
        let mine = "<!-- focus-session:a -->\na\n<!-- /focus-session:a -->\n";
        let content = other.to_owned();

        let once = SessionNoteWriter::write(&content, mine, "a");
        assert_eq!(once, format!("{other}\n{mine}"));
        let twice = SessionNoteWriter::write(&once, mine, "a");
        assert_eq!(twice, once);
        assert_eq!(twice.matches("<!-- focus-session:a -->").count(), 1);
        assert_eq!(twice.matches("<!-- focus-session:b -->").count(), 1);
    }

    #[test]
    fn test_should_replace_truncated_block_to_end() {
        let content = "# T\n\n<!-- focus-session:a -->\npartial";
        let new = "<!-- focus-session:a -->\nfull\n<!-- /focus-session:a -->\n";

        let updated = SessionNoteWriter::write(content, new, "a");
        assert_eq!(updated, format!("# T\n\n{new}"));
    }

    #[test]
    fn test_should_flush_idempotently_to_disk() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let path = dir.path().join("note.md");
        fs::write(&path, "# My note\n\nSome thoughts.\n").unwrap();

        let session = session_at(&path);
        let writer = writer();
        writer.flush(&session, FlushReason::Periodic).expect("should flush");
        let first = fs::read_to_string(&path).unwrap();
        writer.flush(&session, FlushReason::Periodic).expect("should flush");
        let second = fs::read_to_string(&path).unwrap();

        assert_eq!(first, second);
        assert!(first.starts_with("# My note\n\nSome thoughts.\n\n<!-- focus-session:"));
        assert_eq!(first.matches("<!-- focus-session:").count(), 1);
    }

    #[test]
    fn test_should_update_block_as_session_progresses() {
        let recorder = Arc::new(RecordingWriter::default());
        let writer = SessionNoteWriter::new(recorder.clone()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let mut session = session_at(dir.path().join("missing.md"));

        writer.flush(&session, FlushReason::Periodic).unwrap();
        session.advance(120);
        writer.flush(&session, FlushReason::Periodic).unwrap();

        let writes = recorder.writes.lock().unwrap();
        assert_eq!(writes.len(), 2);
        assert!(writes[0].contains("- Focused: 0m 00s of 25m 00s"));
        assert!(writes[1].contains("- Focused: 2m 00s of 25m 00s"));
    }

    #[test]
    fn test_should_classify_write_failures_by_reason() {
        let writer = SessionNoteWriter::new(Arc::new(FailingWriter)).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let session = session_at(dir.path().join("n.md"));

        let err = writer.flush(&session, FlushReason::Periodic).unwrap_err();
        assert!(matches!(err, FocusError::AutosaveWrite { .. }));
        assert!(err.is_recoverable());

        let err = writer.flush(&session, FlushReason::Stop).unwrap_err();
        assert!(matches!(err, FocusError::FinalSave { .. }));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_should_create_note_scaffold() {
        let dir = tempfile::tempdir().unwrap();
        let path = note_path_for(&dir.path().join("notes"), "20260302T090000000000-ab12", "Deep work!");
        assert!(path.ends_with("20260302T090000000000-ab12-deep-work.md"));

        let session = session_at(&path);
        writer().create_note(&session).expect("should create note");

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("id: 20260302T090000000000-ab12\n"));
        assert!(text.contains("start: 2026-03-02T09:00:00Z\n"));
        assert!(text.contains("preset: 25/5\n"));
        assert!(text.contains("tag: rust\n"));
        assert!(text.contains("# Deep work\n"));

        fs::write(&path, "edited").unwrap();
        writer().create_note(&session).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "edited");
    }

    #[test]
    fn test_should_slugify_titles() {
        assert_eq!(slugify("Power Apps recap"), "power-apps-recap");
        assert_eq!(slugify("  --Hello,   World!!  "), "hello-world");
        assert_eq!(slugify("***"), "focus-session");
        assert_eq!(slugify(""), "focus-session");
    }

    #[test]
    fn test_should_format_durations() {
        assert_eq!(format_duration(0), "0m 00s");
        assert_eq!(format_duration(1500), "25m 00s");
        assert_eq!(format_duration(3907), "1h 05m 07s");
    }
}
