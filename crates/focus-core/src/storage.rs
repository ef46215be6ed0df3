//! All-or-nothing file writes.
//!
//! Notes and settings are never written in place. [`FsAtomicWriter`] writes a
//! temporary file next to the target and renames it over the target, so a
//! reader sees either the old content or the new content, never a mix.

use std::fmt;
use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::debug;

/// Writes whole files with all-or-nothing visibility.
pub trait AtomicWriter: Send + Sync + fmt::Debug {
    /// Replace the content of `path` with `content`.
    fn write_atomic(&self, path: &Path, content: &str) -> io::Result<()>;
}

/// [`AtomicWriter`] backed by the local filesystem (temp file + rename).
#[derive(Debug, Clone, Copy, Default)]
pub struct FsAtomicWriter;

impl AtomicWriter for FsAtomicWriter {
    fn write_atomic(&self, path: &Path, content: &str) -> io::Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.flush()?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;

        debug!(path = %path.display(), bytes = content.len(), "wrote file atomically");
        Ok(())
    }
}

/// Read a text file, treating a missing file as empty.
pub(crate) fn read_or_empty(path: &Path) -> io::Result<String> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(e),
    }
}
