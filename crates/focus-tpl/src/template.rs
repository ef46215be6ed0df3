//! Note template types and the built-in template sources.
//!
//! Defines [`NoteTemplate`] for representing template sources and the two
//! templates every installation ships with: the scaffold written when a
//! session creates a fresh note, and the summary block that autosave keeps
//! up to date inside the note.

use serde::{Deserialize, Serialize};

/// Name of the template used to scaffold a new session note.
pub const SCAFFOLD_TEMPLATE: &str = "note/scaffold.md";

/// Name of the template used to render the session summary block.
pub const SUMMARY_TEMPLATE: &str = "note/summary.md";

/// Metadata about a note template, including its name and source content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteTemplate {
    /// Template name used for lookup (e.g., `note/summary.md`).
    pub name: String,

    /// Raw Jinja2 template source.
    pub source: String,
}

impl NoteTemplate {
    /// Create a template from a name and source.
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
        }
    }

    /// Returns the templates compiled into the binary.
    pub fn builtins() -> Vec<NoteTemplate> {
        vec![
            NoteTemplate::new(SCAFFOLD_TEMPLATE, BUILTIN_SCAFFOLD),
            NoteTemplate::new(SUMMARY_TEMPLATE, BUILTIN_SUMMARY),
        ]
    }
}

const BUILTIN_SCAFFOLD: &str = "---
id: {{ session_id }}
start: {{ started_at }}
preset: {{ preset }}
tag: {{ tag }}
---

# {{ title }}

## Goal
-

## Notes
-

## Next actions
- [ ]
";

// Session markers are added around the rendered body by the note writer.
// The meta loop trims the newline after each tag so every field lands on
// its own line with no blank lines in between.
const BUILTIN_SUMMARY: &str = "## Focus session: {{ title }}

- Tag: {{ tag }}
- Preset: {{ preset }}
- Status: {{ status }}
- Focused: {{ elapsed }} of {{ expected }}
- Interruptions: {{ interruption_count }} ({{ interruption_time }} paused)

<!--
```focus-meta
{% for field in meta -%}
{{ field.key }}: {{ field.value }}
{% endfor -%}
```
-->
";
