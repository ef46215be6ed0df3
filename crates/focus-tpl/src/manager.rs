use std::fs;
use std::path::Path;

use minijinja::{Environment, ErrorKind, UndefinedBehavior};
use tracing::debug;

use crate::error::TplError;
use crate::template::NoteTemplate;

/// Extension of template files picked up by [`TemplateManager::load_dir`].
const TEMPLATE_EXTENSION: &str = "md";

/// Manages note templates and renders them with context variables.
///
/// Rendering is deterministic: the same context always produces the same
/// bytes, which the note writer relies on for idempotent updates.
#[derive(Debug)]
pub struct TemplateManager {
    env: Environment<'static>,
}

impl TemplateManager {
    /// Create a new empty TemplateManager.
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_keep_trailing_newline(true);
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        Self { env }
    }

    /// Create a manager preloaded with the built-in note templates.
    pub fn with_builtins() -> Result<Self, TplError> {
        let mut manager = Self::new();
        for template in NoteTemplate::builtins() {
            manager.add_template(template)?;
        }
        Ok(manager)
    }

    /// Load all `.md` templates from a directory, replacing templates of the
    /// same name. Template names are the paths relative to `dir` joined with
    /// `/` (e.g. `note/summary.md`).
    ///
    /// Returns the number of templates loaded.
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize, TplError> {
        let mut found = Vec::new();
        collect_templates(dir, dir, &mut found)?;

        let count = found.len();
        for template in found {
            debug!(name = %template.name, "loading template override");
            self.add_template(template)?;
        }
        Ok(count)
    }

    /// Register a single template.
    pub fn add_template(&mut self, template: NoteTemplate) -> Result<(), TplError> {
        self.env
            .add_template_owned(template.name.clone(), template.source)
            .map_err(|e| TplError::InvalidTemplate(format!("{}: {e}", template.name)))
    }

    /// Returns whether a template with the given name is registered.
    pub fn has_template(&self, name: &str) -> bool {
        self.env.get_template(name).is_ok()
    }

    /// Render a template by name with the given context.
    pub fn render(&self, name: &str, ctx: &serde_json::Value) -> Result<String, TplError> {
        let template = self.env.get_template(name).map_err(|e| match e.kind() {
            ErrorKind::TemplateNotFound => TplError::TemplateNotFound(name.to_owned()),
            _ => TplError::InvalidTemplate(e.to_string()),
        })?;

        template
            .render(ctx)
            .map_err(|e| TplError::RenderError(format!("{name}: {e}")))
    }
}

impl Default for TemplateManager {
    fn default() -> Self {
        Self::new()
    }
}

fn collect_templates(
    root: &Path,
    dir: &Path,
    out: &mut Vec<NoteTemplate>,
) -> Result<(), TplError> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();

        if path.is_dir() {
            collect_templates(root, &path, out)?;
            continue;
        }

        if path.extension().and_then(|e| e.to_str()) != Some(TEMPLATE_EXTENSION) {
            continue;
        }

        let Ok(relative) = path.strip_prefix(root) else {
            continue;
        };
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        let source = fs::read_to_string(&path)?;
        out.push(NoteTemplate::new(name, source));
    }
    Ok(())
}
