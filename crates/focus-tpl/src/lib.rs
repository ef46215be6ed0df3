mod error;
mod manager;
mod template;

pub use error::TplError;
pub use manager::TemplateManager;
pub use template::{NoteTemplate, SCAFFOLD_TEMPLATE, SUMMARY_TEMPLATE};
