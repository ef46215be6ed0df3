use thiserror::Error;

/// Errors raised while loading or rendering note templates.
#[derive(Debug, Error)]
pub enum TplError {
    #[error("note template not found: {0}")]
    TemplateNotFound(String),

    #[error("failed to render note template {0}")]
    RenderError(String),

    #[error("note template does not parse: {0}")]
    InvalidTemplate(String),

    #[error("failed to read template overrides: {0}")]
    Io(#[from] std::io::Error),
}
