//! Error type for frontmatter parsing and rendering.

/// Failures surfaced by the template stack.
///
/// `Render` failures are never propagated to a task as a panic or bubbled
/// exception — callers treat them as "no content" and log the inner
/// message (see `spec.md` §4.B).
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("failed to parse frontmatter: {0}")]
    FrontmatterParse(#[from] serde_yaml::Error),

    #[error("template render error in {template}: {message}")]
    Render { template: String, message: String },

    #[error("partial '{0}' would escape the document root")]
    PartialEscapesRoot(String),

    #[error("partial '{0}' is an absolute path")]
    PartialAbsolute(String),

    #[error("cyclic partial include detected: {0}")]
    CyclicInclude(String),

    #[error("failed to read template '{name}': {message}")]
    FileRead { name: String, message: String },
}

impl TemplateError {
    /// The agent-facing directive associated with this error, per `spec.md` §7.
    pub fn instruction(&self) -> &'static str {
        match self {
            TemplateError::PartialEscapesRoot(_) | TemplateError::PartialAbsolute(_) => {
                "Display this error as-is to the user so that THEY can correct it."
            }
            _ => "Do not display; retry is handled automatically.",
        }
    }
}
