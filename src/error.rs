//! The error taxonomy (`spec.md` §7): one kind per failure category, each
//! carrying the agent-facing directive a caller attaches to a structured
//! failure result before handing it back across the (external) RPC
//! boundary.

use serde_json::{json, Value};

/// A structured failure result (`spec.md` §7 "Every failure result carries
/// (`error`, `error_type`, `instruction`)").
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Input violates a declared constraint (flag name/value, project name,
    /// path component). Carries field/message pairs for the caller.
    #[error("validation failed: {fields:?}")]
    Validation { fields: Vec<(String, String)> },

    /// A named category/collection/template is absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// Template parse or render fault.
    #[error("template render error: {0}")]
    TemplateRender(String),

    /// IO or decode failure on a template/partial/config.
    #[error("file read error: {0}")]
    FileRead(String),

    /// A path escapes the document root or targets a sensitive system path.
    /// Fatal to the specific operation; never downgraded to `NotFound`.
    #[error("security error: {0}")]
    Security(String),

    /// A required current project is absent.
    #[error("no current project")]
    NoProject,

    /// Config writeback failed.
    #[error("save failed: {0}")]
    Save(String),
}

impl CoreError {
    /// The stable wire tag for `error_type` in the structured failure result.
    pub fn error_type(&self) -> &'static str {
        match self {
            CoreError::Validation { .. } => "validation",
            CoreError::NotFound(_) => "not_found",
            CoreError::TemplateRender(_) => "template_render",
            CoreError::FileRead(_) => "file_read",
            CoreError::Security(_) => "security",
            CoreError::NoProject => "no_project",
            CoreError::Save(_) => "save",
        }
    }

    /// The directive handed to the *agent* (not the user) describing how to
    /// treat this failure (`spec.md` §7 "User-visible failure").
    pub fn instruction(&self) -> &'static str {
        match self {
            CoreError::Validation { .. } => {
                "Return error to user without remediation."
            }
            CoreError::Security(_) => {
                "Display this error as-is to the user so that THEY can correct it."
            }
            CoreError::NotFound(_) => "Display this error as-is to the user so that THEY can correct it.",
            CoreError::NoProject => "Ask the user to activate a project before retrying.",
            CoreError::TemplateRender(_) | CoreError::FileRead(_) | CoreError::Save(_) => {
                "Do not display; retry is handled automatically."
            }
        }
    }
}

impl From<guide_templates::TemplateError> for CoreError {
    fn from(err: guide_templates::TemplateError) -> Self {
        use guide_templates::TemplateError as T;
        match err {
            T::PartialEscapesRoot(name) | T::PartialAbsolute(name) => {
                CoreError::Security(format!("partial '{name}' is outside the document root"))
            }
            T::FileRead { name, message } => CoreError::FileRead(format!("{name}: {message}")),
            other => CoreError::TemplateRender(other.to_string()),
        }
    }
}

/// Render a `CoreError` as the `{error, error_type, instruction}` failure
/// result the (external) RPC boundary serializes back to the caller
/// (`spec.md` §7).
impl From<CoreError> for Value {
    fn from(err: CoreError) -> Value {
        json!({
            "error": err.to_string(),
            "error_type": err.error_type(),
            "instruction": err.instruction(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_serializes_with_instruction() {
        let err = CoreError::Validation { fields: vec![("name".into(), "invalid".into())] };
        let value: Value = err.into();
        assert_eq!(value["error_type"], "validation");
        assert_eq!(value["instruction"], "Return error to user without remediation.");
    }

    #[test]
    fn security_error_is_distinct_from_not_found() {
        let security = CoreError::Security("escape".into());
        let not_found = CoreError::NotFound("missing".into());
        assert_eq!(security.error_type(), "security");
        assert_eq!(not_found.error_type(), "not_found");
        assert_ne!(security.error_type(), not_found.error_type());
    }

    #[test]
    fn template_error_partial_escape_maps_to_security() {
        let source_err = guide_templates::TemplateError::PartialEscapesRoot("../x".into());
        let core_err: CoreError = source_err.into();
        assert_eq!(core_err.error_type(), "security");
    }
}
