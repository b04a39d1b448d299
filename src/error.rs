//! Validation errors surfaced to callers
//!
//! These travel inside `anyhow::Error`; callers that need to react to a
//! specific failure can `downcast_ref::<Error>()`.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Tag name does not match the tag grammar
    #[error(
        "Invalid tag name '{0}': tags must start with a lowercase letter and contain only lowercase letters, digits and single hyphens"
    )]
    InvalidTag(String),

    /// Merge source and target are the same tag
    #[error("Cannot merge tag '{0}' into itself")]
    SameTag(String),

    /// Regex-mode search pattern failed to compile
    #[error("Invalid search pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Refusing to overwrite an existing note
    #[error("Note already exists: {}", .0.display())]
    NoteExists(PathBuf),

    /// Template name not found in the template directory
    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    /// Bundle generation needs a variable the caller did not supply
    #[error("Missing value for bundle variable '{0}'")]
    MissingVariable(String),

    /// Bundle definition is structurally unusable
    #[error("Invalid bundle definition: {0}")]
    InvalidBundle(String),
}

/// A file a bulk operation could not read or write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFailure {
    pub path: PathBuf,
    pub message: String,
}

impl FileFailure {
    pub fn new(path: impl Into<PathBuf>, error: &anyhow::Error) -> Self {
        Self {
            path: path.into(),
            message: format!("{:#}", error),
        }
    }
}
