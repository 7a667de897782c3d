//! Error types for the dictation core.
//!
//! Not-found conditions are never errors here: lookups return `Option` and
//! mutations on unknown ids are silent no-ops.

use thiserror::Error;

/// Result type alias for dictation core operations
pub type DictationResult<T> = Result<T, DictationError>;

/// Main error type for dictation core operations
#[derive(Error, Debug)]
pub enum DictationError {
    #[error("Validation error in {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database operation failed: {0}")]
    DatabaseOperation(String),

    #[error("Migration to schema version {version} failed: {message}")]
    Migration { version: i64, message: String },

    #[error("A dictionary entry for \"{0}\" already exists")]
    DuplicatePhrase(String),

    #[error("Unsupported export format: {0}")]
    UnsupportedExportFormat(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Pattern error: {0}")]
    Regex(#[from] regex::Error),
}

impl DictationError {
    /// Create a new validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        DictationError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new database operation error
    pub fn database_op(message: impl Into<String>) -> Self {
        DictationError::DatabaseOperation(message.into())
    }

    /// Whether the error is a caller-displayable constraint failure rather
    /// than a medium or programming failure.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DictationError::Validation { .. } | DictationError::DuplicatePhrase(_)
        )
    }
}
