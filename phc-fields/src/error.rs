//! Error types for the field registry and validator

use thiserror::Error;

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, FieldsError>;

/// Errors raised while reading field definitions
#[derive(Debug, Error)]
pub enum FieldsError {
    /// No active definition exists for the code
    #[error("custom field not found: {code}")]
    FieldNotFound { code: String },

    /// A definition row exists but cannot be used
    #[error("invalid definition for custom field '{code}': {reason}")]
    InvalidDefinition { code: String, reason: String },

    /// Database error while reading metadata rows
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl FieldsError {
    /// Create an invalid definition error
    pub fn invalid_definition(code: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDefinition {
            code: code.into(),
            reason: reason.into(),
        }
    }
}

/// A submitted value violated its field definition.
///
/// Every variant is a client error and names the offending field.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("custom field '{code}' does not exist or is not active")]
    UnknownField { code: String },

    #[error("field '{name}' is required")]
    MissingRequired { code: String, name: String },

    #[error("invalid value for '{name}'")]
    PatternMismatch { code: String, name: String },

    #[error("value of '{name}' must be one of: {}", .options.join(", "))]
    InvalidOption {
        code: String,
        name: String,
        options: Vec<String>,
    },

    #[error("invalid data type for '{name}', expected {expected}")]
    TypeMismatch {
        code: String,
        name: String,
        expected: String,
    },
}

impl ValidationError {
    /// Code of the field that failed validation
    pub fn code(&self) -> &str {
        match self {
            Self::UnknownField { code }
            | Self::MissingRequired { code, .. }
            | Self::PatternMismatch { code, .. }
            | Self::InvalidOption { code, .. }
            | Self::TypeMismatch { code, .. } => code,
        }
    }
}
