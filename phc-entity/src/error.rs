//! Error types for entity reads and writes

use std::fmt;

use phc_fields::{FieldsError, ValidationError};
use thiserror::Error;

use crate::schema::EntityKind;

/// Result type for entity operations
pub type Result<T> = std::result::Result<T, EntityError>;

/// Which write failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOp {
    Create,
    Update,
}

impl fmt::Display for WriteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Create => "create",
            Self::Update => "update",
        })
    }
}

/// Errors that can occur in entity operations
#[derive(Debug, Error)]
pub enum EntityError {
    /// A submitted custom field value was rejected
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Field registry error
    #[error(transparent)]
    Fields(#[from] FieldsError),

    /// Entity not found
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    /// Base column outside the entity kind's allow-list
    #[error("unknown column '{column}' for {kind}")]
    UnknownColumn { kind: EntityKind, column: String },

    /// Caller-supplied id missing on create
    #[error("missing '{column}' for new {kind}")]
    MissingKey { kind: EntityKind, column: String },

    /// A unique base column already holds the value
    #[error("{kind} with {column} '{value}' already exists")]
    Conflict {
        kind: EntityKind,
        column: String,
        value: String,
    },

    /// External target refused by policy or absent from the schema
    #[error("custom field '{code}' cannot target {table}.{column}: {reason}")]
    TargetRejected {
        code: String,
        table: String,
        column: String,
        reason: String,
    },

    /// A stamp-joined external field on an entity without a stamp
    #[error("custom field '{code}' joins {table}.{key_column} on the stamp, but the entity has none")]
    MissingStamp {
        code: String,
        table: String,
        key_column: String,
    },

    /// The write transaction was rolled back
    #[error("failed to {op} {kind}: {source}")]
    WriteFailed {
        op: WriteOp,
        kind: EntityKind,
        source: Box<EntityError>,
    },

    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EntityError {
    /// Create a not found error
    pub fn not_found(kind: EntityKind, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Create a target rejected error
    pub fn target_rejected(
        code: impl Into<String>,
        table: impl Into<String>,
        column: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::TargetRejected {
            code: code.into(),
            table: table.into(),
            column: column.into(),
            reason: reason.into(),
        }
    }

    /// Wrap a failure that happened inside a write transaction
    pub fn write_failed(op: WriteOp, kind: EntityKind, source: EntityError) -> Self {
        Self::WriteFailed {
            op,
            kind,
            source: Box::new(source),
        }
    }

    /// The caller sent something the engine refuses
    pub fn is_client_error(&self) -> bool {
        match self {
            Self::Validation(_)
            | Self::UnknownColumn { .. }
            | Self::MissingKey { .. }
            | Self::Conflict { .. } => true,
            Self::WriteFailed { source, .. } => source.is_client_error(),
            _ => false,
        }
    }

    /// The entity or field definition does not exist
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } | Self::Fields(FieldsError::FieldNotFound { .. }) => true,
            Self::WriteFailed { source, .. } => source.is_not_found(),
            _ => false,
        }
    }
}
