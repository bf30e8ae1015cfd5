//! Schema error types
//!
//! Error codes:
//! - SCHEMA_CONSTRAINT_SHAPE (caller bug, always raised)
//! - SCHEMA_TYPE_MISMATCH
//! - SCHEMA_VALIDATION_FAILED
//! - SCHEMA_MISSING_FIELD
//! - SCHEMA_ILLEGAL_TRANSITION
//! - SCHEMA_FIELD_DETACHED
//! - SCHEMA_CODEC_FAILED
//! - SCHEMA_BACKEND_FAILED
//!
//! Every error is deterministic for a given input. Nothing here is retried.

use thiserror::Error;

/// Result type for schema operations
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Schema engine errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    /// Malformed filter/constraint arguments
    #[error("Invalid {constraint} constraint: {detail}")]
    ConstraintShape { constraint: String, detail: String },

    /// A field's kind or document type disagrees with a constraint or a merge counterpart
    #[error("Field '{path}' has type {actual}, not {expected}")]
    TypeMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    /// A value failed a field's kind-specific rule
    #[error("{}", fmt_validation(.path, .rule))]
    Validation { path: Option<String>, rule: String },

    /// Lookup by path found nothing
    #[error("Field '{path}' does not exist")]
    MissingField { path: String },

    /// A state change that the field lifecycle forbids
    #[error("{}", fmt_transition(.path, .detail))]
    IllegalTransition { path: Option<String>, detail: String },

    /// The operation requires the field to be attached to a schema
    #[error("Field '{name}' is not attached to a dataset: {detail}")]
    Detached { name: String, detail: String },

    /// Stored representation could not be decoded
    #[error("Codec error: {0}")]
    Codec(String),

    /// Persistence collaborator failure
    #[error("Backend error: {0}")]
    Backend(String),
}

fn fmt_validation(path: &Option<String>, rule: &str) -> String {
    match path {
        Some(path) => format!("Invalid value for field '{}': {}", path, rule),
        None => format!("Invalid value: {}", rule),
    }
}

fn fmt_transition(path: &Option<String>, detail: &str) -> String {
    match path {
        Some(path) => format!("Illegal transition for field '{}': {}", path, detail),
        None => format!("Illegal transition: {}", detail),
    }
}

impl SchemaError {
    /// Create a constraint shape error
    pub fn constraint(constraint: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::ConstraintShape {
            constraint: constraint.into(),
            detail: detail.into(),
        }
    }

    /// Create a type mismatch error
    pub fn type_mismatch(
        path: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::TypeMismatch {
            path: path.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create a validation error without path context
    pub fn validation(rule: impl Into<String>) -> Self {
        Self::Validation {
            path: None,
            rule: rule.into(),
        }
    }

    /// Create a missing field error
    pub fn missing_field(path: impl Into<String>) -> Self {
        Self::MissingField { path: path.into() }
    }

    /// Create an illegal transition error
    pub fn illegal_transition(path: Option<&str>, detail: impl Into<String>) -> Self {
        Self::IllegalTransition {
            path: path.map(str::to_string),
            detail: detail.into(),
        }
    }

    /// Create a detached field error
    pub fn detached(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Detached {
            name: name.into(),
            detail: detail.into(),
        }
    }

    /// Attach a path to a validation error that does not carry one yet.
    ///
    /// Nested validation reports the innermost path, so an existing path wins.
    pub fn at_path(self, field_path: &str) -> Self {
        match self {
            Self::Validation { path: None, rule } => Self::Validation {
                path: Some(field_path.to_string()),
                rule,
            },
            other => other,
        }
    }

    /// Returns the stable error code
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConstraintShape { .. } => "SCHEMA_CONSTRAINT_SHAPE",
            Self::TypeMismatch { .. } => "SCHEMA_TYPE_MISMATCH",
            Self::Validation { .. } => "SCHEMA_VALIDATION_FAILED",
            Self::MissingField { .. } => "SCHEMA_MISSING_FIELD",
            Self::IllegalTransition { .. } => "SCHEMA_ILLEGAL_TRANSITION",
            Self::Detached { .. } => "SCHEMA_FIELD_DETACHED",
            Self::Codec(_) => "SCHEMA_CODEC_FAILED",
            Self::Backend(_) => "SCHEMA_BACKEND_FAILED",
        }
    }

    /// Whether the error indicates a programming error on the caller side
    pub fn is_caller_bug(&self) -> bool {
        matches!(
            self,
            Self::ConstraintShape { .. } | Self::IllegalTransition { .. } | Self::Detached { .. }
        )
    }
}
