//! Schema error types
//!
//! Error codes:
//! - SHAPE_SCHEMA_MALFORMED (REJECT)
//! - SHAPE_SCHEMA_UNREADABLE (REJECT)
//! - SHAPE_UNKNOWN_COLLECTION (REJECT)
//!
//! Tree lookups never produce a `SchemaError`; they answer with a
//! [`LookupError`] so callers can branch on "not found" without treating
//! it as a failure.

use std::fmt;

use thiserror::Error;

/// Severity levels for schema errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Caller input rejected
    Reject,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Reject => write!(f, "REJECT"),
        }
    }
}

/// Schema-specific error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaErrorCode {
    /// Schema description is structurally invalid
    SchemaMalformed,
    /// Schema file could not be read or parsed
    SchemaUnreadable,
    /// Collection name not present in the catalog
    UnknownCollection,
}

impl SchemaErrorCode {
    /// Returns the stable string code
    pub fn code(&self) -> &'static str {
        match self {
            SchemaErrorCode::SchemaMalformed => "SHAPE_SCHEMA_MALFORMED",
            SchemaErrorCode::SchemaUnreadable => "SHAPE_SCHEMA_UNREADABLE",
            SchemaErrorCode::UnknownCollection => "SHAPE_UNKNOWN_COLLECTION",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        Severity::Reject
    }
}

impl fmt::Display for SchemaErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Schema error type with full context
#[derive(Debug, Clone)]
pub struct SchemaError {
    code: SchemaErrorCode,
    message: String,
    /// Source of the description (file path or `<in-memory>`)
    source_name: Option<String>,
}

impl SchemaError {
    /// Create a malformed schema error
    pub fn malformed(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        let source_name = source_name.into();
        Self {
            code: SchemaErrorCode::SchemaMalformed,
            message: format!("Schema '{}' is malformed: {}", source_name, reason.into()),
            source_name: Some(source_name),
        }
    }

    /// Create an unreadable schema error
    pub fn unreadable(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        let source_name = source_name.into();
        Self {
            code: SchemaErrorCode::SchemaUnreadable,
            message: format!("Schema '{}' could not be read: {}", source_name, reason.into()),
            source_name: Some(source_name),
        }
    }

    /// Create an unknown collection error
    pub fn unknown_collection(name: impl Into<String>) -> Self {
        Self {
            code: SchemaErrorCode::UnknownCollection,
            message: format!("Collection '{}' is not in the schema catalog", name.into()),
            source_name: None,
        }
    }

    /// Returns the error code
    pub fn code(&self) -> SchemaErrorCode {
        self.code
    }

    /// Returns the severity level
    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the schema source if known
    pub fn source_name(&self) -> Option<&str> {
        self.source_name.as_deref()
    }
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.code.severity(),
            self.code.code(),
            self.message
        )
    }
}

impl std::error::Error for SchemaError {}

/// Result type for schema operations
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Outcome of a failed single-step tree lookup
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    /// The object has no such field (or the node is not an object)
    #[error("field '{0}' not found")]
    NotFound(String),

    /// The node is not an array
    #[error("expected an array, found {0}")]
    NotArray(String),
}
