//! Query error types
//!
//! Error codes:
//! - SHAPE_UNKNOWN_FIELD (REJECT)
//! - SHAPE_NOT_AN_ARRAY_BUT_INDEXED (REJECT)
//! - SHAPE_DEPTH_EXCEEDED (REJECT)
//! - SHAPE_PLACEHOLDER_NOT_ALLOWED (REJECT)
//! - SHAPE_MALFORMED_PATH (REJECT)
//! - SHAPE_INCOMPATIBLE_OPERATOR (REJECT)
//! - SHAPE_UNKNOWN_OPERATOR (REJECT)
//! - SHAPE_INVALID_ARGUMENT (REJECT)
//! - SHAPE_TYPE_MISMATCH (REJECT)
//! - SHAPE_CONFLICTING_PATHS (REJECT)
//! - SHAPE_UNKNOWN_COLLECTION (REJECT)

use std::fmt;

use serde_json::Value;

use crate::operators::Capability;
use crate::path::PathError;
use crate::schema::{describe, SchemaError, SchemaErrorCode, SchemaNode, Severity};

/// Query-specific error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorCode {
    UnknownField,
    NotAnArrayButIndexed,
    DepthExceeded,
    PlaceholderNotAllowed,
    MalformedPath,
    /// Operator applied to a field without the required capability
    IncompatibleOperator,
    /// Operator name not in any table
    UnknownOperator,
    /// Operator argument has the wrong shape
    InvalidArgument,
    /// Literal does not conform to the field type
    TypeMismatch,
    /// Two update targets overlap
    ConflictingPaths,
    /// Foreign collection not in the catalog
    UnknownCollection,
}

impl QueryErrorCode {
    /// Returns the stable string code
    pub fn code(&self) -> &'static str {
        match self {
            QueryErrorCode::UnknownField => "SHAPE_UNKNOWN_FIELD",
            QueryErrorCode::NotAnArrayButIndexed => "SHAPE_NOT_AN_ARRAY_BUT_INDEXED",
            QueryErrorCode::DepthExceeded => "SHAPE_DEPTH_EXCEEDED",
            QueryErrorCode::PlaceholderNotAllowed => "SHAPE_PLACEHOLDER_NOT_ALLOWED",
            QueryErrorCode::MalformedPath => "SHAPE_MALFORMED_PATH",
            QueryErrorCode::IncompatibleOperator => "SHAPE_INCOMPATIBLE_OPERATOR",
            QueryErrorCode::UnknownOperator => "SHAPE_UNKNOWN_OPERATOR",
            QueryErrorCode::InvalidArgument => "SHAPE_INVALID_ARGUMENT",
            QueryErrorCode::TypeMismatch => "SHAPE_TYPE_MISMATCH",
            QueryErrorCode::ConflictingPaths => "SHAPE_CONFLICTING_PATHS",
            QueryErrorCode::UnknownCollection => "SHAPE_UNKNOWN_COLLECTION",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        Severity::Reject
    }
}

impl fmt::Display for QueryErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Query error with context
#[derive(Debug, Clone)]
pub struct QueryError {
    code: QueryErrorCode,
    message: String,
    path: Option<String>,
    operator: Option<String>,
}

impl QueryError {
    fn new(code: QueryErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            path: None,
            operator: None,
        }
    }

    /// Operator applied to a field lacking the required capability
    pub fn incompatible_operator(
        operator: &str,
        path: impl Into<String>,
        node: &SchemaNode,
        capability: Capability,
    ) -> Self {
        let path = path.into();
        Self {
            code: QueryErrorCode::IncompatibleOperator,
            message: format!(
                "operator '{}' requires a {} field, but '{}' is {}",
                operator,
                capability,
                path,
                node.kind_name()
            ),
            path: Some(path),
            operator: Some(operator.to_string()),
        }
    }

    /// Removal operator applied to a required field
    pub fn required_field(operator: &str, path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            code: QueryErrorCode::IncompatibleOperator,
            message: format!(
                "operator '{}' removes '{}', which is a required field",
                operator, path
            ),
            path: Some(path),
            operator: Some(operator.to_string()),
        }
    }

    pub fn unknown_operator(operator: &str, context: &str) -> Self {
        Self {
            operator: Some(operator.to_string()),
            ..Self::new(
                QueryErrorCode::UnknownOperator,
                format!("unknown operator '{}' in {}", operator, context),
            )
        }
    }

    pub fn invalid_argument(operator: &str, reason: impl fmt::Display) -> Self {
        Self {
            operator: Some(operator.to_string()),
            ..Self::new(
                QueryErrorCode::InvalidArgument,
                format!("invalid argument to '{}': {}", operator, reason),
            )
        }
    }

    pub fn type_mismatch(path: impl Into<String>, expected: &SchemaNode, found: &Value) -> Self {
        let path = path.into();
        Self {
            path: Some(path.clone()),
            ..Self::new(
                QueryErrorCode::TypeMismatch,
                format!(
                    "value {} does not match '{}' of type {}",
                    describe(found),
                    path,
                    expected
                ),
            )
        }
    }

    pub fn conflicting_paths(first: &str, second: &str) -> Self {
        Self {
            path: Some(second.to_string()),
            ..Self::new(
                QueryErrorCode::ConflictingPaths,
                format!("update paths '{}' and '{}' conflict", first, second),
            )
        }
    }

    pub fn unknown_collection(name: &str) -> Self {
        Self::new(
            QueryErrorCode::UnknownCollection,
            format!("collection '{}' is not in the schema catalog", name),
        )
    }

    /// Attach a path if none is recorded yet
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        if self.path.is_none() {
            self.path = Some(path.into());
        }
        self
    }

    pub fn code(&self) -> QueryErrorCode {
        self.code
    }

    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Offending path, if the error concerns one
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn operator(&self) -> Option<&str> {
        self.operator.as_deref()
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.severity(),
            self.code.code(),
            self.message
        )
    }
}

impl std::error::Error for QueryError {}

impl From<PathError> for QueryError {
    fn from(err: PathError) -> Self {
        let code = match &err {
            PathError::UnknownField { .. } => QueryErrorCode::UnknownField,
            PathError::NotAnArrayButIndexed { .. } => QueryErrorCode::NotAnArrayButIndexed,
            PathError::DepthExceeded { .. } => QueryErrorCode::DepthExceeded,
            PathError::PlaceholderNotAllowed { .. } => QueryErrorCode::PlaceholderNotAllowed,
            PathError::MalformedPath { .. } => QueryErrorCode::MalformedPath,
        };
        Self {
            path: Some(err.path().to_string()),
            ..Self::new(code, err.to_string())
        }
    }
}

impl From<SchemaError> for QueryError {
    fn from(err: SchemaError) -> Self {
        let code = match err.code() {
            SchemaErrorCode::UnknownCollection => QueryErrorCode::UnknownCollection,
            SchemaErrorCode::SchemaMalformed | SchemaErrorCode::SchemaUnreadable => {
                QueryErrorCode::InvalidArgument
            }
        };
        Self::new(code, err.message())
    }
}

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;
