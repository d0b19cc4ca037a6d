//! Path resolution error types
//!
//! Error codes:
//! - SHAPE_UNKNOWN_FIELD
//! - SHAPE_NOT_AN_ARRAY_BUT_INDEXED
//! - SHAPE_DEPTH_EXCEEDED
//! - SHAPE_PLACEHOLDER_NOT_ALLOWED
//! - SHAPE_MALFORMED_PATH

use thiserror::Error;

/// Failure to resolve a dot path against a schema
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// A name segment does not exist at that point in the schema
    #[error("unknown field '{segment}' in path '{path}'")]
    UnknownField { path: String, segment: String },

    /// An index or placeholder was applied to a non-array value
    #[error("segment '{segment}' of path '{path}' indexes a value that is not an array")]
    NotAnArrayButIndexed { path: String, segment: String },

    /// The path needs more levels than the depth budget allows
    #[error("path '{path}' exceeds the maximum depth of {max_depth}")]
    DepthExceeded { path: String, max_depth: usize },

    /// A placeholder appeared where placeholders are disabled
    #[error("placeholder '{segment}' is not allowed in path '{path}'")]
    PlaceholderNotAllowed { path: String, segment: String },

    /// The path text cannot be tokenized
    #[error("malformed path '{path}': {reason}")]
    MalformedPath { path: String, reason: String },
}

impl PathError {
    /// Returns the stable string code
    pub fn code(&self) -> &'static str {
        match self {
            PathError::UnknownField { .. } => "SHAPE_UNKNOWN_FIELD",
            PathError::NotAnArrayButIndexed { .. } => "SHAPE_NOT_AN_ARRAY_BUT_INDEXED",
            PathError::DepthExceeded { .. } => "SHAPE_DEPTH_EXCEEDED",
            PathError::PlaceholderNotAllowed { .. } => "SHAPE_PLACEHOLDER_NOT_ALLOWED",
            PathError::MalformedPath { .. } => "SHAPE_MALFORMED_PATH",
        }
    }

    /// The full path being resolved
    pub fn path(&self) -> &str {
        match self {
            PathError::UnknownField { path, .. }
            | PathError::NotAnArrayButIndexed { path, .. }
            | PathError::DepthExceeded { path, .. }
            | PathError::PlaceholderNotAllowed { path, .. }
            | PathError::MalformedPath { path, .. } => path,
        }
    }
}

/// Result type for path operations
pub type PathResult<T> = Result<T, PathError>;
